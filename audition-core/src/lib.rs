//! Audition Core — distance-from-best engine for model group selection.
//!
//! This crate contains the data side of auditioning:
//! - Domain types (model/group ids, evaluation and distance records)
//! - Metric directionality registry (injected, never global)
//! - Deterministic tie-break seeds for ranking passes
//! - Evaluation sources (in-memory, CSV)
//! - Ranking engine: per-round distance from best and next-round distance
//! - Distance store with in-memory and Parquet backends

pub mod directionality;
pub mod domain;
pub mod ranking;
pub mod rng;
pub mod source;
pub mod store;

pub use directionality::{Directionality, MetricRegistry};
pub use domain::{
    parse_train_end_time, DistanceHistory, DistanceRecord, EvaluationRecord, MetricKey,
    ModelGroupId, ModelId, ObservedRecord, TrainEndTime,
};
pub use ranking::RankingEngine;
pub use rng::TieBreakSeeds;
pub use source::{CsvEvaluations, EvaluationQuery, EvaluationSource, InMemoryEvaluations, SourceError};
pub use store::{
    DistanceBackend, DistanceStore, MemoryBackend, ParquetBackend, StoreError, StoreMeta,
};
