//! Distance store: the durable substrate the auditioning components query.
//!
//! A `DistanceStore` wraps a `DistanceBackend` (in-memory or a Parquet
//! directory). Rows are written once by `populate` and treated as immutable:
//! populating a metric that is already present appends nothing for it.
//! Reads never mutate. A single `populate` must not run concurrently with
//! other writers of the same backend.

pub mod memory;
pub mod parquet;
pub mod schema;

use std::collections::BTreeSet;

use thiserror::Error;

use crate::directionality::Directionality;
use crate::domain::{DistanceHistory, DistanceRecord, MetricKey, ModelGroupId, TrainEndTime};
use crate::ranking::RankingEngine;
use crate::source::{EvaluationSource, SourceError};

pub use memory::MemoryBackend;
pub use parquet::{ParquetBackend, StoreMeta};
pub use schema::{DistanceSchema, SchemaError};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error at {path}: {message}")]
    Io { path: String, message: String },

    #[error("parquet I/O error: {0}")]
    Parquet(String),

    #[error("store metadata error: {0}")]
    Meta(String),

    #[error("distance table schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Storage for distance rows.
pub trait DistanceBackend: Send + Sync {
    /// Initialize an empty table, discarding existing rows.
    fn create(&mut self) -> Result<(), StoreError>;

    /// Append rows. Existing rows are never rewritten.
    fn append(&mut self, records: &[DistanceRecord]) -> Result<(), StoreError>;

    /// Read every stored row.
    fn scan(&self) -> Result<Vec<DistanceRecord>, StoreError>;
}

pub struct DistanceStore<B> {
    backend: B,
}

impl<B: DistanceBackend> DistanceStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Initialize an empty distance table.
    pub fn create(&mut self) -> Result<(), StoreError> {
        self.backend.create()
    }

    /// Rank `metrics` for the given groups and times and append the rows.
    ///
    /// Metric keys already in the table are skipped. Returns rows written.
    pub fn populate<D: Directionality>(
        &mut self,
        engine: &RankingEngine<D>,
        source: &dyn EvaluationSource,
        model_group_ids: &[ModelGroupId],
        train_end_times: &[TrainEndTime],
        metrics: &[MetricKey],
    ) -> Result<usize, StoreError> {
        let existing: BTreeSet<MetricKey> = self
            .backend
            .scan()?
            .iter()
            .map(DistanceRecord::metric_key)
            .collect();

        let mut pending = Vec::with_capacity(metrics.len());
        for metric in metrics {
            if existing.contains(metric) {
                tracing::warn!(%metric, "metric already populated, leaving existing rows untouched");
            } else if !pending.contains(metric) {
                pending.push(metric.clone());
            }
        }

        let records = engine.rank(source, model_group_ids, train_end_times, &pending)?;
        for metric in &pending {
            let rows = records
                .iter()
                .filter(|r| r.is_metric(&metric.metric, &metric.parameter))
                .count();
            tracing::info!(%metric, rows, "populated distance rows");
        }

        if !records.is_empty() {
            self.backend.append(&records)?;
        }
        Ok(records.len())
    }

    /// `create` followed by `populate`.
    pub fn create_and_populate<D: Directionality>(
        &mut self,
        engine: &RankingEngine<D>,
        source: &dyn EvaluationSource,
        model_group_ids: &[ModelGroupId],
        train_end_times: &[TrainEndTime],
        metrics: &[MetricKey],
    ) -> Result<usize, StoreError> {
        self.create()?;
        self.populate(engine, source, model_group_ids, train_end_times, metrics)
    }

    /// Append precomputed rows (imports, fixtures).
    pub fn append(&mut self, records: &[DistanceRecord]) -> Result<(), StoreError> {
        self.backend.append(records)
    }

    /// Every stored row for the given groups.
    pub fn fetch(&self, model_group_ids: &[ModelGroupId]) -> Result<DistanceHistory, StoreError> {
        let wanted: BTreeSet<ModelGroupId> = model_group_ids.iter().copied().collect();
        Ok(self
            .backend
            .scan()?
            .into_iter()
            .filter(|r| wanted.contains(&r.model_group_id))
            .collect())
    }

    /// Stored rows for the given groups at exactly `train_end_time`.
    pub fn fetch_as_of(
        &self,
        model_group_ids: &[ModelGroupId],
        train_end_time: TrainEndTime,
    ) -> Result<DistanceHistory, StoreError> {
        Ok(self.fetch(model_group_ids)?.as_of(train_end_time))
    }

    /// Every stored row.
    pub fn fetch_all(&self) -> Result<DistanceHistory, StoreError> {
        Ok(DistanceHistory::new(self.backend.scan()?))
    }
}

impl DistanceStore<MemoryBackend> {
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directionality::MetricRegistry;
    use crate::domain::{parse_train_end_time, EvaluationRecord, ModelId};
    use crate::rng::TieBreakSeeds;
    use crate::source::InMemoryEvaluations;

    fn t(s: &str) -> TrainEndTime {
        parse_train_end_time(s).unwrap()
    }

    fn eval(model: u64, group: u64, time: &str, metric: &str, value: f64) -> EvaluationRecord {
        EvaluationRecord {
            model_id: ModelId(model),
            model_group_id: ModelGroupId(group),
            train_end_time: t(time),
            metric: metric.into(),
            parameter: "100_abs".into(),
            value,
        }
    }

    fn source() -> InMemoryEvaluations {
        InMemoryEvaluations::new(vec![
            eval(1, 1, "2014-01-01", "precision@", 0.6),
            eval(2, 2, "2014-01-01", "precision@", 0.8),
            eval(3, 1, "2015-01-01", "precision@", 0.5),
            eval(4, 2, "2015-01-01", "precision@", 0.4),
            eval(1, 1, "2014-01-01", "recall@", 0.3),
            eval(2, 2, "2014-01-01", "recall@", 0.2),
        ])
    }

    fn engine() -> RankingEngine<MetricRegistry> {
        RankingEngine::new(MetricRegistry::standard(), TieBreakSeeds::default())
    }

    const GROUPS: [ModelGroupId; 2] = [ModelGroupId(1), ModelGroupId(2)];

    #[test]
    fn populate_then_fetch() {
        let mut store = DistanceStore::in_memory();
        let written = store
            .create_and_populate(
                &engine(),
                &source(),
                &GROUPS,
                &[t("2014-01-01"), t("2015-01-01")],
                &[MetricKey::new("precision@", "100_abs")],
            )
            .unwrap();
        assert_eq!(written, 4);
        assert_eq!(store.fetch(&GROUPS).unwrap().len(), 4);
        assert_eq!(store.fetch(&[ModelGroupId(2)]).unwrap().len(), 2);
        assert_eq!(store.fetch_as_of(&GROUPS, t("2015-01-01")).unwrap().len(), 2);
    }

    #[test]
    fn repopulating_same_metric_appends_nothing() {
        let mut store = DistanceStore::in_memory();
        let metrics = [MetricKey::new("precision@", "100_abs")];
        let times = [t("2014-01-01"), t("2015-01-01")];
        store
            .populate(&engine(), &source(), &GROUPS, &times, &metrics)
            .unwrap();
        let again = store
            .populate(&engine(), &source(), &GROUPS, &times, &metrics)
            .unwrap();
        assert_eq!(again, 0);
        assert_eq!(store.fetch_all().unwrap().len(), 4);
    }

    #[test]
    fn new_metric_appends_distinct_rows() {
        let mut store = DistanceStore::in_memory();
        let times = [t("2014-01-01"), t("2015-01-01")];
        store
            .populate(
                &engine(),
                &source(),
                &GROUPS,
                &times,
                &[MetricKey::new("precision@", "100_abs")],
            )
            .unwrap();
        let written = store
            .populate(
                &engine(),
                &source(),
                &GROUPS,
                &times,
                &[MetricKey::new("recall@", "100_abs")],
            )
            .unwrap();
        assert_eq!(written, 2);
        assert_eq!(store.fetch_all().unwrap().metric_keys().len(), 2);
    }

    #[test]
    fn empty_candidates_write_nothing() {
        let mut store = DistanceStore::in_memory();
        let written = store
            .populate(
                &engine(),
                &source(),
                &[],
                &[t("2014-01-01")],
                &[MetricKey::new("precision@", "100_abs")],
            )
            .unwrap();
        assert_eq!(written, 0);
        assert!(store.fetch_all().unwrap().is_empty());
    }
}
