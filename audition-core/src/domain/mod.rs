//! Domain types: identifiers, evaluation and distance records, fetched history.

pub mod history;
pub mod ids;
pub mod record;

pub use history::DistanceHistory;
pub use ids::{MetricKey, ModelGroupId, ModelId};
pub use record::{
    parse_train_end_time, DistanceRecord, EvaluationRecord, ObservedRecord, TimeParseError,
    TrainEndTime,
};
