//! Row types: raw evaluations, distance-from-best records, and the
//! next-time-stripped view handed to selection rules.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ids::{MetricKey, ModelGroupId, ModelId};

/// End of a model's training window; the key of one evaluation round.
pub type TrainEndTime = NaiveDateTime;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid train end time '{0}': expected YYYY-MM-DD or YYYY-MM-DD HH:MM:SS")]
pub struct TimeParseError(pub String);

/// Parse a train end time from either a bare date or a full timestamp.
pub fn parse_train_end_time(s: &str) -> Result<TrainEndTime, TimeParseError> {
    let s = s.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(dt);
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| TimeParseError(s.to_string()))
}

/// One scored evaluation of one model, as read from the evaluation source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub model_id: ModelId,
    pub model_group_id: ModelGroupId,
    pub train_end_time: TrainEndTime,
    pub metric: String,
    pub parameter: String,
    pub value: f64,
}

/// Distance of one model from the best model of its evaluation round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceRecord {
    pub model_group_id: ModelGroupId,
    pub model_id: ModelId,
    pub train_end_time: TrainEndTime,
    pub metric: String,
    pub parameter: String,
    pub raw_value: f64,
    /// Shortfall below the round's best value; never negative.
    pub below_best: f64,
    /// The same group's `below_best` at its next train end time, if any.
    pub below_best_next_time: Option<f64>,
}

impl DistanceRecord {
    pub fn metric_key(&self) -> MetricKey {
        MetricKey::new(self.metric.clone(), self.parameter.clone())
    }

    pub fn is_metric(&self, metric: &str, parameter: &str) -> bool {
        self.metric == metric && self.parameter == parameter
    }

    /// Drop the next-time column.
    pub fn observed(&self) -> ObservedRecord {
        ObservedRecord {
            model_group_id: self.model_group_id,
            model_id: self.model_id,
            train_end_time: self.train_end_time,
            metric: self.metric.clone(),
            parameter: self.parameter.clone(),
            raw_value: self.raw_value,
            below_best: self.below_best,
        }
    }
}

/// A distance record as known at its own train end time.
///
/// Selection rules only ever receive this shape, so they cannot read
/// `below_best_next_time` even by accident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedRecord {
    pub model_group_id: ModelGroupId,
    pub model_id: ModelId,
    pub train_end_time: TrainEndTime,
    pub metric: String,
    pub parameter: String,
    pub raw_value: f64,
    pub below_best: f64,
}

impl ObservedRecord {
    pub fn is_metric(&self, metric: &str, parameter: &str) -> bool {
        self.metric == metric && self.parameter == parameter
    }
}
