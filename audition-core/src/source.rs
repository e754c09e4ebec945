//! Evaluation sources: where the ranking engine reads raw scores from.
//!
//! The `EvaluationSource` trait abstracts over the relation of
//! `(model_id, model_group_id, train_end_time, metric, parameter, value)`
//! so the engine can run against a CSV export, an in-memory fixture, or any
//! other backing relation.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::domain::{
    parse_train_end_time, EvaluationRecord, MetricKey, ModelGroupId, ModelId, TrainEndTime,
};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read evaluations from {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("malformed evaluation row {row}: {message}")]
    MalformedRow { row: usize, message: String },
}

/// Selection applied when reading one metric's evaluations.
#[derive(Debug, Clone)]
pub struct EvaluationQuery {
    pub model_group_ids: BTreeSet<ModelGroupId>,
    pub train_end_times: BTreeSet<TrainEndTime>,
    pub metric: MetricKey,
}

impl EvaluationQuery {
    pub fn new(
        model_group_ids: &[ModelGroupId],
        train_end_times: &[TrainEndTime],
        metric: MetricKey,
    ) -> Self {
        Self {
            model_group_ids: model_group_ids.iter().copied().collect(),
            train_end_times: train_end_times.iter().copied().collect(),
            metric,
        }
    }

    pub fn matches(&self, record: &EvaluationRecord) -> bool {
        self.metric.matches(&record.metric, &record.parameter)
            && self.model_group_ids.contains(&record.model_group_id)
            && self.train_end_times.contains(&record.train_end_time)
    }
}

/// A queryable relation of model evaluations.
pub trait EvaluationSource: Send + Sync {
    /// All evaluations matching `query`. An unknown metric yields no rows.
    fn evaluations(&self, query: &EvaluationQuery) -> Result<Vec<EvaluationRecord>, SourceError>;
}

/// Vector-backed source.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEvaluations {
    records: Vec<EvaluationRecord>,
}

impl InMemoryEvaluations {
    pub fn new(records: Vec<EvaluationRecord>) -> Self {
        Self { records }
    }

    pub fn push(&mut self, record: EvaluationRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl EvaluationSource for InMemoryEvaluations {
    fn evaluations(&self, query: &EvaluationQuery) -> Result<Vec<EvaluationRecord>, SourceError> {
        Ok(self
            .records
            .iter()
            .filter(|r| query.matches(r))
            .cloned()
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    model_id: u64,
    model_group_id: u64,
    train_end_time: String,
    metric: String,
    parameter: String,
    value: f64,
}

/// Evaluations loaded from a CSV file with header
/// `model_id,model_group_id,train_end_time,metric,parameter,value`.
#[derive(Debug, Clone)]
pub struct CsvEvaluations {
    inner: InMemoryEvaluations,
}

impl CsvEvaluations {
    pub fn from_path(path: &Path) -> Result<Self, SourceError> {
        let reader = csv::Reader::from_path(path).map_err(|e| SourceError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_reader(reader)
    }

    pub fn from_csv_str(content: &str) -> Result<Self, SourceError> {
        Self::from_reader(csv::Reader::from_reader(content.as_bytes()))
    }

    fn from_reader<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<Self, SourceError> {
        let mut records = Vec::new();
        for (i, row) in reader.deserialize::<CsvRow>().enumerate() {
            // header is line 1
            let row_no = i + 2;
            let row = row.map_err(|e| SourceError::MalformedRow {
                row: row_no,
                message: e.to_string(),
            })?;
            let train_end_time =
                parse_train_end_time(&row.train_end_time).map_err(|e| SourceError::MalformedRow {
                    row: row_no,
                    message: e.to_string(),
                })?;
            records.push(EvaluationRecord {
                model_id: ModelId(row.model_id),
                model_group_id: ModelGroupId(row.model_group_id),
                train_end_time,
                metric: row.metric,
                parameter: row.parameter,
                value: row.value,
            });
        }
        Ok(Self {
            inner: InMemoryEvaluations::new(records),
        })
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl EvaluationSource for CsvEvaluations {
    fn evaluations(&self, query: &EvaluationQuery) -> Result<Vec<EvaluationRecord>, SourceError> {
        self.inner.evaluations(query)
    }
}
