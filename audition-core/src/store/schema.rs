//! Columnar layout of the distance table.

use polars::prelude::*;

use crate::domain::{DistanceHistory, DistanceRecord, ModelGroupId, ModelId, TrainEndTime};

pub const COLUMNS: [&str; 8] = [
    "model_group_id",
    "model_id",
    "train_end_time",
    "metric",
    "parameter",
    "raw_value",
    "below_best",
    "below_best_next_time",
];

/// Expected schema for distance tables.
pub struct DistanceSchema;

impl DistanceSchema {
    pub fn schema() -> Schema {
        Schema::from_iter(vec![
            Field::new("model_group_id".into(), DataType::UInt64),
            Field::new("model_id".into(), DataType::UInt64),
            Field::new(
                "train_end_time".into(),
                DataType::Datetime(TimeUnit::Milliseconds, None),
            ),
            Field::new("metric".into(), DataType::String),
            Field::new("parameter".into(), DataType::String),
            Field::new("raw_value".into(), DataType::Float64),
            Field::new("below_best".into(), DataType::Float64),
            Field::new("below_best_next_time".into(), DataType::Float64),
        ])
    }

    /// Validate DataFrame against schema.
    pub fn validate(df: &DataFrame) -> Result<(), SchemaError> {
        let expected = Self::schema();
        let actual = df.schema();

        for field in expected.iter_fields() {
            let actual_dtype = actual
                .get(field.name())
                .ok_or_else(|| SchemaError::MissingColumn(field.name().to_string()))?;
            if actual_dtype != field.dtype() {
                return Err(SchemaError::TypeMismatch {
                    column: field.name().to_string(),
                    expected: field.dtype().clone(),
                    actual: actual_dtype.clone(),
                });
            }
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Type mismatch in column {column}: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        column: String,
        expected: DataType,
        actual: DataType,
    },

    #[error("null {column} at row {row}")]
    NullValue { column: &'static str, row: usize },

    #[error("invalid timestamp {millis} at row {row}")]
    InvalidTimestamp { millis: i64, row: usize },

    #[error(transparent)]
    Polars(#[from] PolarsError),
}

/// Convert distance records to a DataFrame in the canonical schema.
pub fn records_to_dataframe(records: &[DistanceRecord]) -> Result<DataFrame, SchemaError> {
    let group_ids: Vec<u64> = records.iter().map(|r| r.model_group_id.0).collect();
    let model_ids: Vec<u64> = records.iter().map(|r| r.model_id.0).collect();
    let times: Vec<i64> = records
        .iter()
        .map(|r| r.train_end_time.and_utc().timestamp_millis())
        .collect();
    let metrics: Vec<&str> = records.iter().map(|r| r.metric.as_str()).collect();
    let parameters: Vec<&str> = records.iter().map(|r| r.parameter.as_str()).collect();
    let raw_values: Vec<f64> = records.iter().map(|r| r.raw_value).collect();
    let below_best: Vec<f64> = records.iter().map(|r| r.below_best).collect();
    let next_time: Vec<Option<f64>> = records.iter().map(|r| r.below_best_next_time).collect();

    let df = DataFrame::new(vec![
        Column::new("model_group_id".into(), group_ids),
        Column::new("model_id".into(), model_ids),
        Column::new("train_end_time".into(), times)
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?,
        Column::new("metric".into(), metrics),
        Column::new("parameter".into(), parameters),
        Column::new("raw_value".into(), raw_values),
        Column::new("below_best".into(), below_best),
        Column::new("below_best_next_time".into(), next_time),
    ])?;
    Ok(df)
}

/// Convert a DataFrame in the canonical schema back to records.
pub fn dataframe_to_records(df: &DataFrame) -> Result<Vec<DistanceRecord>, SchemaError> {
    DistanceSchema::validate(df)?;

    let group_ca = df.column("model_group_id")?.u64()?;
    let model_ca = df.column("model_id")?.u64()?;
    let time_ca = df.column("train_end_time")?.datetime()?;
    let metric_ca = df.column("metric")?.str()?;
    let param_ca = df.column("parameter")?.str()?;
    let raw_ca = df.column("raw_value")?.f64()?;
    let below_ca = df.column("below_best")?.f64()?;
    let next_ca = df.column("below_best_next_time")?.f64()?;

    let n = df.height();
    let mut records = Vec::with_capacity(n);
    for row in 0..n {
        let millis = time_ca.get(row).ok_or(SchemaError::NullValue {
            column: "train_end_time",
            row,
        })?;
        let train_end_time = millis_to_time(millis).ok_or(SchemaError::InvalidTimestamp { millis, row })?;
        records.push(DistanceRecord {
            model_group_id: ModelGroupId(group_ca.get(row).ok_or(SchemaError::NullValue {
                column: "model_group_id",
                row,
            })?),
            model_id: ModelId(model_ca.get(row).ok_or(SchemaError::NullValue {
                column: "model_id",
                row,
            })?),
            train_end_time,
            metric: metric_ca.get(row).unwrap_or_default().to_string(),
            parameter: param_ca.get(row).unwrap_or_default().to_string(),
            raw_value: raw_ca.get(row).unwrap_or(f64::NAN),
            below_best: below_ca.get(row).unwrap_or(f64::NAN),
            below_best_next_time: next_ca.get(row),
        });
    }
    Ok(records)
}

impl DistanceHistory {
    /// The history as a frame in the canonical distance-table schema.
    pub fn to_dataframe(&self) -> Result<DataFrame, SchemaError> {
        records_to_dataframe(self.records())
    }
}

fn millis_to_time(millis: i64) -> Option<TrainEndTime> {
    chrono::DateTime::from_timestamp_millis(millis).map(|dt| dt.naive_utc())
}
