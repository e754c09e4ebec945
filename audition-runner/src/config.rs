//! Serializable experiment configuration.
//!
//! One TOML file describes an audition run end to end:
//!
//! ```toml
//! model_group_ids = [1, 2, 3]
//! train_end_times = ["2014-01-01", "2015-01-01"]
//! seed = 42
//!
//! [[metrics]]
//! metric = "precision@"
//! parameter = "100_abs"
//!
//! [[filters]]
//! metric = "precision@"
//! parameter = "100_abs"
//! max_below_best = 0.2
//! min_value = 0.4
//!
//! [[selection_rules]]
//! type = "BEST_CURRENT_VALUE"
//! metric = "precision@"
//! parameter = "100_abs"
//!
//! [directionality]
//! "my_loss" = false
//!
//! [labels]
//! 1 = "stable"
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use audition_core::{
    parse_train_end_time, Directionality, MetricKey, MetricRegistry, ModelGroupId,
    TieBreakSeeds, TrainEndTime,
};

use crate::reporting::GroupLabels;
use crate::selection_rules::{BoundSelectionRule, SelectionRuleSpec};
use crate::thresholding::MetricFilter;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {message}")]
    Read { path: String, message: String },

    #[error("parse config TOML: {0}")]
    Parse(String),

    #[error("serialize config TOML: {0}")]
    Serialize(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

fn default_seed() -> u64 {
    TieBreakSeeds::default().master_seed()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExperimentConfig {
    #[serde(default)]
    pub model_group_ids: Vec<ModelGroupId>,

    #[serde(
        default,
        deserialize_with = "de_times",
        serialize_with = "ser_times"
    )]
    pub train_end_times: Vec<TrainEndTime>,

    /// Metrics ranked into the distance table.
    pub metrics: Vec<MetricKey>,

    #[serde(default)]
    pub filters: Vec<MetricFilter>,

    #[serde(default)]
    pub selection_rules: Vec<SelectionRuleSpec>,

    /// Metric regrets are measured on; the first metric when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regret: Option<MetricKey>,

    /// Master tie-break seed for ranking.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Directionality overrides, metric name to "greater is better".
    #[serde(default)]
    pub directionality: HashMap<String, bool>,

    /// Display names for model groups in reports.
    #[serde(default, deserialize_with = "de_labels", serialize_with = "ser_labels")]
    pub labels: GroupLabels,
}

impl ExperimentConfig {
    /// Load and validate an experiment from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate an experiment from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.metrics.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one [[metrics]] entry is required".into(),
            ));
        }
        for f in &self.filters {
            if !f.max_below_best.is_finite() || f.max_below_best < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "filter {}{}: max_below_best must be a non-negative number, got {}",
                    f.metric, f.parameter, f.max_below_best
                )));
            }
            if f.min_value.is_nan() {
                return Err(ConfigError::Invalid(format!(
                    "filter {}{}: min_value is NaN",
                    f.metric, f.parameter
                )));
            }
        }
        for rule in &self.selection_rules {
            match rule {
                SelectionRuleSpec::MostFrequentBestDist {
                    dist_from_best_case,
                    ..
                } if !(dist_from_best_case.is_finite() && *dist_from_best_case >= 0.0) => {
                    return Err(ConfigError::Invalid(format!(
                        "{}: dist_from_best_case must be non-negative",
                        rule.descriptive_name()
                    )));
                }
                SelectionRuleSpec::BestAverageTwoMetrics { metric1_weight, .. }
                    if !(0.0..=1.0).contains(metric1_weight) =>
                {
                    return Err(ConfigError::Invalid(format!(
                        "{}: metric1_weight must be within [0, 1]",
                        rule.descriptive_name()
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Metric the regret report is measured on.
    pub fn regret_metric(&self) -> Option<&MetricKey> {
        self.regret.as_ref().or_else(|| self.metrics.first())
    }

    pub fn metric_pairs(&self) -> Vec<(String, String)> {
        self.metrics
            .iter()
            .map(|k| (k.metric.clone(), k.parameter.clone()))
            .collect()
    }

    /// Standard registry plus this experiment's overrides.
    pub fn registry(&self) -> MetricRegistry {
        MetricRegistry::standard().with_overrides(&self.directionality)
    }

    pub fn seeds(&self) -> TieBreakSeeds {
        TieBreakSeeds::new(self.seed)
    }

    pub fn bound_rules(&self, directionality: &dyn Directionality) -> Vec<BoundSelectionRule> {
        self.selection_rules
            .iter()
            .map(|spec| spec.bind(directionality))
            .collect()
    }
}

fn de_times<'de, D>(deserializer: D) -> Result<Vec<TrainEndTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<String>::deserialize(deserializer)?;
    raw.iter()
        .map(|s| parse_train_end_time(s).map_err(serde::de::Error::custom))
        .collect()
}

fn ser_times<S>(times: &[TrainEndTime], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_seq(times.iter().map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string()))
}

// TOML table keys are always strings.
fn de_labels<'de, D>(deserializer: D) -> Result<GroupLabels, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, String>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(k, v)| {
            k.parse::<ModelGroupId>()
                .map(|id| (id, v))
                .map_err(|e| serde::de::Error::custom(format!("label key {k:?}: {e}")))
        })
        .collect()
}

fn ser_labels<S>(labels: &GroupLabels, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_map(labels.iter().map(|(k, v)| (k.to_string(), v)))
}
