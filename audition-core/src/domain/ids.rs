use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Model group identifier, stable across retrainings of the same model configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelGroupId(pub u64);

impl fmt::Display for ModelGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ModelGroupId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl FromStr for ModelGroupId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// A single trained model instance inside a model group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(pub u64);

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ModelId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Identifies one scored metric, e.g. `precision@` with parameter `100_abs`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MetricKey {
    pub metric: String,
    pub parameter: String,
}

impl MetricKey {
    pub fn new(metric: impl Into<String>, parameter: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            parameter: parameter.into(),
        }
    }

    pub fn matches(&self, metric: &str, parameter: &str) -> bool {
        self.metric == metric && self.parameter == parameter
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.metric, self.parameter)
    }
}
