//! Metric directionality: whether higher or lower raw values are better.
//!
//! The registry is passed into the ranking engine and selection rules
//! explicitly; there is no process-wide lookup table.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Lookup of a metric's preferred direction.
pub trait Directionality: Send + Sync {
    /// True when larger raw values are better for `metric`.
    ///
    /// Unregistered metrics must not fail: implementations default to `true`.
    fn greater_is_better(&self, metric: &str) -> bool;
}

/// Metrics scored by the standard evaluation suite.
const GREATER_IS_BETTER: &[&str] = &[
    "precision@",
    "recall@",
    "auc",
    "accuracy",
    "f1",
    "fbeta@",
    "true positives@",
    "true negatives@",
];

const LOWER_IS_BETTER: &[&str] = &["false positives@", "false negatives@", "fpr@"];

/// Name → direction table with a warn-and-default fallback.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricRegistry {
    metrics: HashMap<String, bool>,
}

impl MetricRegistry {
    /// An empty registry: every lookup falls back to "greater is better".
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the standard evaluation metrics.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        for name in GREATER_IS_BETTER {
            registry.register(*name, true);
        }
        for name in LOWER_IS_BETTER {
            registry.register(*name, false);
        }
        registry
    }

    /// Register (or override) a metric's direction.
    pub fn register(&mut self, metric: impl Into<String>, greater_is_better: bool) -> &mut Self {
        self.metrics.insert(metric.into(), greater_is_better);
        self
    }

    /// Apply a batch of overrides, e.g. from an experiment config.
    pub fn with_overrides<'a, I>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a bool)>,
    {
        for (name, gib) in overrides {
            self.register(name.clone(), *gib);
        }
        self
    }

    pub fn is_registered(&self, metric: &str) -> bool {
        self.metrics.contains_key(metric)
    }
}

impl Directionality for MetricRegistry {
    fn greater_is_better(&self, metric: &str) -> bool {
        match self.metrics.get(metric) {
            Some(gib) => *gib,
            None => {
                tracing::warn!(
                    metric,
                    "metric not found in available metrics, assuming greater is better"
                );
                true
            }
        }
    }
}

impl<D: Directionality + ?Sized> Directionality for &D {
    fn greater_is_better(&self, metric: &str) -> bool {
        (**self).greater_is_better(metric)
    }
}
