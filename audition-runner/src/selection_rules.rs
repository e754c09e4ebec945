//! Selection rules: pure functions from observed history to one model group.
//!
//! A rule only ever sees `ObservedRecord`s at or before the as-of time, so it
//! cannot peek at next-time regret. Ties go to the smallest model group id.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use audition_core::{Directionality, ModelGroupId, ObservedRecord, TrainEndTime};

pub trait SelectionRule: Send + Sync {
    /// Choose a model group given everything known at `train_end_time`.
    fn pick(&self, history: &[ObservedRecord], train_end_time: TrainEndTime)
        -> Option<ModelGroupId>;
}

impl<F> SelectionRule for F
where
    F: Fn(&[ObservedRecord], TrainEndTime) -> Option<ModelGroupId> + Send + Sync,
{
    fn pick(
        &self,
        history: &[ObservedRecord],
        train_end_time: TrainEndTime,
    ) -> Option<ModelGroupId> {
        self(history, train_end_time)
    }
}

/// Serializable description of a built-in rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SelectionRuleSpec {
    /// Best raw value at the as-of time.
    BestCurrentValue { metric: String, parameter: String },

    /// Best mean raw value over the history.
    BestAverageValue { metric: String, parameter: String },

    /// Smallest standard deviation of the raw value over the history.
    LowestMetricVariance { metric: String, parameter: String },

    /// Most rounds within `dist_from_best_case` of the best.
    MostFrequentBestDist {
        metric: String,
        parameter: String,
        dist_from_best_case: f64,
    },

    /// Best weighted mean of two metrics' average raw values.
    BestAverageTwoMetrics {
        metric1: String,
        parameter1: String,
        metric2: String,
        parameter2: String,
        metric1_weight: f64,
    },
}

impl SelectionRuleSpec {
    pub fn descriptive_name(&self) -> String {
        match self {
            Self::BestCurrentValue { metric, parameter } => {
                format!("best_current_value_{metric}{parameter}")
            }
            Self::BestAverageValue { metric, parameter } => {
                format!("best_average_value_{metric}{parameter}")
            }
            Self::LowestMetricVariance { metric, parameter } => {
                format!("lowest_metric_variance_{metric}{parameter}")
            }
            Self::MostFrequentBestDist {
                metric,
                parameter,
                dist_from_best_case,
            } => format!("most_frequent_best_dist_{metric}{parameter}_{dist_from_best_case}"),
            Self::BestAverageTwoMetrics {
                metric1,
                parameter1,
                metric2,
                parameter2,
                metric1_weight,
            } => format!(
                "best_average_two_metrics_{metric1}{parameter1}_{metric2}{parameter2}_{metric1_weight}"
            ),
        }
    }

    /// Resolve metric directions and bind to a callable rule.
    pub fn bind(&self, directionality: &dyn Directionality) -> BoundSelectionRule {
        let (primary, secondary) = match self {
            Self::BestAverageTwoMetrics {
                metric1, metric2, ..
            } => (
                directionality.greater_is_better(metric1),
                directionality.greater_is_better(metric2),
            ),
            Self::BestCurrentValue { metric, .. }
            | Self::BestAverageValue { metric, .. }
            | Self::LowestMetricVariance { metric, .. }
            | Self::MostFrequentBestDist { metric, .. } => {
                let gib = directionality.greater_is_better(metric);
                (gib, gib)
            }
        };
        BoundSelectionRule::new(
            self.descriptive_name(),
            BuiltinRule {
                spec: self.clone(),
                primary_greater_is_better: primary,
                secondary_greater_is_better: secondary,
            },
        )
    }
}

/// A rule plus the name it is reported under.
#[derive(Clone)]
pub struct BoundSelectionRule {
    descriptive_name: String,
    rule: Arc<dyn SelectionRule>,
}

impl BoundSelectionRule {
    pub fn new(descriptive_name: impl Into<String>, rule: impl SelectionRule + 'static) -> Self {
        Self {
            descriptive_name: descriptive_name.into(),
            rule: Arc::new(rule),
        }
    }

    /// Bind an arbitrary closure.
    pub fn from_fn<F>(descriptive_name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&[ObservedRecord], TrainEndTime) -> Option<ModelGroupId> + Send + Sync + 'static,
    {
        Self::new(descriptive_name, f)
    }

    pub fn descriptive_name(&self) -> &str {
        &self.descriptive_name
    }

    pub fn pick(
        &self,
        history: &[ObservedRecord],
        train_end_time: TrainEndTime,
    ) -> Option<ModelGroupId> {
        self.rule.pick(history, train_end_time)
    }
}

impl fmt::Debug for BoundSelectionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundSelectionRule")
            .field("descriptive_name", &self.descriptive_name)
            .finish_non_exhaustive()
    }
}

struct BuiltinRule {
    spec: SelectionRuleSpec,
    primary_greater_is_better: bool,
    secondary_greater_is_better: bool,
}

impl SelectionRule for BuiltinRule {
    fn pick(
        &self,
        history: &[ObservedRecord],
        train_end_time: TrainEndTime,
    ) -> Option<ModelGroupId> {
        let gib = self.primary_greater_is_better;
        match &self.spec {
            SelectionRuleSpec::BestCurrentValue { metric, parameter } => {
                best_current_value(history, train_end_time, metric, parameter, gib)
            }
            SelectionRuleSpec::BestAverageValue { metric, parameter } => {
                best_average_value(history, metric, parameter, gib)
            }
            SelectionRuleSpec::LowestMetricVariance { metric, parameter } => {
                lowest_metric_variance(history, metric, parameter)
            }
            SelectionRuleSpec::MostFrequentBestDist {
                metric,
                parameter,
                dist_from_best_case,
            } => most_frequent_best_dist(history, metric, parameter, *dist_from_best_case),
            SelectionRuleSpec::BestAverageTwoMetrics {
                metric1,
                parameter1,
                metric2,
                parameter2,
                metric1_weight,
            } => best_average_two_metrics(
                history,
                (metric1, parameter1, gib),
                (metric2, parameter2, self.secondary_greater_is_better),
                *metric1_weight,
            ),
        }
    }
}

// ─── Rule functions ──────────────────────────────────────────────────

/// Group with the best raw value at exactly `train_end_time`.
pub fn best_current_value(
    history: &[ObservedRecord],
    train_end_time: TrainEndTime,
    metric: &str,
    parameter: &str,
    greater_is_better: bool,
) -> Option<ModelGroupId> {
    let mut best: BTreeMap<ModelGroupId, f64> = BTreeMap::new();
    for r in history
        .iter()
        .filter(|r| r.train_end_time == train_end_time && r.is_metric(metric, parameter))
    {
        let score = oriented(r.raw_value, greater_is_better);
        best.entry(r.model_group_id)
            .and_modify(|s| *s = s.max(score))
            .or_insert(score);
    }
    argmax(&best)
}

/// Group with the best mean raw value across the history.
pub fn best_average_value(
    history: &[ObservedRecord],
    metric: &str,
    parameter: &str,
    greater_is_better: bool,
) -> Option<ModelGroupId> {
    let means: BTreeMap<ModelGroupId, f64> = values_by_group(history, metric, parameter)
        .into_iter()
        .map(|(g, values)| (g, oriented(mean(&values), greater_is_better)))
        .collect();
    argmax(&means)
}

/// Group whose raw value varies least across the history.
///
/// Groups observed once have no spread to speak of; they are only eligible
/// when no group has two or more observations.
pub fn lowest_metric_variance(
    history: &[ObservedRecord],
    metric: &str,
    parameter: &str,
) -> Option<ModelGroupId> {
    let by_group = values_by_group(history, metric, parameter);
    let any_repeated = by_group.values().any(|v| v.len() > 1);
    let neg_std: BTreeMap<ModelGroupId, f64> = by_group
        .into_iter()
        .filter(|(_, values)| !any_repeated || values.len() > 1)
        .map(|(g, values)| (g, -std_dev(&values)))
        .collect();
    argmax(&neg_std)
}

/// Group most often within `dist_from_best_case` of the best.
pub fn most_frequent_best_dist(
    history: &[ObservedRecord],
    metric: &str,
    parameter: &str,
    dist_from_best_case: f64,
) -> Option<ModelGroupId> {
    let mut counts: BTreeMap<ModelGroupId, f64> = BTreeMap::new();
    for r in history.iter().filter(|r| r.is_metric(metric, parameter)) {
        let hit = if r.below_best <= dist_from_best_case { 1.0 } else { 0.0 };
        *counts.entry(r.model_group_id).or_insert(0.0) += hit;
    }
    argmax(&counts)
}

/// Group with the best weighted mean of two metrics' averages.
///
/// Only groups observed on both metrics are eligible.
pub fn best_average_two_metrics(
    history: &[ObservedRecord],
    first: (&str, &str, bool),
    second: (&str, &str, bool),
    metric1_weight: f64,
) -> Option<ModelGroupId> {
    let (m1, p1, gib1) = first;
    let (m2, p2, gib2) = second;
    let firsts = values_by_group(history, m1, p1);
    let seconds = values_by_group(history, m2, p2);
    let scores: BTreeMap<ModelGroupId, f64> = firsts
        .iter()
        .filter_map(|(g, v1)| {
            seconds.get(g).map(|v2| {
                let a = oriented(mean(v1), gib1);
                let b = oriented(mean(v2), gib2);
                (*g, metric1_weight * a + (1.0 - metric1_weight) * b)
            })
        })
        .collect();
    argmax(&scores)
}

fn values_by_group(
    history: &[ObservedRecord],
    metric: &str,
    parameter: &str,
) -> BTreeMap<ModelGroupId, Vec<f64>> {
    let mut by_group: BTreeMap<ModelGroupId, Vec<f64>> = BTreeMap::new();
    for r in history.iter().filter(|r| r.is_metric(metric, parameter)) {
        by_group.entry(r.model_group_id).or_default().push(r.raw_value);
    }
    by_group
}

/// Flip lower-is-better values so larger is always better.
fn oriented(value: f64, greater_is_better: bool) -> f64 {
    if greater_is_better {
        value
    } else {
        -value
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64]) -> f64 {
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

/// Highest finite score; ties go to the smallest group id.
fn argmax(scores: &BTreeMap<ModelGroupId, f64>) -> Option<ModelGroupId> {
    let mut best: Option<(ModelGroupId, f64)> = None;
    for (group, score) in scores {
        if !score.is_finite() {
            continue;
        }
        match best {
            Some((_, s)) if *score <= s => {}
            _ => best = Some((*group, *score)),
        }
    }
    best.map(|(g, _)| g)
}

#[cfg(test)]
mod tests {
    use super::*;
    use audition_core::{parse_train_end_time, MetricRegistry, ModelId};

    fn t(s: &str) -> TrainEndTime {
        parse_train_end_time(s).unwrap()
    }

    fn obs(group: u64, time: &str, metric: &str, raw: f64, below: f64) -> ObservedRecord {
        ObservedRecord {
            model_group_id: ModelGroupId(group),
            model_id: ModelId(group),
            train_end_time: t(time),
            metric: metric.into(),
            parameter: "100_abs".into(),
            raw_value: raw,
            below_best: below,
        }
    }

    fn history() -> Vec<ObservedRecord> {
        vec![
            // group 1: steady
            obs(1, "2014-01-01", "precision@", 0.5, 0.1),
            obs(1, "2015-01-01", "precision@", 0.5, 0.0),
            // group 2: spiky
            obs(2, "2014-01-01", "precision@", 0.6, 0.0),
            obs(2, "2015-01-01", "precision@", 0.3, 0.2),
            obs(1, "2014-01-01", "recall@", 0.2, 0.2),
            obs(2, "2014-01-01", "recall@", 0.4, 0.0),
        ]
    }

    #[test]
    fn current_value_uses_as_of_round_only() {
        let h = history();
        assert_eq!(
            best_current_value(&h, t("2014-01-01"), "precision@", "100_abs", true),
            Some(ModelGroupId(2))
        );
        assert_eq!(
            best_current_value(&h, t("2015-01-01"), "precision@", "100_abs", true),
            Some(ModelGroupId(1))
        );
    }

    #[test]
    fn current_value_respects_lower_is_better() {
        let h = history();
        assert_eq!(
            best_current_value(&h, t("2014-01-01"), "precision@", "100_abs", false),
            Some(ModelGroupId(1))
        );
    }

    #[test]
    fn average_value_prefers_steady_group() {
        // means: 0.5 vs 0.45
        assert_eq!(
            best_average_value(&history(), "precision@", "100_abs", true),
            Some(ModelGroupId(1))
        );
    }

    #[test]
    fn variance_prefers_steady_group() {
        assert_eq!(
            lowest_metric_variance(&history(), "precision@", "100_abs"),
            Some(ModelGroupId(1))
        );
    }

    #[test]
    fn most_frequent_best_dist_counts_hits() {
        // within 0.1: group 1 twice, group 2 once
        assert_eq!(
            most_frequent_best_dist(&history(), "precision@", "100_abs", 0.1),
            Some(ModelGroupId(1))
        );
    }

    #[test]
    fn two_metric_average_weights_metrics() {
        let h = history();
        let prec = ("precision@", "100_abs", true);
        let rec = ("recall@", "100_abs", true);
        assert_eq!(
            best_average_two_metrics(&h, prec, rec, 1.0),
            Some(ModelGroupId(1))
        );
        assert_eq!(
            best_average_two_metrics(&h, prec, rec, 0.0),
            Some(ModelGroupId(2))
        );
    }

    #[test]
    fn ties_go_to_smallest_group() {
        let h = vec![
            obs(7, "2014-01-01", "precision@", 0.5, 0.0),
            obs(3, "2014-01-01", "precision@", 0.5, 0.0),
        ];
        assert_eq!(
            best_current_value(&h, t("2014-01-01"), "precision@", "100_abs", true),
            Some(ModelGroupId(3))
        );
    }

    #[test]
    fn empty_history_picks_nothing() {
        assert_eq!(best_average_value(&[], "precision@", "100_abs", true), None);
    }

    #[test]
    fn spec_binds_with_registry_direction() {
        let spec = SelectionRuleSpec::BestCurrentValue {
            metric: "precision@".into(),
            parameter: "100_abs".into(),
        };
        let rule = spec.bind(&MetricRegistry::standard());
        assert_eq!(rule.descriptive_name(), "best_current_value_precision@100_abs");
        assert_eq!(rule.pick(&history(), t("2014-01-01")), Some(ModelGroupId(2)));
    }

    #[test]
    fn closures_bind_as_rules() {
        let rule = BoundSelectionRule::from_fn("always_two", |_: &[ObservedRecord], _| {
            Some(ModelGroupId(2))
        });
        assert_eq!(rule.pick(&[], t("2014-01-01")), Some(ModelGroupId(2)));
    }

    #[test]
    fn spec_parses_from_toml() {
        let spec: SelectionRuleSpec = toml::from_str(
            r#"
type = "MOST_FREQUENT_BEST_DIST"
metric = "precision@"
parameter = "100_abs"
dist_from_best_case = 0.05
"#,
        )
        .unwrap();
        assert_eq!(
            spec,
            SelectionRuleSpec::MostFrequentBestDist {
                metric: "precision@".into(),
                parameter: "100_abs".into(),
                dist_from_best_case: 0.05,
            }
        );
    }
}
