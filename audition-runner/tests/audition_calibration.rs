//! Calibration scenarios for thresholding and regrets over hand-built and
//! ranked distance tables.

use std::collections::BTreeSet;

use audition_core::{
    parse_train_end_time, DistanceRecord, DistanceStore, EvaluationRecord, InMemoryEvaluations,
    MemoryBackend, MetricKey, MetricRegistry, ModelGroupId, ModelId, ObservedRecord,
    RankingEngine, TieBreakSeeds, TrainEndTime,
};
use audition_runner::{
    BoundSelectionRule, MetricFilter, ModelGroupThresholder, RegretCalculator, RegretError,
    SelectionRuleSpec,
};
use proptest::prelude::*;

fn t(s: &str) -> TrainEndTime {
    parse_train_end_time(s).unwrap()
}

fn ids(v: &[u64]) -> BTreeSet<ModelGroupId> {
    v.iter().map(|i| ModelGroupId(*i)).collect()
}

#[allow(clippy::too_many_arguments)]
fn row(
    group: u64,
    model: u64,
    time: &str,
    metric: &str,
    raw: f64,
    below: f64,
    next: Option<f64>,
) -> DistanceRecord {
    DistanceRecord {
        model_group_id: ModelGroupId(group),
        model_id: ModelId(model),
        train_end_time: t(time),
        metric: metric.into(),
        parameter: "100_abs".into(),
        raw_value: raw,
        below_best: below,
        below_best_next_time: next,
    }
}

fn store_with(rows: &[DistanceRecord]) -> DistanceStore<MemoryBackend> {
    let mut store = DistanceStore::in_memory();
    store.append(rows).unwrap();
    store
}

// ─── Thresholding ───────────────────────────────────────────────────

/// Five groups, two metrics, three years. Group 3 is never a candidate.
fn threshold_rows() -> Vec<DistanceRecord> {
    let p = "precision@";
    let r = "recall@";
    vec![
        // 2014: group 1 passes
        row(1, 1, "2014-01-01", p, 0.5, 0.0, Some(0.38)),
        row(1, 1, "2014-01-01", r, 0.5, 0.0, Some(0.38)),
        // 2015: group 1 is not close enough
        row(1, 2, "2015-01-01", p, 0.5, 0.38, Some(0.0)),
        row(1, 2, "2015-01-01", r, 0.5, 0.38, Some(0.0)),
        row(1, 3, "2016-01-01", p, 0.46, 0.0, None),
        row(1, 3, "2016-01-01", r, 0.46, 0.0, None),
        // 2014: group 2 precision under the minimum
        row(2, 4, "2014-01-01", p, 0.39, 0.11, Some(0.5)),
        row(2, 4, "2014-01-01", r, 0.5, 0.0, Some(0.38)),
        // 2015: group 2 passes
        row(2, 5, "2015-01-01", p, 0.69, 0.19, Some(0.12)),
        row(2, 5, "2015-01-01", r, 0.69, 0.19, Some(0.0)),
        row(2, 6, "2016-01-01", p, 0.34, 0.12, None),
        row(2, 6, "2016-01-01", r, 0.46, 0.0, None),
        row(3, 7, "2014-01-01", p, 0.28, 0.22, Some(0.0)),
        row(3, 7, "2014-01-01", r, 0.5, 0.0, Some(0.38)),
        row(3, 8, "2015-01-01", p, 0.88, 0.0, Some(0.02)),
        row(3, 8, "2015-01-01", r, 0.5, 0.38, Some(0.0)),
        row(3, 9, "2016-01-01", p, 0.44, 0.02, None),
        row(3, 9, "2016-01-01", r, 0.46, 0.0, None),
        // group 4 precision never quite close enough
        row(4, 10, "2014-01-01", p, 0.29, 0.21, Some(0.21)),
        row(4, 10, "2014-01-01", r, 0.5, 0.0, Some(0.38)),
        row(4, 11, "2015-01-01", p, 0.67, 0.21, Some(0.21)),
        row(4, 11, "2015-01-01", r, 0.5, 0.38, Some(0.0)),
        row(4, 12, "2016-01-01", p, 0.25, 0.21, None),
        row(4, 12, "2016-01-01", r, 0.46, 0.0, None),
        // group 5 precision is fine, recall is not
        row(5, 13, "2014-01-01", p, 0.5, 0.0, Some(0.38)),
        row(5, 13, "2014-01-01", r, 0.3, 0.2, Some(0.38)),
        row(5, 14, "2015-01-01", p, 0.5, 0.38, Some(0.0)),
        row(5, 14, "2015-01-01", r, 0.3, 0.58, Some(0.0)),
        row(5, 15, "2016-01-01", p, 0.46, 0.0, None),
        row(5, 16, "2016-01-01", r, 0.3, 0.16, None),
    ]
}

fn threshold_filters() -> Vec<MetricFilter> {
    vec![
        MetricFilter::new("precision@", "100_abs", 0.2, 0.4),
        MetricFilter::new("recall@", "100_abs", 0.2, 0.4),
    ]
}

fn calibrated_thresholder() -> ModelGroupThresholder {
    let store = store_with(&threshold_rows());
    let mut th = ModelGroupThresholder::from_store(
        &store,
        vec![t("2014-01-01"), t("2015-01-01")],
        &[ModelGroupId(1), ModelGroupId(2), ModelGroupId(4), ModelGroupId(5)],
    )
    .unwrap();
    th.update_filters(threshold_filters());
    th
}

#[test]
fn passing_sets_per_time_and_across_times() {
    let th = calibrated_thresholder();
    assert_eq!(th.passing_as_of(t("2014-01-01")), ids(&[1]));
    assert_eq!(th.passing_as_of(t("2015-01-01")), ids(&[2]));
    assert_eq!(th.passing_any_time(), ids(&[1, 2]));
}

#[test]
fn surviving_set_needs_minimum_at_every_time() {
    // group 2 is under the precision minimum in 2014
    assert_eq!(calibrated_thresholder().model_group_ids(), &ids(&[1]));
}

#[test]
fn reapplying_filters_is_idempotent() {
    let mut th = calibrated_thresholder();
    let before = th.model_group_ids().clone();
    assert!(!th.update_filters(threshold_filters()));
    assert_eq!(th.model_group_ids(), &before);
}

#[test]
fn tightening_tolerance_never_grows_survivors() {
    let mut th = calibrated_thresholder();
    let mut previous = th.model_group_ids().clone();
    for tolerance in [0.15, 0.1, 0.01, 0.0] {
        th.update_filters(vec![
            MetricFilter::new("precision@", "100_abs", tolerance, 0.4),
            MetricFilter::new("recall@", "100_abs", tolerance, 0.4),
        ]);
        assert!(th.model_group_ids().is_subset(&previous));
        previous = th.model_group_ids().clone();
    }
    assert!(previous.is_empty());
}

#[test]
fn empty_candidates_pass_nothing() {
    let store = store_with(&threshold_rows());
    let mut th =
        ModelGroupThresholder::from_store(&store, vec![t("2014-01-01")], &[]).unwrap();
    th.update_filters(threshold_filters());
    assert!(th.model_group_ids().is_empty());
}

// ─── Regrets ────────────────────────────────────────────────────────

const STABLE: ModelGroupId = ModelGroupId(1);
const SPIKY: ModelGroupId = ModelGroupId(2);

fn regret_rows() -> Vec<DistanceRecord> {
    let p = "precision@";
    vec![
        row(1, 1, "2014-01-01", p, 0.5, 0.1, Some(0.15)),
        row(1, 2, "2015-01-01", p, 0.5, 0.15, Some(0.18)),
        row(1, 3, "2016-01-01", p, 0.46, 0.21, Some(0.11)),
        row(2, 4, "2014-01-01", p, 0.45, 0.15, Some(0.19)),
        row(2, 5, "2015-01-01", p, 0.84, 0.0, Some(0.3)),
        row(2, 6, "2016-01-01", p, 0.45, 0.22, Some(0.12)),
    ]
}

fn regret_times() -> Vec<TrainEndTime> {
    vec![t("2014-01-01"), t("2015-01-01"), t("2016-01-01")]
}

#[test]
fn fixed_choice_reads_next_time_distance() {
    let store = store_with(&regret_rows());
    let pick_spiky = BoundSelectionRule::from_fn("pick_spiky", |_: &[ObservedRecord], _| Some(SPIKY));
    let regrets = RegretCalculator::new(&store)
        .regrets_for_rule(&pick_spiky, &[STABLE, SPIKY], &regret_times(), "precision@", "100_abs")
        .unwrap();
    assert_eq!(regrets, vec![Some(0.19), Some(0.3), Some(0.12)]);
}

#[test]
fn wrong_metric_is_an_integrity_violation() {
    let store = store_with(&regret_rows());
    let pick_spiky = BoundSelectionRule::from_fn("pick_spiky", |_: &[ObservedRecord], _| Some(SPIKY));
    let err = RegretCalculator::new(&store)
        .regrets_for_rule(&pick_spiky, &[STABLE, SPIKY], &regret_times(), "recall@", "100_abs")
        .unwrap_err();
    assert!(matches!(err, RegretError::IntegrityViolation { matches: 0, .. }));
}

#[test]
fn several_rules_share_one_fetch() {
    let store = store_with(&regret_rows());
    let registry = MetricRegistry::standard();
    let rules: Vec<BoundSelectionRule> = [
        SelectionRuleSpec::BestCurrentValue {
            metric: "precision@".into(),
            parameter: "100_abs".into(),
        },
        SelectionRuleSpec::LowestMetricVariance {
            metric: "precision@".into(),
            parameter: "100_abs".into(),
        },
    ]
    .iter()
    .map(|spec| spec.bind(&registry))
    .collect();

    let calculator = RegretCalculator::new(&store);
    let all = calculator
        .regrets_for_rules(&rules, &[STABLE, SPIKY], &regret_times(), "precision@", "100_abs")
        .unwrap();
    assert_eq!(all.len(), 2);
    // best current value: stable in 2014, spiky in 2015, stable in 2016
    assert_eq!(all[0], vec![Some(0.15), Some(0.3), Some(0.11)]);
    for (rule, series) in rules.iter().zip(&all) {
        let single = calculator
            .regrets_for_rule(rule, &[STABLE, SPIKY], &regret_times(), "precision@", "100_abs")
            .unwrap();
        assert_eq!(&single, series);
    }
}

#[test]
fn no_candidates_means_no_regrets() {
    let store = store_with(&regret_rows());
    let best = SelectionRuleSpec::BestCurrentValue {
        metric: "precision@".into(),
        parameter: "100_abs".into(),
    }
    .bind(&MetricRegistry::standard());
    let calculator = RegretCalculator::new(&store);

    let regrets = calculator
        .regrets_for_rule(&best, &[], &regret_times(), "precision@", "100_abs")
        .unwrap();
    assert_eq!(regrets, vec![None; regret_times().len()]);

    // groups absent from the table behave the same as no groups at all
    let all = calculator
        .regrets_for_rules(&[best], &[ModelGroupId(99)], &regret_times(), "precision@", "100_abs")
        .unwrap();
    assert_eq!(all, vec![vec![None; 3]]);
}

// ─── Ranked tables ──────────────────────────────────────────────────

/// Evaluations for `values[group][time]`, one model per (group, time).
fn evaluations(values: &[Vec<f64>], times: &[TrainEndTime]) -> InMemoryEvaluations {
    let mut evals = Vec::new();
    for (g, series) in values.iter().enumerate() {
        for (i, value) in series.iter().enumerate() {
            evals.push(EvaluationRecord {
                model_id: ModelId((g * 100 + i) as u64),
                model_group_id: ModelGroupId(g as u64 + 1),
                train_end_time: times[i],
                metric: "precision@".into(),
                parameter: "100_abs".into(),
                value: *value,
            });
        }
    }
    InMemoryEvaluations::new(evals)
}

fn yearly(n: usize) -> Vec<TrainEndTime> {
    (0..n)
        .map(|i| t(&format!("{}-01-01", 2010 + i)))
        .collect()
}

fn ranked_store(values: &[Vec<f64>], times: &[TrainEndTime]) -> DistanceStore<MemoryBackend> {
    let engine = RankingEngine::new(MetricRegistry::standard(), TieBreakSeeds::default());
    let groups: Vec<ModelGroupId> = (1..=values.len() as u64).map(ModelGroupId).collect();
    let mut store = DistanceStore::in_memory();
    store
        .populate(
            &engine,
            &evaluations(values, times),
            &groups,
            times,
            &[MetricKey::new("precision@", "100_abs")],
        )
        .unwrap();
    store
}

#[test]
fn hindsight_rule_has_zero_regret() {
    let values = vec![
        vec![0.6, 0.57, 0.59, 0.61],
        vec![0.4, 0.39, 0.43, 0.7],
        vec![0.8, 0.4, 0.4, 0.3],
    ];
    let times = yearly(4);
    let store = ranked_store(&values, &times);
    let full = store.fetch_all().unwrap();

    // Cheats by reading the next-time column from outside the rule's view.
    let hindsight = BoundSelectionRule::from_fn("hindsight", move |_: &[ObservedRecord], as_of| {
        full.as_of(as_of)
            .records()
            .iter()
            .filter_map(|r| r.below_best_next_time.map(|next| (next, r.model_group_id)))
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
            .map(|(_, group)| group)
            .or(Some(ModelGroupId(1)))
    });
    let groups: Vec<ModelGroupId> = (1..=3).map(ModelGroupId).collect();
    let regrets = RegretCalculator::new(&store)
        .regrets_for_rule(&hindsight, &groups, &times, "precision@", "100_abs")
        .unwrap();

    assert_eq!(regrets.len(), 4);
    assert!(regrets[..3].iter().all(|r| *r == Some(0.0)));
    assert_eq!(regrets[3], None);
}

proptest! {
    #[test]
    fn earlier_regrets_ignore_later_rounds(
        values in prop::collection::vec(prop::collection::vec(0.0f64..1.0, 5), 2..5),
    ) {
        let all_times = yearly(5);
        let earlier: Vec<Vec<f64>> = values.iter().map(|v| v[..4].to_vec()).collect();
        let before = ranked_store(&earlier, &all_times[..4]);
        let after = ranked_store(&values, &all_times);

        let groups: Vec<ModelGroupId> = (1..=values.len() as u64).map(ModelGroupId).collect();
        let spec = SelectionRuleSpec::BestAverageValue {
            metric: "precision@".into(),
            parameter: "100_abs".into(),
        };
        let rule = spec.bind(&MetricRegistry::standard());
        // the last pre-existing round gains a successor, so compare the rounds before it
        let judged = &all_times[..3];

        let r_before = RegretCalculator::new(&before)
            .regrets_for_rule(&rule, &groups, judged, "precision@", "100_abs")
            .unwrap();
        let r_after = RegretCalculator::new(&after)
            .regrets_for_rule(&rule, &groups, judged, "precision@", "100_abs")
            .unwrap();
        prop_assert_eq!(r_before, r_after);
    }
}
