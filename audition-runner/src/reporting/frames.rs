//! Frame builders for the three report families.

use std::collections::{BTreeMap, BTreeSet};

use polars::prelude::*;

use audition_core::{DistanceBackend, DistanceHistory, ModelGroupId, TrainEndTime};

use super::{cumulative_within, pct_grid, unit_ticks, PlotSink, PlotSpec, ReportError};
use crate::regrets::RegretCalculator;
use crate::selection_rules::BoundSelectionRule;

/// Category of the synthetic best-per-time series.
pub const BEST_CASE: &str = "best case";

/// Display names for model groups; unlabeled groups show their id.
pub type GroupLabels = BTreeMap<ModelGroupId, String>;

fn category(labels: &GroupLabels, id: ModelGroupId) -> String {
    labels
        .get(&id)
        .cloned()
        .unwrap_or_else(|| id.to_string())
}

/// `below_best` per group for one metric, restricted to the given groups
/// and times and to values accepted by `keep`.
fn below_best_by_group(
    history: &DistanceHistory,
    metric: &str,
    parameter: &str,
    model_group_ids: &[ModelGroupId],
    train_end_times: &[TrainEndTime],
    keep: impl Fn(f64) -> bool,
) -> BTreeMap<ModelGroupId, Vec<f64>> {
    let groups: BTreeSet<_> = model_group_ids.iter().copied().collect();
    let times: BTreeSet<_> = train_end_times.iter().copied().collect();
    let mut by_group: BTreeMap<ModelGroupId, Vec<f64>> = BTreeMap::new();
    for r in history.for_metric(metric, parameter) {
        if groups.contains(&r.model_group_id)
            && times.contains(&r.train_end_time)
            && keep(r.below_best)
        {
            by_group.entry(r.model_group_id).or_default().push(r.below_best);
        }
    }
    by_group
}

/// Cumulative distance-from-best curves, one per model group.
#[derive(Debug, Clone, Default)]
pub struct BestDistanceHistogrammer {
    labels: GroupLabels,
}

impl BestDistanceHistogrammer {
    pub fn new(labels: GroupLabels) -> Self {
        Self { labels }
    }

    /// Frame `model_group_id, category, pct_diff, num_models, pct_of_time`
    /// over the full `0.00..=1.00` grid.
    pub fn generate_histogram_data(
        &self,
        history: &DistanceHistory,
        metric: &str,
        parameter: &str,
        model_group_ids: &[ModelGroupId],
        train_end_times: &[TrainEndTime],
    ) -> Result<DataFrame, ReportError> {
        let by_group = below_best_by_group(
            history,
            metric,
            parameter,
            model_group_ids,
            train_end_times,
            |_| true,
        );
        self.histogram_frame(&by_group, &pct_grid(1.0))
    }

    /// As [`generate_histogram_data`](Self::generate_histogram_data), but
    /// only counting rows with `below_best <= max_below_best` and with the
    /// grid ending at `max_below_best`.
    pub fn best_dist_within(
        &self,
        history: &DistanceHistory,
        metric: &str,
        parameter: &str,
        max_below_best: f64,
        model_group_ids: &[ModelGroupId],
        train_end_times: &[TrainEndTime],
    ) -> Result<DataFrame, ReportError> {
        if !(0.0..=1.0).contains(&max_below_best) {
            return Err(ReportError::InvalidBound(max_below_best));
        }
        let grid = pct_grid(max_below_best);
        let upper = grid.last().copied().unwrap_or(0.0);
        let by_group = below_best_by_group(
            history,
            metric,
            parameter,
            model_group_ids,
            train_end_times,
            |v| v <= max_below_best,
        );
        // Rounding can pull the grid's end below the bound; the curve must
        // still reach every counted row.
        let grid = if upper < max_below_best {
            let mut g = grid;
            g.push(max_below_best);
            g
        } else {
            grid
        };
        self.histogram_frame(&by_group, &grid)
    }

    /// One plot per metric key.
    pub fn plot_all_best_dist(
        &self,
        sink: &mut dyn PlotSink,
        history: &DistanceHistory,
        metrics: &[(String, String)],
        model_group_ids: &[ModelGroupId],
        train_end_times: &[TrainEndTime],
    ) -> Result<(), ReportError> {
        for (metric, parameter) in metrics {
            let frame = self.generate_histogram_data(
                history,
                metric,
                parameter,
                model_group_ids,
                train_end_times,
            )?;
            let spec = PlotSpec {
                cat_col: "category".into(),
                x_col: "pct_diff".into(),
                y_col: "pct_of_time".into(),
                title: format!("Fraction of models X pp worse than best {metric} {parameter}"),
                x_label: format!("decrease in {metric} from best model"),
                y_label: "fraction of models".into(),
                x_ticks: unit_ticks(),
            };
            sink.plot_cats(&frame, &spec)?;
        }
        Ok(())
    }

    fn histogram_frame(
        &self,
        by_group: &BTreeMap<ModelGroupId, Vec<f64>>,
        grid: &[f64],
    ) -> Result<DataFrame, ReportError> {
        let rows = by_group.len() * grid.len();
        let mut group_col = Vec::with_capacity(rows);
        let mut category_col = Vec::with_capacity(rows);
        let mut pct_diff = Vec::with_capacity(rows);
        let mut num_models = Vec::with_capacity(rows);
        let mut pct_of_time = Vec::with_capacity(rows);

        for (&group, values) in by_group {
            let label = category(&self.labels, group);
            for (&x, fraction) in grid.iter().zip(cumulative_within(values, grid)) {
                group_col.push(group.0);
                category_col.push(label.clone());
                pct_diff.push(x);
                num_models.push(values.len() as u64);
                pct_of_time.push(fraction);
            }
        }

        Ok(DataFrame::new(vec![
            Column::new("model_group_id".into(), group_col),
            Column::new("category".into(), category_col),
            Column::new("pct_diff".into(), pct_diff),
            Column::new("num_models".into(), num_models),
            Column::new("pct_of_time".into(), pct_of_time),
        ])?)
    }
}

/// Cumulative regret curves, one per selection rule.
pub struct SelectionRulePlotter<'a, B> {
    calculator: RegretCalculator<'a, B>,
}

impl<'a, B: DistanceBackend> SelectionRulePlotter<'a, B> {
    pub fn new(calculator: RegretCalculator<'a, B>) -> Self {
        Self { calculator }
    }

    /// Frame `selection_rule, pct_diff, pct_of_time`, see [`regret_curve_frame`].
    pub fn create_plot_frame(
        &self,
        rules: &[BoundSelectionRule],
        model_group_ids: &[ModelGroupId],
        train_end_times: &[TrainEndTime],
        metric: &str,
        parameter: &str,
    ) -> Result<DataFrame, ReportError> {
        let all_regrets = self.calculator.regrets_for_rules(
            rules,
            model_group_ids,
            train_end_times,
            metric,
            parameter,
        )?;
        let named: Vec<(String, Vec<Option<f64>>)> = rules
            .iter()
            .map(|rule| rule.descriptive_name().to_string())
            .zip(all_regrets)
            .collect();
        regret_curve_frame(&named)
    }

    pub fn plot_all_selection_rules(
        &self,
        sink: &mut dyn PlotSink,
        rules: &[BoundSelectionRule],
        model_group_ids: &[ModelGroupId],
        train_end_times: &[TrainEndTime],
        metric: &str,
        parameter: &str,
    ) -> Result<(), ReportError> {
        let frame =
            self.create_plot_frame(rules, model_group_ids, train_end_times, metric, parameter)?;
        sink.plot_cats(&frame, &regret_plot_spec(metric, parameter))
    }
}

/// Frame `selection_rule, pct_diff, pct_of_time` from regret series already
/// computed, one curve per named rule. Times with no later round carry no
/// regret and are left out of each rule's fractions; a rule with no realized
/// regret at all gets a flat zero curve.
pub fn regret_curve_frame(
    named: &[(String, Vec<Option<f64>>)],
) -> Result<DataFrame, ReportError> {
    let grid = pct_grid(1.0);

    let rows = named.len() * grid.len();
    let mut rule_col = Vec::with_capacity(rows);
    let mut pct_diff = Vec::with_capacity(rows);
    let mut pct_of_time = Vec::with_capacity(rows);
    for (name, regrets) in named {
        let realized: Vec<f64> = regrets.iter().flatten().copied().collect();
        for (&x, fraction) in grid.iter().zip(cumulative_within(&realized, &grid)) {
            rule_col.push(name.clone());
            pct_diff.push(x);
            pct_of_time.push(fraction);
        }
    }

    Ok(DataFrame::new(vec![
        Column::new("selection_rule".into(), rule_col),
        Column::new("pct_diff".into(), pct_diff),
        Column::new("pct_of_time".into(), pct_of_time),
    ])?)
}

/// Plot description for the regret curves of `metric`/`parameter`.
pub fn regret_plot_spec(metric: &str, parameter: &str) -> PlotSpec {
    PlotSpec {
        cat_col: "selection_rule".into(),
        x_col: "pct_diff".into(),
        y_col: "pct_of_time".into(),
        title: format!("Fraction of models X pp worse than best {metric} {parameter} next time"),
        x_label: format!("decrease in {metric} next time from best model"),
        y_label: "fraction of models".into(),
        x_ticks: unit_ticks(),
    }
}

/// Raw metric values over time per group, plus the best value per time.
#[derive(Debug, Clone, Default)]
pub struct ModelGroupPerformancePlotter {
    labels: GroupLabels,
}

impl ModelGroupPerformancePlotter {
    pub fn new(labels: GroupLabels) -> Self {
        Self { labels }
    }

    /// Frame `model_group_id, category, train_end_time, raw_value`.
    ///
    /// Rows of the [`BEST_CASE`] series have a null `model_group_id` and
    /// carry the raw value of the top-ranked row at each time.
    pub fn generate_plot_data(
        &self,
        history: &DistanceHistory,
        metric: &str,
        parameter: &str,
        model_group_ids: &[ModelGroupId],
        train_end_times: &[TrainEndTime],
    ) -> Result<DataFrame, ReportError> {
        let groups: BTreeSet<_> = model_group_ids.iter().copied().collect();
        let times: BTreeSet<_> = train_end_times.iter().copied().collect();

        let mut group_rows: Vec<(ModelGroupId, TrainEndTime, f64)> = Vec::new();
        // (below_best, raw_value) of the top row per time
        let mut best: BTreeMap<TrainEndTime, (f64, f64)> = BTreeMap::new();
        for r in history.for_metric(metric, parameter) {
            if !times.contains(&r.train_end_time) {
                continue;
            }
            if groups.contains(&r.model_group_id) {
                group_rows.push((r.model_group_id, r.train_end_time, r.raw_value));
            }
            best.entry(r.train_end_time)
                .and_modify(|b| {
                    if r.below_best < b.0 {
                        *b = (r.below_best, r.raw_value);
                    }
                })
                .or_insert((r.below_best, r.raw_value));
        }
        group_rows.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        let rows = group_rows.len() + best.len();
        let mut group_col: Vec<Option<u64>> = Vec::with_capacity(rows);
        let mut category_col = Vec::with_capacity(rows);
        let mut time_col = Vec::with_capacity(rows);
        let mut raw_col = Vec::with_capacity(rows);
        for (group, time, raw) in group_rows {
            group_col.push(Some(group.0));
            category_col.push(category(&self.labels, group));
            time_col.push(time.and_utc().timestamp_millis());
            raw_col.push(raw);
        }
        for (time, (_, raw)) in best {
            group_col.push(None);
            category_col.push(BEST_CASE.to_string());
            time_col.push(time.and_utc().timestamp_millis());
            raw_col.push(raw);
        }

        Ok(DataFrame::new(vec![
            Column::new("model_group_id".into(), group_col),
            Column::new("category".into(), category_col),
            Column::new("train_end_time".into(), time_col)
                .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?,
            Column::new("raw_value".into(), raw_col),
        ])?)
    }

    pub fn plot_all(
        &self,
        sink: &mut dyn PlotSink,
        history: &DistanceHistory,
        metrics: &[(String, String)],
        model_group_ids: &[ModelGroupId],
        train_end_times: &[TrainEndTime],
    ) -> Result<(), ReportError> {
        for (metric, parameter) in metrics {
            let frame = self.generate_plot_data(
                history,
                metric,
                parameter,
                model_group_ids,
                train_end_times,
            )?;
            let spec = PlotSpec {
                cat_col: "category".into(),
                x_col: "train_end_time".into(),
                y_col: "raw_value".into(),
                title: format!("{metric} {parameter} over time"),
                x_label: "train end time".into(),
                y_label: format!("{metric}{parameter}"),
                x_ticks: Vec::new(),
            };
            sink.plot_cats(&frame, &spec)?;
        }
        Ok(())
    }
}
