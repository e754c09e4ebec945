//! Model group thresholding: the "audition" filter.
//!
//! A thresholder holds a working set of surviving model groups. Each
//! `MetricFilter` contributes two conditions per train end time:
//! - close to best: `below_best < max_below_best`
//! - above minimum: `raw_value >= min_value`
//!
//! A group is close to best overall if, at some time, it is close to best on
//! every filter at once; it is above minimum overall if it is above minimum
//! on every filter at every time. Survivors are the intersection of both,
//! restricted to the groups supplied at construction. A group with no row for
//! a (filter, time) pair fails that condition.
//!
//! The whole distance history is fetched once and filtered in memory.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use audition_core::{
    DistanceBackend, DistanceHistory, DistanceRecord, DistanceStore, ModelGroupId, StoreError,
    TrainEndTime,
};

/// One threshold rule over a single metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricFilter {
    pub metric: String,
    pub parameter: String,
    /// Strict upper bound on `below_best`.
    pub max_below_best: f64,
    /// Inclusive lower bound on `raw_value`.
    pub min_value: f64,
}

impl MetricFilter {
    pub fn new(
        metric: impl Into<String>,
        parameter: impl Into<String>,
        max_below_best: f64,
        min_value: f64,
    ) -> Self {
        Self {
            metric: metric.into(),
            parameter: parameter.into(),
            max_below_best,
            min_value,
        }
    }

    fn applies_to(&self, record: &DistanceRecord) -> bool {
        record.is_metric(&self.metric, &self.parameter)
    }

    pub fn is_close_to_best(&self, record: &DistanceRecord) -> bool {
        self.applies_to(record) && record.below_best < self.max_below_best
    }

    pub fn is_above_min(&self, record: &DistanceRecord) -> bool {
        self.applies_to(record) && record.raw_value >= self.min_value
    }
}

#[derive(Debug, Clone)]
pub struct ModelGroupThresholder {
    history: DistanceHistory,
    train_end_times: Vec<TrainEndTime>,
    initial_model_group_ids: BTreeSet<ModelGroupId>,
    model_group_ids: BTreeSet<ModelGroupId>,
    metric_filters: Vec<MetricFilter>,
}

impl ModelGroupThresholder {
    pub fn new(
        history: DistanceHistory,
        train_end_times: Vec<TrainEndTime>,
        initial_model_group_ids: &[ModelGroupId],
    ) -> Self {
        let initial: BTreeSet<ModelGroupId> = initial_model_group_ids.iter().copied().collect();
        Self {
            history,
            train_end_times,
            model_group_ids: initial.clone(),
            initial_model_group_ids: initial,
            metric_filters: Vec::new(),
        }
    }

    /// Bulk-fetch the candidates' history from `store`.
    pub fn from_store<B: DistanceBackend>(
        store: &DistanceStore<B>,
        train_end_times: Vec<TrainEndTime>,
        initial_model_group_ids: &[ModelGroupId],
    ) -> Result<Self, StoreError> {
        let history = store.fetch(initial_model_group_ids)?;
        Ok(Self::new(history, train_end_times, initial_model_group_ids))
    }

    /// Current surviving groups.
    pub fn model_group_ids(&self) -> &BTreeSet<ModelGroupId> {
        &self.model_group_ids
    }

    pub fn metric_filters(&self) -> &[MetricFilter] {
        &self.metric_filters
    }

    pub fn train_end_times(&self) -> &[TrainEndTime] {
        &self.train_end_times
    }

    /// Replace the active filters, recomputing survivors only if they changed.
    ///
    /// Returns true when a recomputation happened.
    pub fn update_filters(&mut self, metric_filters: Vec<MetricFilter>) -> bool {
        if metric_filters == self.metric_filters {
            return false;
        }
        self.metric_filters = metric_filters;
        self.model_group_ids = self.model_groups_passing_rules();
        true
    }

    /// Groups close to best on every filter at `train_end_time`.
    pub fn close_to_best_as_of(&self, train_end_time: TrainEndTime) -> BTreeSet<ModelGroupId> {
        self.groups_satisfying_all(train_end_time, MetricFilter::is_close_to_best)
    }

    /// Groups at or above every filter's minimum at `train_end_time`.
    pub fn above_min_as_of(&self, train_end_time: TrainEndTime) -> BTreeSet<ModelGroupId> {
        self.groups_satisfying_all(train_end_time, MetricFilter::is_above_min)
    }

    /// Groups passing both conditions at a single time.
    pub fn passing_as_of(&self, train_end_time: TrainEndTime) -> BTreeSet<ModelGroupId> {
        let close = self.close_to_best_as_of(train_end_time);
        let above = self.above_min_as_of(train_end_time);
        close.intersection(&above).copied().collect()
    }

    /// Union of `passing_as_of` over the thresholder's times.
    pub fn passing_any_time(&self) -> BTreeSet<ModelGroupId> {
        self.train_end_times
            .iter()
            .flat_map(|t| self.passing_as_of(*t))
            .collect()
    }

    /// Recompute survivors for the active filters.
    pub fn model_groups_passing_rules(&self) -> BTreeSet<ModelGroupId> {
        let mut close_to_best: BTreeSet<ModelGroupId> = BTreeSet::new();
        let mut above_min: BTreeSet<ModelGroupId> = self.initial_model_group_ids.clone();

        for train_end_time in &self.train_end_times {
            let close = self.close_to_best_as_of(*train_end_time);
            tracing::info!(
                count = close.len(),
                %train_end_time,
                "model groups close to best"
            );
            close_to_best.extend(close);

            let above = self.above_min_as_of(*train_end_time);
            tracing::info!(
                count = above.len(),
                %train_end_time,
                "model groups above minimum"
            );
            above_min.retain(|g| above.contains(g));
        }

        let total: BTreeSet<ModelGroupId> = close_to_best
            .intersection(&above_min)
            .filter(|g| self.initial_model_group_ids.contains(g))
            .copied()
            .collect();
        tracing::info!(count = total.len(), "model groups past threshold");
        total
    }

    /// Candidates satisfying `condition` for every filter at one time.
    fn groups_satisfying_all(
        &self,
        train_end_time: TrainEndTime,
        condition: fn(&MetricFilter, &DistanceRecord) -> bool,
    ) -> BTreeSet<ModelGroupId> {
        let mut passing = self.initial_model_group_ids.clone();
        for filter in &self.metric_filters {
            let satisfied: BTreeSet<ModelGroupId> = self
                .history
                .records()
                .iter()
                .filter(|r| r.train_end_time == train_end_time && condition(filter, *r))
                .map(|r| r.model_group_id)
                .collect();
            passing.retain(|g| satisfied.contains(g));
        }
        passing
    }
}
