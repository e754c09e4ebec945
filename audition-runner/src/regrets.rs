//! Regret calculation for selection rules.
//!
//! A regret is how far the group chosen by a rule at time T trails the best
//! group at the group's next evaluation round. At each T the rule sees only
//! rows at or before T, with the next-time column stripped; the realized
//! regret is then read from the full history.

use rayon::prelude::*;
use thiserror::Error;

use audition_core::{
    DistanceBackend, DistanceHistory, DistanceStore, ModelGroupId, StoreError, TrainEndTime,
};

use crate::selection_rules::BoundSelectionRule;

#[derive(Debug, Error)]
pub enum RegretError {
    /// The distance table and the requested lookup disagree.
    #[error(
        "distance table integrity violation: expected exactly one row for model group \
         {model_group_id} at {train_end_time} on {metric}{parameter}, found {matches}"
    )]
    IntegrityViolation {
        model_group_id: ModelGroupId,
        train_end_time: TrainEndTime,
        metric: String,
        parameter: String,
        matches: usize,
    },

    #[error("selection rule '{rule}' chose no model group at {train_end_time}")]
    NoSelection {
        rule: String,
        train_end_time: TrainEndTime,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct RegretCalculator<'a, B> {
    store: &'a DistanceStore<B>,
}

impl<'a, B: DistanceBackend> RegretCalculator<'a, B> {
    pub fn new(store: &'a DistanceStore<B>) -> Self {
        Self { store }
    }

    /// Regret of following `rule` at each of `train_end_times`, in order.
    ///
    /// `None` means the chosen group has no later round to be judged on.
    pub fn regrets_for_rule(
        &self,
        rule: &BoundSelectionRule,
        model_group_ids: &[ModelGroupId],
        train_end_times: &[TrainEndTime],
        metric: &str,
        parameter: &str,
    ) -> Result<Vec<Option<f64>>, RegretError> {
        let history = self.store.fetch(model_group_ids)?;
        regrets_from_history(&history, rule, train_end_times, metric, parameter)
    }

    /// Regrets for several rules against a single fetch, one series per
    /// rule in input order. Rules are evaluated in parallel.
    pub fn regrets_for_rules(
        &self,
        rules: &[BoundSelectionRule],
        model_group_ids: &[ModelGroupId],
        train_end_times: &[TrainEndTime],
        metric: &str,
        parameter: &str,
    ) -> Result<Vec<Vec<Option<f64>>>, RegretError> {
        let history = self.store.fetch(model_group_ids)?;
        rules
            .par_iter()
            .map(|rule| regrets_from_history(&history, rule, train_end_times, metric, parameter))
            .collect()
    }
}

/// Regrets computed against an already-fetched history.
///
/// An empty history (no candidate groups) yields `None` at every time; a
/// rule declining to choose while candidates exist is an error.
pub fn regrets_from_history(
    history: &DistanceHistory,
    rule: &BoundSelectionRule,
    train_end_times: &[TrainEndTime],
    metric: &str,
    parameter: &str,
) -> Result<Vec<Option<f64>>, RegretError> {
    if history.is_empty() {
        tracing::debug!(
            rule = rule.descriptive_name(),
            "no candidate rows, no regrets to realize"
        );
        return Ok(vec![None; train_end_times.len()]);
    }
    let mut regrets = Vec::with_capacity(train_end_times.len());
    for &train_end_time in train_end_times {
        let localized = history.up_to(train_end_time);
        let choice = rule
            .pick(&localized, train_end_time)
            .ok_or_else(|| RegretError::NoSelection {
                rule: rule.descriptive_name().to_string(),
                train_end_time,
            })?;

        let matches = history.lookup(choice, train_end_time, metric, parameter);
        let [record] = matches.as_slice() else {
            return Err(RegretError::IntegrityViolation {
                model_group_id: choice,
                train_end_time,
                metric: metric.to_string(),
                parameter: parameter.to_string(),
                matches: matches.len(),
            });
        };
        tracing::debug!(
            rule = rule.descriptive_name(),
            %train_end_time,
            model_group_id = %choice,
            regret = ?record.below_best_next_time,
            "selection rule regret"
        );
        regrets.push(record.below_best_next_time);
    }
    Ok(regrets)
}
