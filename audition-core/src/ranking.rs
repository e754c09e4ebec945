//! Ranking engine: distance from best per evaluation round.
//!
//! For each requested metric, evaluations are partitioned by train end time
//! and ranked by score in the metric's preferred direction, with ties broken
//! by a seeded random key. Every model's `below_best` is its shortfall from
//! the partition's rank-1 score. `below_best_next_time` pairs each row of a
//! group's time-ordered series with the group's row at its next train end
//! time.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use rand::Rng;
use rayon::prelude::*;

use crate::directionality::Directionality;
use crate::domain::{DistanceRecord, EvaluationRecord, MetricKey, ModelGroupId, TrainEndTime};
use crate::rng::TieBreakSeeds;
use crate::source::{EvaluationQuery, EvaluationSource, SourceError};

pub struct RankingEngine<D> {
    directionality: D,
    seeds: TieBreakSeeds,
}

impl<D: Directionality> RankingEngine<D> {
    pub fn new(directionality: D, seeds: TieBreakSeeds) -> Self {
        Self {
            directionality,
            seeds,
        }
    }

    pub fn seeds(&self) -> TieBreakSeeds {
        self.seeds
    }

    /// Distance records for every metric, in request order.
    ///
    /// Metrics are ranked in parallel; their partitions never overlap.
    pub fn rank(
        &self,
        source: &dyn EvaluationSource,
        model_group_ids: &[ModelGroupId],
        train_end_times: &[TrainEndTime],
        metrics: &[MetricKey],
    ) -> Result<Vec<DistanceRecord>, SourceError> {
        let per_metric: Vec<Vec<DistanceRecord>> = metrics
            .par_iter()
            .map(|metric| self.rank_metric(source, model_group_ids, train_end_times, metric))
            .collect::<Result<_, _>>()?;
        Ok(per_metric.into_iter().flatten().collect())
    }

    /// Distance records for one metric.
    pub fn rank_metric(
        &self,
        source: &dyn EvaluationSource,
        model_group_ids: &[ModelGroupId],
        train_end_times: &[TrainEndTime],
        metric: &MetricKey,
    ) -> Result<Vec<DistanceRecord>, SourceError> {
        let query = EvaluationQuery::new(model_group_ids, train_end_times, metric.clone());
        let evaluations = source.evaluations(&query)?;
        let records = self.rank_evaluations(metric, evaluations);
        tracing::debug!(%metric, rows = records.len(), "ranked metric");
        Ok(records)
    }

    /// Rank already-selected evaluations of a single metric.
    ///
    /// Rows are returned grouped by train end time (ascending), best first
    /// within each round.
    pub fn rank_evaluations(
        &self,
        metric: &MetricKey,
        evaluations: Vec<EvaluationRecord>,
    ) -> Vec<DistanceRecord> {
        let greater_is_better = self.directionality.greater_is_better(&metric.metric);

        let mut partitions: BTreeMap<TrainEndTime, Vec<EvaluationRecord>> = BTreeMap::new();
        for eval in evaluations {
            if !metric.matches(&eval.metric, &eval.parameter) {
                continue;
            }
            if !eval.value.is_finite() {
                tracing::warn!(
                    model_id = %eval.model_id,
                    %metric,
                    value = eval.value,
                    "skipping non-finite evaluation value"
                );
                continue;
            }
            partitions.entry(eval.train_end_time).or_default().push(eval);
        }

        let mut records = Vec::new();
        for (train_end_time, partition) in partitions {
            let ranked = self.rank_partition(metric, train_end_time, partition, greater_is_better);
            records.extend(ranked);
        }

        fill_next_time(&mut records);
        records
    }

    fn rank_partition(
        &self,
        metric: &MetricKey,
        train_end_time: TrainEndTime,
        mut partition: Vec<EvaluationRecord>,
        greater_is_better: bool,
    ) -> Vec<DistanceRecord> {
        // Draw tie-break keys in a source-independent order.
        partition.sort_by_key(|e| (e.model_id, e.model_group_id));
        let mut rng = self
            .seeds
            .rng_for(&metric.metric, &metric.parameter, train_end_time);
        let mut keyed: Vec<(EvaluationRecord, u64)> = partition
            .into_iter()
            .map(|e| {
                let key = rng.gen::<u64>();
                (e, key)
            })
            .collect();

        keyed.sort_by(|(a, ka), (b, kb)| {
            preferred_order(a.value, b.value, greater_is_better).then(ka.cmp(kb))
        });

        let Some(best) = keyed.first().map(|(e, _)| e.value) else {
            return Vec::new();
        };

        keyed
            .into_iter()
            .map(|(e, _)| {
                let below_best = if greater_is_better {
                    best - e.value
                } else {
                    e.value - best
                };
                DistanceRecord {
                    model_group_id: e.model_group_id,
                    model_id: e.model_id,
                    train_end_time: e.train_end_time,
                    metric: e.metric,
                    parameter: e.parameter,
                    raw_value: e.value,
                    below_best,
                    below_best_next_time: None,
                }
            })
            .collect()
    }
}

/// Better scores sort first.
fn preferred_order(a: f64, b: f64, greater_is_better: bool) -> Ordering {
    if greater_is_better {
        b.total_cmp(&a)
    } else {
        a.total_cmp(&b)
    }
}

/// Fill `below_best_next_time` for rows of a single metric.
///
/// `records` must be ordered by train end time, best-ranked first within a
/// time. A group's successor is its next distinct train end time; when the
/// group has several models there, the best-ranked one supplies the value.
fn fill_next_time(records: &mut [DistanceRecord]) {
    // group -> [(time, index of the group's best-ranked row at that time)]
    let mut series: BTreeMap<ModelGroupId, Vec<(TrainEndTime, usize)>> = BTreeMap::new();
    for (idx, rec) in records.iter().enumerate() {
        let points = series.entry(rec.model_group_id).or_default();
        if points.last().map(|(t, _)| *t) != Some(rec.train_end_time) {
            points.push((rec.train_end_time, idx));
        }
    }

    let mut next_values: Vec<Option<f64>> = vec![None; records.len()];
    for (idx, rec) in records.iter().enumerate() {
        let points = &series[&rec.model_group_id];
        let pos = points.partition_point(|(t, _)| *t <= rec.train_end_time);
        next_values[idx] = points.get(pos).map(|(_, next_idx)| records[*next_idx].below_best);
    }

    for (rec, next) in records.iter_mut().zip(next_values) {
        rec.below_best_next_time = next;
    }
}
