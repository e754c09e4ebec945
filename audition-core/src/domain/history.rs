//! In-memory distance table, as fetched from the store.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::ids::{MetricKey, ModelGroupId};
use super::record::{DistanceRecord, ObservedRecord, TrainEndTime};

/// Read-only collection of distance records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DistanceHistory {
    records: Vec<DistanceRecord>,
}

impl DistanceHistory {
    pub fn new(records: Vec<DistanceRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[DistanceRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<DistanceRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records whose group is in `group_ids`.
    pub fn for_groups(&self, group_ids: &[ModelGroupId]) -> Self {
        let wanted: BTreeSet<ModelGroupId> = group_ids.iter().copied().collect();
        self.filtered(|r| wanted.contains(&r.model_group_id))
    }

    /// Records at exactly `train_end_time`.
    pub fn as_of(&self, train_end_time: TrainEndTime) -> Self {
        self.filtered(|r| r.train_end_time == train_end_time)
    }

    /// Records for one metric, in table order.
    pub fn for_metric<'a>(
        &'a self,
        metric: &'a str,
        parameter: &'a str,
    ) -> impl Iterator<Item = &'a DistanceRecord> + 'a {
        self.records
            .iter()
            .filter(move |r| r.is_metric(metric, parameter))
    }

    /// Everything known at `train_end_time`: rows at or before it, with the
    /// next-time column stripped.
    pub fn up_to(&self, train_end_time: TrainEndTime) -> Vec<ObservedRecord> {
        self.records
            .iter()
            .filter(|r| r.train_end_time <= train_end_time)
            .map(DistanceRecord::observed)
            .collect()
    }

    /// All rows for (group, time, metric).
    pub fn lookup(
        &self,
        model_group_id: ModelGroupId,
        train_end_time: TrainEndTime,
        metric: &str,
        parameter: &str,
    ) -> Vec<&DistanceRecord> {
        self.records
            .iter()
            .filter(|r| {
                r.model_group_id == model_group_id
                    && r.train_end_time == train_end_time
                    && r.is_metric(metric, parameter)
            })
            .collect()
    }

    /// Distinct train end times, ascending.
    pub fn train_end_times(&self) -> Vec<TrainEndTime> {
        let set: BTreeSet<TrainEndTime> = self.records.iter().map(|r| r.train_end_time).collect();
        set.into_iter().collect()
    }

    pub fn model_group_ids(&self) -> BTreeSet<ModelGroupId> {
        self.records.iter().map(|r| r.model_group_id).collect()
    }

    pub fn metric_keys(&self) -> BTreeSet<MetricKey> {
        self.records.iter().map(DistanceRecord::metric_key).collect()
    }

    fn filtered<F>(&self, keep: F) -> Self
    where
        F: Fn(&DistanceRecord) -> bool,
    {
        Self {
            records: self.records.iter().filter(|r| keep(r)).cloned().collect(),
        }
    }
}

impl From<Vec<DistanceRecord>> for DistanceHistory {
    fn from(records: Vec<DistanceRecord>) -> Self {
        Self::new(records)
    }
}

impl FromIterator<DistanceRecord> for DistanceHistory {
    fn from_iter<I: IntoIterator<Item = DistanceRecord>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
