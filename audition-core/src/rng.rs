//! Deterministic tie-break seeds for ranking passes.
//!
//! A master seed is expanded into one sub-seed per ranking partition
//! `(metric, parameter, train_end_time)` via BLAKE3. Derivation is
//! hash-based, so the same master seed produces the same tie-break order
//! regardless of the order (or thread) in which partitions are ranked.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::domain::TrainEndTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TieBreakSeeds {
    master_seed: u64,
}

impl TieBreakSeeds {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Sub-seed for one ranking partition.
    pub fn sub_seed(&self, metric: &str, parameter: &str, train_end_time: TrainEndTime) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.master_seed.to_le_bytes());
        hasher.update(metric.as_bytes());
        // separator so ("ab", "c") and ("a", "bc") differ
        hasher.update(&[0]);
        hasher.update(parameter.as_bytes());
        hasher.update(&train_end_time.and_utc().timestamp_millis().to_le_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(bytes)
    }

    /// Seeded RNG for one ranking partition.
    pub fn rng_for(&self, metric: &str, parameter: &str, train_end_time: TrainEndTime) -> StdRng {
        StdRng::seed_from_u64(self.sub_seed(metric, parameter, train_end_time))
    }
}

impl Default for TieBreakSeeds {
    fn default() -> Self {
        Self::new(42)
    }
}
