use super::{DistanceBackend, StoreError};
use crate::domain::DistanceRecord;

/// Vector-backed distance table.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    rows: Vec<DistanceRecord>,
}

impl MemoryBackend {
    pub fn with_rows(rows: Vec<DistanceRecord>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl DistanceBackend for MemoryBackend {
    fn create(&mut self) -> Result<(), StoreError> {
        self.rows.clear();
        Ok(())
    }

    fn append(&mut self, records: &[DistanceRecord]) -> Result<(), StoreError> {
        self.rows.extend_from_slice(records);
        Ok(())
    }

    fn scan(&self) -> Result<Vec<DistanceRecord>, StoreError> {
        Ok(self.rows.clone())
    }
}
