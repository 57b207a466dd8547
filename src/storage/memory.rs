use super::{SeriesStore, StoreError};
use crate::sampler::Sample;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

/// In-process series store. Lives as long as the process does.
#[derive(Debug, Default)]
pub struct MemoryStore {
    series: RwLock<HashMap<String, Vec<Sample>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SeriesStore for MemoryStore {
    fn append(&self, sample: &Sample) -> Result<(), StoreError> {
        self.series
            .write()
            .entry(sample.entity_key.clone())
            .or_default()
            .push(sample.clone());
        Ok(())
    }

    fn read_all(&self, entity_key: &str) -> Result<Vec<Sample>, StoreError> {
        Ok(self.series.read().get(entity_key).cloned().unwrap_or_default())
    }

    fn entities(&self) -> Result<Vec<String>, StoreError> {
        let mut keys: Vec<String> = self.series.read().keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    fn last_timestamp(&self, entity_key: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self
            .series
            .read()
            .get(entity_key)
            .and_then(|s| s.last())
            .map(|s| s.timestamp))
    }
}
