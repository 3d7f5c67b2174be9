//! In-memory dataset record store.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use lyprox_core::{
    DatasetIdentity, DatasetRecord, DatasetRecordStore, LyproxError, LyproxResult, StorageError,
};

/// [`DatasetRecordStore`] keeping one record per identity.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: RwLock<BTreeMap<DatasetIdentity, DatasetRecord>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DatasetRecordStore for InMemoryRecordStore {
    async fn save(&self, record: DatasetRecord) -> LyproxResult<()> {
        self.records
            .write()
            .map_err(|_| LyproxError::Storage(StorageError::LockPoisoned))?
            .insert(record.identity.clone(), record);
        Ok(())
    }

    async fn get(&self, identity: &DatasetIdentity) -> LyproxResult<Option<DatasetRecord>> {
        Ok(self
            .records
            .read()
            .map_err(|_| LyproxError::Storage(StorageError::LockPoisoned))?
            .get(identity)
            .cloned())
    }

    async fn list(&self) -> LyproxResult<Vec<DatasetRecord>> {
        Ok(self
            .records
            .read()
            .map_err(|_| LyproxError::Storage(StorageError::LockPoisoned))?
            .values()
            .cloned()
            .collect())
    }
}
