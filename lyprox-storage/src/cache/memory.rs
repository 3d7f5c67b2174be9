//! In-memory result cache backend for tests and ephemeral use.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lyprox_core::{CacheKey, LyproxError, LyproxResult, NormalizedTable, StorageError};

use super::traits::{CacheLookup, CacheStats, ResultCacheBackend};

/// Process-local [`ResultCacheBackend`]; contents are lost on drop.
#[derive(Debug, Default)]
pub struct InMemoryResultCache {
    entries: RwLock<HashMap<CacheKey, (NormalizedTable, DateTime<Utc>)>>,
    stats: RwLock<CacheStats>,
}

impl InMemoryResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn record(&self, update: impl FnOnce(&mut CacheStats)) {
        if let Ok(mut stats) = self.stats.write() {
            update(&mut stats);
        }
    }
}

#[async_trait]
impl ResultCacheBackend for InMemoryResultCache {
    async fn lookup(&self, key: &CacheKey) -> LyproxResult<CacheLookup> {
        let found = self
            .entries
            .read()
            .map_err(|_| LyproxError::Storage(StorageError::LockPoisoned))?
            .get(key)
            .cloned();

        match found {
            Some((table, stored_at)) => {
                self.record(|stats| stats.hits += 1);
                Ok(CacheLookup::hit(table, stored_at))
            }
            None => {
                self.record(|stats| stats.misses += 1);
                Ok(CacheLookup::absent())
            }
        }
    }

    async fn store(&self, key: &CacheKey, table: &NormalizedTable) -> LyproxResult<()> {
        let previous = self
            .entries
            .write()
            .map_err(|_| LyproxError::Storage(StorageError::LockPoisoned))?
            .insert(*key, (table.clone(), Utc::now()));

        if previous.is_none() {
            self.record(|stats| stats.entry_count += 1);
        }
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> LyproxResult<bool> {
        let removed = self
            .entries
            .write()
            .map_err(|_| LyproxError::Storage(StorageError::LockPoisoned))?
            .remove(key)
            .is_some();

        if removed {
            self.record(|stats| stats.entry_count = stats.entry_count.saturating_sub(1));
        }
        Ok(removed)
    }

    async fn stats(&self) -> LyproxResult<CacheStats> {
        Ok(self
            .stats
            .read()
            .map(|s| s.clone())
            .unwrap_or_default())
    }
}
