//! Durable result cache backend trait and shared statistics.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lyprox_core::{CacheKey, LyproxResult, NormalizedTable};
use serde::{Deserialize, Serialize};

/// Outcome of a single backend lookup.
///
/// `existed_before` is reported separately from the value: an entry that
/// exists but cannot be decoded yields `existed_before == true` with no
/// value, and the caller treats it as a miss.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheLookup {
    pub existed_before: bool,
    pub value: Option<StoredTable>,
}

/// A decoded cache entry.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTable {
    pub table: NormalizedTable,
    pub stored_at: DateTime<Utc>,
}

impl CacheLookup {
    pub fn absent() -> Self {
        Self {
            existed_before: false,
            value: None,
        }
    }

    pub fn hit(table: NormalizedTable, stored_at: DateTime<Utc>) -> Self {
        Self {
            existed_before: true,
            value: Some(StoredTable { table, stored_at }),
        }
    }

    /// An entry exists under the key but could not be decoded.
    pub fn corrupted() -> Self {
        Self {
            existed_before: true,
            value: None,
        }
    }

    pub fn is_hit(&self) -> bool {
        self.value.is_some()
    }

    pub fn is_corrupted(&self) -> bool {
        self.existed_before && self.value.is_none()
    }
}

/// Content-addressed store for normalized tables.
///
/// Entries are written once per key and never expire. Implementations must
/// make concurrent `store` calls for the same key idempotent and must never
/// expose a partially written value to `lookup`.
#[async_trait]
pub trait ResultCacheBackend: Send + Sync {
    /// Look up the entry stored under `key`.
    ///
    /// Undecodable entries are reported through [`CacheLookup::corrupted`]
    /// rather than as an error.
    async fn lookup(&self, key: &CacheKey) -> LyproxResult<CacheLookup>;

    /// Store `table` under `key`, replacing any previous entry.
    async fn store(&self, key: &CacheKey, table: &NormalizedTable) -> LyproxResult<()>;

    /// Remove the entry under `key`. Returns whether one existed.
    async fn remove(&self, key: &CacheKey) -> LyproxResult<bool>;

    async fn stats(&self) -> LyproxResult<CacheStats>;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
    /// Approximate size of stored values in bytes.
    pub memory_bytes: u64,
    /// Number of evictions due to capacity.
    pub evictions: u64,
    /// Number of undecodable entries encountered.
    pub corruptions: u64,
    /// Number of times a value was fetched or computed to fill a miss.
    pub loads: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
