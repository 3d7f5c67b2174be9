//! Bounded TTL cache for collection metadata.
//!
//! Remote metadata (visibility, last push) is cheap but rate limited, so
//! lookups are cached per collection for a fixed time-to-live. The cache is
//! bounded; when full, the least recently used entry is evicted.
//!
//! At most one remote lookup is in flight per collection. Concurrent callers
//! for the same collection wait on a per-key async lock and then read the
//! entry the first caller stored. Failed lookups are never cached.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use lyprox_core::{
    CollectionMetadata, LoaderConfig, LyproxError, LyproxResult, MetadataSource, StorageError,
};
use tokio::time::Instant;

use super::key_lock::KeyLocks;
use super::traits::CacheStats;

#[derive(Debug, Clone)]
struct Entry {
    metadata: CollectionMetadata,
    fetched_at: Instant,
    last_used: u64,
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<String, Entry>,
    clock: u64,
    stats: CacheStats,
}

impl State {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Fresh entry for `collection`, marking it as recently used.
    fn fresh(&mut self, collection: &str, ttl: Duration) -> Option<CollectionMetadata> {
        let now = self.tick();
        let entry = self.entries.get_mut(collection)?;
        if entry.fetched_at.elapsed() >= ttl {
            return None;
        }
        entry.last_used = now;
        Some(entry.metadata.clone())
    }

    fn insert(&mut self, collection: &str, metadata: CollectionMetadata, capacity: usize) {
        if !self.entries.contains_key(collection) && self.entries.len() >= capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                self.entries.remove(&oldest);
                self.stats.evictions += 1;
                tracing::debug!(collection = %oldest, "Evicted metadata cache entry");
            }
        }

        let last_used = self.tick();
        self.entries.insert(
            collection.to_string(),
            Entry {
                metadata,
                fetched_at: Instant::now(),
                last_used,
            },
        );
    }
}

/// TTL + LRU cache in front of a [`MetadataSource`].
pub struct MetadataCache {
    source: Arc<dyn MetadataSource>,
    capacity: usize,
    ttl: Duration,
    state: Mutex<State>,
    in_flight: KeyLocks<String>,
}

impl std::fmt::Debug for MetadataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataCache")
            .field("capacity", &self.capacity)
            .field("ttl", &self.ttl)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl MetadataCache {
    /// Create a cache holding at most `capacity` collections for `ttl` each.
    ///
    /// A capacity of zero is treated as one.
    pub fn new(source: Arc<dyn MetadataSource>, capacity: usize, ttl: Duration) -> Self {
        Self {
            source,
            capacity: capacity.max(1),
            ttl,
            state: Mutex::new(State::default()),
            in_flight: KeyLocks::new(),
        }
    }

    pub fn from_config(source: Arc<dyn MetadataSource>, config: &LoaderConfig) -> Self {
        Self::new(source, config.metadata_cache_capacity, config.metadata_ttl)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn state(&self) -> LyproxResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| LyproxError::Storage(StorageError::LockPoisoned))
    }

    /// Metadata for `collection`, from cache while fresh, else from the source.
    ///
    /// # Errors
    ///
    /// Propagates the source's error unchanged; nothing is cached on failure.
    pub async fn get(&self, collection: &str) -> LyproxResult<CollectionMetadata> {
        if let Some(metadata) = self.cached(collection)? {
            return Ok(metadata);
        }

        let handle = self.in_flight.handle(&collection.to_string())?;
        let _guard = handle.lock().await;
        self.fetch_locked(collection).await
    }

    async fn fetch_locked(&self, collection: &str) -> LyproxResult<CollectionMetadata> {
        // The caller that held the lock before us may have refreshed the entry.
        if let Some(metadata) = self.cached(collection)? {
            return Ok(metadata);
        }

        {
            let mut state = self.state()?;
            state.stats.misses += 1;
            state.stats.loads += 1;
        }

        let metadata = self.source.fetch_metadata(collection).await?;

        self.state()?
            .insert(collection, metadata.clone(), self.capacity);

        tracing::debug!(
            collection = %collection,
            is_private = metadata.is_private,
            last_updated_at = %metadata.last_updated_at,
            "Refreshed collection metadata"
        );

        Ok(metadata)
    }

    fn cached(&self, collection: &str) -> LyproxResult<Option<CollectionMetadata>> {
        let mut state = self.state()?;
        let found = state.fresh(collection, self.ttl);
        if found.is_some() {
            state.stats.hits += 1;
        }
        Ok(found)
    }

    /// Drop the entry for `collection`. Returns whether one was cached.
    pub fn invalidate(&self, collection: &str) -> bool {
        self.state
            .lock()
            .map(|mut state| state.entries.remove(collection).is_some())
            .unwrap_or(false)
    }

    pub fn clear(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.entries.clear();
        }
    }

    /// Number of cached entries, expired ones included until replaced.
    pub fn len(&self) -> usize {
        self.state.lock().map(|state| state.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.state
            .lock()
            .map(|state| CacheStats {
                entry_count: state.entries.len() as u64,
                ..state.stats.clone()
            })
            .unwrap_or_default()
    }
}
