//! Memoizing front of the durable result cache.

use std::future::Future;
use std::sync::Arc;

use lyprox_core::{CacheKey, LyproxResult, NormalizedTable};

use super::key_lock::KeyLocks;
use super::read::CacheRead;
use super::traits::{CacheLookup, CacheStats, ResultCacheBackend};

/// Explicit `get_or_compute` over a [`ResultCacheBackend`].
///
/// Computation is serialized per key: concurrent callers for the same key
/// wait for the first computation and then read its stored result, while
/// different keys proceed independently.
pub struct ResultCache<B>
where
    B: ResultCacheBackend + ?Sized,
{
    backend: Arc<B>,
    compute_locks: KeyLocks<CacheKey>,
}

impl<B> ResultCache<B>
where
    B: ResultCacheBackend + ?Sized,
{
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            compute_locks: KeyLocks::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Return the cached table for `key`, or run `compute` and store its result.
    ///
    /// A corrupted entry counts as a miss and is overwritten. A failed
    /// computation is propagated and nothing is stored.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &CacheKey,
        compute: F,
    ) -> LyproxResult<CacheRead<NormalizedTable>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = LyproxResult<NormalizedTable>>,
    {
        if let Some(read) = Self::as_read(self.backend.lookup(key).await?) {
            return Ok(read);
        }

        let handle = self.compute_locks.handle(key)?;
        let _guard = handle.lock().await;
        self.compute_locked(key, compute).await
    }

    async fn compute_locked<F, Fut>(
        &self,
        key: &CacheKey,
        compute: F,
    ) -> LyproxResult<CacheRead<NormalizedTable>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = LyproxResult<NormalizedTable>>,
    {
        // Another caller may have filled the entry while we waited.
        let lookup = self.backend.lookup(key).await?;
        let overwrite = lookup.is_corrupted();
        if let Some(read) = Self::as_read(lookup) {
            return Ok(read);
        }

        let table = compute().await?;
        self.backend.store(key, &table).await?;

        if overwrite {
            tracing::info!(key = %key, "Replaced corrupted durable cache entry");
        }

        Ok(CacheRead::from_source(table))
    }

    /// Look up `key` without computing.
    pub async fn get(&self, key: &CacheKey) -> LyproxResult<Option<CacheRead<NormalizedTable>>> {
        Ok(Self::as_read(self.backend.lookup(key).await?))
    }

    pub async fn invalidate(&self, key: &CacheKey) -> LyproxResult<bool> {
        self.backend.remove(key).await
    }

    pub async fn stats(&self) -> LyproxResult<CacheStats> {
        self.backend.stats().await
    }

    fn as_read(lookup: CacheLookup) -> Option<CacheRead<NormalizedTable>> {
        lookup
            .value
            .map(|stored| CacheRead::from_cache(stored.table, stored.stored_at))
    }

    #[cfg(test)]
    fn pending_locks(&self) -> usize {
        self.compute_locks.len()
    }
}
