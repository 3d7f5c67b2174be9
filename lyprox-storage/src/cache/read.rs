//! Cache read wrapper carrying provenance.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Result of a cache read, recording whether it was served from the cache
/// or freshly computed.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    value: T,
    /// When the value was stored (hit) or computed (miss).
    cached_at: DateTime<Utc>,
    was_cache_hit: bool,
}

impl<T> CacheRead<T> {
    /// A value served from the cache.
    pub fn from_cache(value: T, cached_at: DateTime<Utc>) -> Self {
        Self {
            value,
            cached_at,
            was_cache_hit: true,
        }
    }

    /// A value computed on a miss.
    pub fn from_source(value: T) -> Self {
        Self {
            value,
            cached_at: Utc::now(),
            was_cache_hit: false,
        }
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn cached_at(&self) -> DateTime<Utc> {
        self.cached_at
    }

    /// Time elapsed since the value was cached.
    pub fn age(&self) -> Duration {
        (Utc::now() - self.cached_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    pub fn was_cache_hit(&self) -> bool {
        self.was_cache_hit
    }

    pub fn was_cache_miss(&self) -> bool {
        !self.was_cache_hit
    }

    /// Map the inner value to a new type.
    pub fn map<U, F>(self, f: F) -> CacheRead<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheRead {
            value: f(self.value),
            cached_at: self.cached_at,
            was_cache_hit: self.was_cache_hit,
        }
    }
}

impl<T> AsRef<T> for CacheRead<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}
