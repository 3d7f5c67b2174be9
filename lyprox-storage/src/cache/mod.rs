//! Two cache tiers with different invalidation policies.
//!
//! - [`MetadataCache`]: small, in-process, bounded, per-entry TTL. Holds
//!   collection metadata that is cheap to fetch and changes slowly.
//! - [`ResultCache`] over a [`ResultCacheBackend`]: durable, content
//!   addressed by [`CacheKey`](lyprox_core::CacheKey), never expires. Holds
//!   normalized tables, which are expensive to produce.
//!
//! Reads from the durable tier return [`CacheRead<T>`], which records
//! whether the value was served from the cache.
//!
//! # Example
//!
//! ```ignore
//! let cache = ResultCache::new(Arc::new(LmdbResultCache::new(dir, 1024)?));
//! let read = cache
//!     .get_or_compute(&identity.cache_key(), || async { fetch_and_normalize().await })
//!     .await?;
//! if read.was_cache_hit() {
//!     tracing::debug!("served from cache");
//! }
//! ```

mod key_lock;
pub mod lmdb_backend;
pub mod memory;
pub mod metadata;
pub mod read;
pub mod result;
pub mod traits;

pub use lmdb_backend::{LmdbCacheError, LmdbResultCache};
pub use memory::InMemoryResultCache;
pub use metadata::MetadataCache;
pub use read::CacheRead;
pub use result::ResultCache;
pub use traits::{CacheLookup, CacheStats, ResultCacheBackend, StoredTable};
