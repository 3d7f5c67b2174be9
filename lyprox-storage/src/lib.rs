//! LyProX Storage - Cache Tiers and Record Store
//!
//! The metadata TTL cache, the durable LMDB result cache with its in-memory
//! counterpart, and the in-memory dataset record store.

pub mod cache;
pub mod records;

pub use cache::{
    CacheLookup, CacheRead, CacheStats, InMemoryResultCache, LmdbCacheError, LmdbResultCache,
    MetadataCache, ResultCache, ResultCacheBackend, StoredTable,
};
pub use records::InMemoryRecordStore;

// ============================================================================
// PROPERTY TESTS
// ============================================================================
