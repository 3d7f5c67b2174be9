//! LMDB-backed durable result cache.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a memory-mapped
//! key-value store for normalized tables that survives process restarts.
//!
//! # Entry Format
//!
//! Keys are the 32 raw bytes of a [`CacheKey`]. Values are
//! `[stored_at millis: 8 bytes LE][json NormalizedTable]`.
//!
//! # Thread Safety
//!
//! LMDB serializes write transactions and gives readers an MVCC snapshot,
//! so a lookup observes either the previous value or the committed new one.
//! Statistics are kept behind an `RwLock`.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use lyprox_core::{CacheKey, LyproxResult, NormalizedTable, StorageError};

use super::traits::{CacheLookup, CacheStats, ResultCacheBackend};

const TIMESTAMP_LEN: usize = 8;

/// Error type for LMDB cache operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbCacheError> for lyprox_core::LyproxError {
    fn from(e: LmdbCacheError) -> Self {
        lyprox_core::LyproxError::Storage(StorageError::TransactionFailed {
            reason: e.to_string(),
        })
    }
}

/// Decoded form of a raw LMDB value.
enum Decoded {
    Table(NormalizedTable, DateTime<Utc>),
    Corrupted(String),
}

fn encode_entry(
    table: &NormalizedTable,
    stored_at: DateTime<Utc>,
) -> Result<Vec<u8>, LmdbCacheError> {
    let value_bytes =
        serde_json::to_vec(table).map_err(|e| LmdbCacheError::Serialization(e.to_string()))?;

    let mut full_bytes = Vec::with_capacity(TIMESTAMP_LEN + value_bytes.len());
    full_bytes.extend_from_slice(&stored_at.timestamp_millis().to_le_bytes());
    full_bytes.extend_from_slice(&value_bytes);
    Ok(full_bytes)
}

fn decode_entry(bytes: &[u8]) -> Decoded {
    if bytes.len() < TIMESTAMP_LEN {
        return Decoded::Corrupted(format!("entry is only {} bytes long", bytes.len()));
    }

    let mut timestamp_bytes = [0u8; TIMESTAMP_LEN];
    timestamp_bytes.copy_from_slice(&bytes[..TIMESTAMP_LEN]);
    let Some(stored_at) = DateTime::from_timestamp_millis(i64::from_le_bytes(timestamp_bytes))
    else {
        return Decoded::Corrupted("timestamp out of range".to_string());
    };

    match serde_json::from_slice(&bytes[TIMESTAMP_LEN..]) {
        Ok(table) => Decoded::Table(table, stored_at),
        Err(e) => Decoded::Corrupted(e.to_string()),
    }
}

/// LMDB-backed [`ResultCacheBackend`].
///
/// # Example
///
/// ```ignore
/// use lyprox_storage::cache::LmdbResultCache;
///
/// let backend = LmdbResultCache::new("/var/cache/lyprox", 1024)?;
/// backend.store(&identity.cache_key(), &table).await?;
/// let lookup = backend.lookup(&identity.cache_key()).await?;
/// ```
pub struct LmdbResultCache {
    env: Env,
    db: Database<Bytes, Bytes>,
    path: PathBuf,
    stats: RwLock<CacheStats>,
}

impl std::fmt::Debug for LmdbResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbResultCache")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl LmdbResultCache {
    /// Open (or create) the cache in `path`.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the LMDB
    /// environment or database cannot be opened.
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCacheError> {
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per directory by this type
        // and the files are not modified by anything but LMDB itself.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb.saturating_mul(1024 * 1024))
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;

        let entry_count = db
            .len(&wtxn)
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        tracing::debug!(
            path = %path.as_ref().display(),
            entries = entry_count,
            "Opened durable result cache"
        );

        Ok(Self {
            env,
            db,
            path: path.as_ref().to_path_buf(),
            stats: RwLock::new(CacheStats {
                entry_count,
                ..CacheStats::default()
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn record(&self, update: impl FnOnce(&mut CacheStats)) {
        if let Ok(mut stats) = self.stats.write() {
            update(&mut stats);
        }
    }

    fn read_entry(&self, key: &CacheKey) -> Result<Option<Decoded>, LmdbCacheError> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let bytes = self
            .db
            .get(&rtxn, key.as_bytes().as_slice())
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        Ok(bytes.map(decode_entry))
    }

    /// Write raw bytes under `key`, returning whether the key was new.
    fn write_bytes(&self, key: &CacheKey, bytes: &[u8]) -> Result<bool, LmdbCacheError> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let is_new = self
            .db
            .get(&wtxn, key.as_bytes().as_slice())
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?
            .is_none();

        self.db
            .put(&mut wtxn, key.as_bytes().as_slice(), bytes)
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        Ok(is_new)
    }

    fn delete_entry(&self, key: &CacheKey) -> Result<bool, LmdbCacheError> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let deleted = self
            .db
            .delete(&mut wtxn, key.as_bytes().as_slice())
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        Ok(deleted)
    }

    /// Overwrite an entry with arbitrary bytes.
    #[cfg(test)]
    pub(crate) fn put_raw(&self, key: &CacheKey, bytes: &[u8]) -> Result<(), LmdbCacheError> {
        if self.write_bytes(key, bytes)? {
            self.record(|stats| stats.entry_count += 1);
        }
        Ok(())
    }
}

#[async_trait]
impl ResultCacheBackend for LmdbResultCache {
    async fn lookup(&self, key: &CacheKey) -> LyproxResult<CacheLookup> {
        match self.read_entry(key)? {
            Some(Decoded::Table(table, stored_at)) => {
                self.record(|stats| stats.hits += 1);
                Ok(CacheLookup::hit(table, stored_at))
            }
            Some(Decoded::Corrupted(reason)) => {
                tracing::warn!(
                    key = %key,
                    reason = %reason,
                    "Durable cache entry is corrupted, treating as miss"
                );
                self.record(|stats| {
                    stats.misses += 1;
                    stats.corruptions += 1;
                });
                Ok(CacheLookup::corrupted())
            }
            None => {
                self.record(|stats| stats.misses += 1);
                Ok(CacheLookup::absent())
            }
        }
    }

    async fn store(&self, key: &CacheKey, table: &NormalizedTable) -> LyproxResult<()> {
        let bytes = encode_entry(table, Utc::now())?;
        let is_new = self.write_bytes(key, &bytes)?;

        self.record(|stats| {
            if is_new {
                stats.entry_count += 1;
            }
            stats.memory_bytes += bytes.len() as u64;
        });

        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> LyproxResult<bool> {
        let deleted = self.delete_entry(key)?;
        if deleted {
            self.record(|stats| stats.entry_count = stats.entry_count.saturating_sub(1));
        }
        Ok(deleted)
    }

    async fn stats(&self) -> LyproxResult<CacheStats> {
        Ok(self
            .stats
            .read()
            .map(|s| s.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lyprox_core::{ColumnKey, RawColumn, RawTable, RawValue};
    use lyprox_schema::Normalizer;
    use lyprox_test_utils::fixtures;
    use tempfile::TempDir;

    fn create_test_backend() -> (LmdbResultCache, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let backend =
            LmdbResultCache::new(temp_dir.path(), 10).expect("backend creation should succeed");
        (backend, temp_dir)
    }

    fn sample_table() -> NormalizedTable {
        Normalizer::new(fixtures::small_catalog())
            .normalize(&fixtures::pet_only_table())
            .expect("fixture should normalize")
    }

    #[tokio::test]
    async fn test_store_and_lookup() {
        let (backend, _temp_dir) = create_test_backend();
        let key = fixtures::usz_identity().cache_key();
        let table = sample_table();

        let before = backend.lookup(&key).await.expect("lookup should succeed");
        assert!(!before.existed_before);

        backend.store(&key, &table).await.expect("store should succeed");

        let after = backend.lookup(&key).await.expect("lookup should succeed");
        assert!(after.existed_before);
        let stored = after.value.expect("entry should decode");
        assert_eq!(stored.table, table);
        assert!((Utc::now() - stored.stored_at).num_seconds().abs() < 5);
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let key = fixtures::usz_identity().cache_key();
        let table = sample_table();

        {
            let backend = LmdbResultCache::new(temp_dir.path(), 10).expect("open");
            backend.store(&key, &table).await.expect("store should succeed");
        }

        let reopened = LmdbResultCache::new(temp_dir.path(), 10).expect("reopen");
        let lookup = reopened.lookup(&key).await.expect("lookup should succeed");
        assert_eq!(lookup.value.map(|stored| stored.table), Some(table));
        let stats = reopened.stats().await.expect("stats should succeed");
        assert_eq!(stats.entry_count, 1);
    }

    #[tokio::test]
    async fn test_passthrough_floats_survive_reopen() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let key = fixtures::usz_identity().cache_key();

        let values: Vec<RawValue> = (0..600)
            .map(|i| match i % 6 {
                0 => RawValue::Float(i as f64 / 7.0),
                1 => RawValue::Float(i as f64 * 0.1),
                2 => RawValue::Float((i as f64).sqrt()),
                3 => RawValue::Float(1.0715660391465826e-75 * i as f64),
                4 => RawValue::Float(-(i as f64) / 3.0 * 1e300),
                _ => RawValue::Float(f64::MIN_POSITIVE / (i as f64 + 1.0)),
            })
            .collect();
        let rows = values.len();
        let raw = RawTable::new(
            rows,
            vec![RawColumn::new(ColumnKey::new("tumor", "1", "volume"), values)],
        )
        .expect("table should build");
        let table = Normalizer::new(fixtures::small_catalog())
            .normalize(&raw)
            .expect("passthrough-only table should normalize");

        {
            let backend = LmdbResultCache::new(temp_dir.path(), 10).expect("open");
            backend.store(&key, &table).await.expect("store should succeed");
        }

        let reopened = LmdbResultCache::new(temp_dir.path(), 10).expect("reopen");
        let lookup = reopened.lookup(&key).await.expect("lookup should succeed");
        assert_eq!(lookup.value.map(|stored| stored.table), Some(table));
    }

    #[tokio::test]
    async fn test_corrupted_entry_is_reported_as_miss() {
        let (backend, _temp_dir) = create_test_backend();
        let key = fixtures::usz_identity().cache_key();

        backend.put_raw(&key, b"\x01\x02\x03").expect("raw write");
        let lookup = backend.lookup(&key).await.expect("corruption is not an error");
        assert!(lookup.is_corrupted());

        let mut truncated = encode_entry(&sample_table(), Utc::now()).expect("encode");
        truncated.truncate(truncated.len() / 2);
        backend.put_raw(&key, &truncated).expect("raw write");
        assert!(backend.lookup(&key).await.expect("lookup").is_corrupted());

        backend.store(&key, &sample_table()).await.expect("overwrite");
        assert!(backend.lookup(&key).await.expect("lookup").is_hit());

        let stats = backend.stats().await.expect("stats should succeed");
        assert_eq!(stats.corruptions, 2);
        assert_eq!(stats.entry_count, 1);
    }

    #[tokio::test]
    async fn test_store_is_idempotent() {
        let (backend, _temp_dir) = create_test_backend();
        let key = fixtures::usz_identity().cache_key();
        let table = sample_table();

        backend.store(&key, &table).await.expect("store should succeed");
        backend.store(&key, &table).await.expect("store should succeed");

        let stats = backend.stats().await.expect("stats should succeed");
        assert_eq!(stats.entry_count, 1);
        assert_eq!(
            backend.lookup(&key).await.expect("lookup").value.map(|s| s.table),
            Some(table)
        );
    }

    #[tokio::test]
    async fn test_remove() {
        let (backend, _temp_dir) = create_test_backend();
        let key = fixtures::usz_identity().cache_key();

        backend.store(&key, &sample_table()).await.expect("store should succeed");
        assert!(backend.remove(&key).await.expect("remove should succeed"));
        assert!(!backend.remove(&key).await.expect("remove should succeed"));
        assert!(!backend.lookup(&key).await.expect("lookup").existed_before);
    }

    #[tokio::test]
    async fn test_keys_do_not_collide() {
        let (backend, _temp_dir) = create_test_backend();
        let table = sample_table();
        backend
            .store(&fixtures::usz_identity().cache_key(), &table)
            .await
            .expect("store should succeed");

        let other = backend
            .lookup(&fixtures::clb_identity().cache_key())
            .await
            .expect("lookup should succeed");
        assert!(!other.existed_before);
    }

    #[tokio::test]
    async fn test_stats() {
        let (backend, _temp_dir) = create_test_backend();
        let key = fixtures::usz_identity().cache_key();

        let _ = backend.lookup(&key).await;
        backend.store(&key, &sample_table()).await.expect("store should succeed");
        let _ = backend.lookup(&key).await;
        let _ = backend.lookup(&key).await;

        let stats = backend.stats().await.expect("stats should succeed");
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.entry_count, 1);
        assert!(stats.memory_bytes > 0);
    }
}
