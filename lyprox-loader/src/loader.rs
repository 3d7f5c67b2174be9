//! Dataset facade: one call from identity to normalized table.
//!
//! A load refreshes the collection's metadata record first, then serves
//! the normalized table from the durable cache or, on a miss, fetches the
//! raw table, normalizes it and stores the result.

use std::sync::Arc;
use std::time::{Duration, Instant};

use lyprox_core::{
    CollectionMetadata, DatasetIdentity, DatasetRecord, DatasetRecordStore, LoaderConfig,
    LyproxResult, MetadataSource, NormalizedTable, RawTableSource,
};
use lyprox_schema::Normalizer;
use lyprox_storage::{LmdbResultCache, MetadataCache, ResultCache, ResultCacheBackend};

use crate::timeout::with_timeout;

const RAW_SOURCE: &str = "raw table source";
const METADATA_SOURCE: &str = "metadata source";

/// What happened during one load.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadReport {
    pub identity: DatasetIdentity,
    pub cache_hit: bool,
    pub elapsed: Duration,
    /// The metadata refresh failed and the stored record (if any) was used.
    pub stale_metadata: bool,
}

impl LoadReport {
    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}

/// A loaded dataset with the metadata known at load time.
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub table: NormalizedTable,
    pub metadata: Option<CollectionMetadata>,
    pub report: LoadReport,
}

/// Loads datasets through the metadata and result caches.
///
/// All collaborators are injected; the loader holds no global state and
/// is shared by reference across tasks.
pub struct DatasetLoader {
    source: Arc<dyn RawTableSource>,
    metadata: Arc<MetadataCache>,
    records: Arc<dyn DatasetRecordStore>,
    results: ResultCache<dyn ResultCacheBackend>,
    normalizer: Normalizer,
    remote_timeout: Duration,
    strict_metadata: bool,
}

impl std::fmt::Debug for DatasetLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetLoader")
            .field("catalog", &self.normalizer.catalog().version())
            .field("remote_timeout", &self.remote_timeout)
            .field("strict_metadata", &self.strict_metadata)
            .finish_non_exhaustive()
    }
}

impl DatasetLoader {
    pub fn new(
        source: Arc<dyn RawTableSource>,
        metadata: Arc<MetadataCache>,
        records: Arc<dyn DatasetRecordStore>,
        results: Arc<dyn ResultCacheBackend>,
        normalizer: Normalizer,
    ) -> Self {
        let defaults = LoaderConfig::default();
        Self {
            source,
            metadata,
            records,
            results: ResultCache::new(results),
            normalizer,
            remote_timeout: defaults.remote_timeout,
            strict_metadata: defaults.strict_metadata,
        }
    }

    /// Wire a loader from configuration: LMDB result cache under
    /// `cache_dir`, metadata cache sized from the config, and the
    /// configured catalog.
    ///
    /// # Errors
    ///
    /// Invalid configuration, an unreadable catalog, or an LMDB
    /// environment that cannot be opened.
    pub fn from_config(
        config: &LoaderConfig,
        source: Arc<dyn RawTableSource>,
        metadata_source: Arc<dyn MetadataSource>,
        records: Arc<dyn DatasetRecordStore>,
    ) -> LyproxResult<Self> {
        config.validate()?;
        let catalog = config.load_catalog()?;
        let backend = LmdbResultCache::new(&config.cache_dir, config.cache_max_size_mb)?;
        let metadata = Arc::new(MetadataCache::from_config(metadata_source, config));

        Ok(Self::new(
            source,
            metadata,
            records,
            Arc::new(backend),
            Normalizer::new(catalog),
        )
        .with_remote_timeout(config.remote_timeout)
        .with_strict_metadata(config.strict_metadata))
    }

    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }

    /// Abort loads whose metadata refresh fails instead of proceeding
    /// with the stored record.
    pub fn with_strict_metadata(mut self, strict: bool) -> Self {
        self.strict_metadata = strict;
        self
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn metadata_cache(&self) -> &MetadataCache {
        &self.metadata
    }

    pub fn result_cache(&self) -> &ResultCache<dyn ResultCacheBackend> {
        &self.results
    }

    pub fn records(&self) -> &dyn DatasetRecordStore {
        self.records.as_ref()
    }

    /// Load the normalized table of `identity`.
    ///
    /// Emits one `tracing` event per call carrying `dataset`, `cache_hit`
    /// and `elapsed_seconds`.
    ///
    /// # Errors
    ///
    /// - `RemoteError::Unavailable` when the source cannot be reached or
    ///   the fetch exceeds the remote timeout
    /// - `RemoteError::NotFound` when the identity does not resolve
    /// - `SchemaError` when normalization cannot reconcile a column
    /// - metadata errors only with strict metadata enabled
    pub async fn load(&self, identity: &DatasetIdentity) -> LyproxResult<LoadOutcome> {
        let started = Instant::now();
        let result = self.load_inner(identity).await;
        let elapsed = started.elapsed();

        match result {
            Ok((table, metadata, cache_hit, stale_metadata)) => {
                tracing::info!(
                    dataset = %identity,
                    cache_hit,
                    elapsed_seconds = elapsed.as_secs_f64(),
                    rows = table.row_count(),
                    stale_metadata,
                    "Loaded dataset"
                );
                Ok(LoadOutcome {
                    table,
                    metadata,
                    report: LoadReport {
                        identity: identity.clone(),
                        cache_hit,
                        elapsed,
                        stale_metadata,
                    },
                })
            }
            Err(error) => {
                tracing::warn!(
                    dataset = %identity,
                    cache_hit = false,
                    elapsed_seconds = elapsed.as_secs_f64(),
                    error = %error,
                    "Dataset load failed"
                );
                Err(error)
            }
        }
    }

    async fn load_inner(
        &self,
        identity: &DatasetIdentity,
    ) -> LyproxResult<(NormalizedTable, Option<CollectionMetadata>, bool, bool)> {
        let (metadata, stale_metadata) = self.refresh_metadata(identity).await?;

        let read = self
            .results
            .get_or_compute(&identity.cache_key(), || self.fetch_and_normalize(identity))
            .await?;
        let cache_hit = read.was_cache_hit();

        Ok((read.into_value(), metadata, cache_hit, stale_metadata))
    }

    /// Refresh and persist the identity's metadata record.
    ///
    /// Returns the metadata to report and whether it is stale.
    async fn refresh_metadata(
        &self,
        identity: &DatasetIdentity,
    ) -> LyproxResult<(Option<CollectionMetadata>, bool)> {
        let lookup = with_timeout(
            METADATA_SOURCE,
            self.remote_timeout,
            self.metadata.get(identity.collection()),
        )
        .await;

        match lookup {
            Ok(metadata) => {
                self.records
                    .save(DatasetRecord::new(identity.clone(), metadata.clone()))
                    .await?;
                Ok((Some(metadata), false))
            }
            Err(error) if self.strict_metadata => Err(error),
            Err(error) => {
                let stored = self.records.get(identity).await?.map(|r| r.metadata);
                tracing::warn!(
                    dataset = %identity,
                    collection = identity.collection(),
                    has_stored_record = stored.is_some(),
                    error = %error,
                    "Metadata refresh failed, continuing with stored record"
                );
                Ok((stored, true))
            }
        }
    }

    async fn fetch_and_normalize(
        &self,
        identity: &DatasetIdentity,
    ) -> LyproxResult<NormalizedTable> {
        let fetch = self.source.fetch_raw(identity);
        let raw = with_timeout(RAW_SOURCE, self.remote_timeout, fetch).await?;
        self.normalizer.normalize(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lyprox_core::LyproxError;
    use lyprox_storage::{InMemoryRecordStore, InMemoryResultCache};
    use lyprox_test_utils::{assertions, fixtures, MockMetadataSource, MockRawSource};

    struct Harness {
        source: Arc<MockRawSource>,
        metadata: Arc<MockMetadataSource>,
        records: Arc<InMemoryRecordStore>,
        loader: DatasetLoader,
    }

    fn harness(source: MockRawSource) -> Harness {
        let source = Arc::new(source);
        let metadata = Arc::new(MockMetadataSource::answering(fixtures::public_metadata()));
        let records = Arc::new(InMemoryRecordStore::new());
        let cache = Arc::new(MetadataCache::new(
            metadata.clone(),
            10,
            Duration::from_secs(3600),
        ));
        let loader = DatasetLoader::new(
            source.clone(),
            cache,
            records.clone(),
            Arc::new(InMemoryResultCache::new()),
            Normalizer::new(fixtures::small_catalog()),
        );
        Harness {
            source,
            metadata,
            records,
            loader,
        }
    }

    fn pet_source() -> MockRawSource {
        MockRawSource::new().with_table(fixtures::usz_identity(), fixtures::pet_only_table())
    }

    #[tokio::test]
    async fn test_load_normalizes_and_records_metadata() {
        let h = harness(pet_source());
        let identity = fixtures::usz_identity();

        let outcome = h.loader.load(&identity).await.expect("load should succeed");
        assert!(!outcome.report.cache_hit);
        assert!(!outcome.report.stale_metadata);
        assert_eq!(outcome.report.identity, identity);
        assert_eq!(outcome.metadata, Some(fixtures::public_metadata()));
        assertions::assert_canonical_complete(&outcome.table, &fixtures::small_catalog());
        assertions::assert_modality_missing(&outcome.table, "MRI");

        let record = h
            .records
            .get(&identity)
            .await
            .expect("get should succeed")
            .expect("record should be saved");
        assert_eq!(record.metadata, fixtures::public_metadata());
    }

    #[tokio::test]
    async fn test_second_load_is_served_from_cache() {
        let h = harness(pet_source());
        let identity = fixtures::usz_identity();

        let first = h.loader.load(&identity).await.expect("first load");
        let second = h.loader.load(&identity).await.expect("second load");

        assert!(!first.report.cache_hit);
        assert!(second.report.cache_hit);
        assert_eq!(first.table, second.table);
        assert_eq!(h.source.fetch_count(), 1);
        assert_eq!(h.metadata.lookup_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_identity_is_not_found_and_not_cached() {
        let h = harness(MockRawSource::new());
        let identity = fixtures::clb_identity();

        assertions::assert_not_found(&h.loader.load(&identity).await);
        let record = h.records.get(&identity).await.expect("get should succeed");
        assert_eq!(
            record.map(|r| r.metadata),
            Some(fixtures::public_metadata())
        );
        assert!(h
            .loader
            .result_cache()
            .get(&identity.cache_key())
            .await
            .expect("get")
            .is_none());
    }

    #[tokio::test]
    async fn test_remote_failure_propagates_unchanged() {
        let h = harness(pet_source());
        h.source
            .fail_with(LyproxError::remote_unavailable("mock", "connection refused"));

        assertions::assert_remote_unavailable(&h.loader.load(&fixtures::usz_identity()).await);

        h.source.clear_failure();
        let outcome = h.loader.load(&fixtures::usz_identity()).await.expect("retry");
        assert!(!outcome.report.cache_hit);
    }

    #[tokio::test]
    async fn test_record_is_refreshed_before_a_failing_fetch() {
        let h = harness(pet_source());
        let identity = fixtures::usz_identity();
        h.records
            .save(DatasetRecord::new(identity.clone(), fixtures::private_metadata()))
            .await
            .expect("seed record");
        h.source
            .fail_with(LyproxError::remote_unavailable("mock", "connection reset"));

        assertions::assert_remote_unavailable(&h.loader.load(&identity).await);

        let record = h
            .records
            .get(&identity)
            .await
            .expect("get should succeed")
            .expect("record should exist");
        assert_eq!(record.metadata, fixtures::public_metadata());
        assert_eq!(h.metadata.lookup_count(), 1);
        assert_eq!(h.source.fetch_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fetch_times_out() {
        let h = harness(pet_source().with_delay(Duration::from_secs(60)));
        let loader = h.loader.with_remote_timeout(Duration::from_secs(5));

        let result = loader.load(&fixtures::usz_identity()).await;
        assertions::assert_remote_unavailable(&result);
        assert!(loader
            .result_cache()
            .get(&fixtures::usz_identity().cache_key())
            .await
            .expect("get")
            .is_none());
    }

    #[tokio::test]
    async fn test_schema_violation_propagates() {
        let mut raw = fixtures::pet_only_table().columns().to_vec();
        raw[2].values[0] = lyprox_core::RawValue::Text("maybe".to_string());
        let column = raw[2].key.to_string();
        let table = lyprox_core::RawTable::new(3, raw).expect("same row count");

        let h = harness(MockRawSource::new().with_table(fixtures::usz_identity(), table));
        let result = h.loader.load(&fixtures::usz_identity()).await;
        assertions::assert_schema_violation(&result, &column);
    }

    #[tokio::test]
    async fn test_metadata_failure_is_tolerated_by_default() {
        let h = harness(pet_source());
        let identity = fixtures::usz_identity();
        h.records
            .save(DatasetRecord::new(identity.clone(), fixtures::private_metadata()))
            .await
            .expect("seed record");
        h.metadata
            .fail_with(LyproxError::remote_unavailable("mock", "rate limited"));

        let outcome = h.loader.load(&identity).await.expect("load should proceed");
        assert!(outcome.report.stale_metadata);
        assert_eq!(outcome.metadata, Some(fixtures::private_metadata()));
    }

    #[tokio::test]
    async fn test_metadata_failure_aborts_when_strict() {
        let h = harness(pet_source());
        let loader = h.loader.with_strict_metadata(true);
        h.metadata
            .fail_with(LyproxError::remote_unavailable("mock", "rate limited"));

        assertions::assert_remote_unavailable(&loader.load(&fixtures::usz_identity()).await);
        assert_eq!(h.source.fetch_count(), 0);
    }
}
