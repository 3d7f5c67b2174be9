//! End-to-end pipeline tests against the LMDB result cache.

use std::sync::Arc;
use std::time::Duration;

use lyprox_core::{ColumnKey, Laterality, LoaderConfig, LyproxError, RawValue};
use lyprox_loader::{register_all, register_from_file, CohortStore, DatasetLoader, DatasetSpec};
use lyprox_schema::Normalizer;
use lyprox_storage::{InMemoryRecordStore, LmdbResultCache, MetadataCache, ResultCacheBackend};
use lyprox_test_utils::{assertions, fixtures, MockMetadataSource, MockRawSource};
use tempfile::TempDir;

fn lmdb_loader(
    dir: &TempDir,
    source: Arc<MockRawSource>,
    metadata: Arc<MockMetadataSource>,
) -> DatasetLoader {
    let backend = LmdbResultCache::new(dir.path(), 16).expect("LMDB should open");
    DatasetLoader::new(
        source,
        Arc::new(MetadataCache::new(metadata, 10, Duration::from_secs(86_400))),
        Arc::new(InMemoryRecordStore::new()),
        Arc::new(backend),
        Normalizer::new(fixtures::small_catalog()),
    )
}

fn sources() -> (Arc<MockRawSource>, Arc<MockMetadataSource>) {
    let source = MockRawSource::new()
        .with_table(fixtures::usz_identity(), fixtures::pet_only_table())
        .with_table(fixtures::clb_identity(), fixtures::unknown_level_table());
    (
        Arc::new(source),
        Arc::new(MockMetadataSource::answering(fixtures::public_metadata())),
    )
}

// ============================================================================
// DOUBLE LOAD AND RESTART
// ============================================================================

#[tokio::test]
async fn test_double_load_fetches_once() {
    let dir = TempDir::new().expect("TempDir creation should succeed");
    let (source, metadata) = sources();
    let loader = lmdb_loader(&dir, source.clone(), metadata);
    let identity = fixtures::usz_identity();

    let first = loader.load(&identity).await.expect("first load");
    let second = loader.load(&identity).await.expect("second load");

    assert!(!first.report.cache_hit);
    assert!(second.report.cache_hit);
    assert_eq!(first.table, second.table);
    assert_eq!(source.fetch_count(), 1);
}

#[tokio::test]
async fn test_cached_table_survives_restart() {
    let dir = TempDir::new().expect("TempDir creation should succeed");
    let identity = fixtures::usz_identity();

    let first = {
        let (source, metadata) = sources();
        let loader = lmdb_loader(&dir, source, metadata);
        loader.load(&identity).await.expect("first load").table
    };

    // Fresh process state: new sources that would fail if called.
    let (source, metadata) = sources();
    source.fail_with(LyproxError::remote_unavailable("mock", "offline"));
    let loader = lmdb_loader(&dir, source.clone(), metadata);

    let second = loader.load(&identity).await.expect("load after restart");
    assert!(second.report.cache_hit);
    assert_eq!(second.table, first);
    assert_eq!(source.fetch_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_loads_share_one_fetch() {
    let dir = TempDir::new().expect("TempDir creation should succeed");
    let source = Arc::new(
        MockRawSource::new()
            .with_table(fixtures::usz_identity(), fixtures::pet_only_table())
            .with_delay(Duration::from_millis(50)),
    );
    let metadata = Arc::new(MockMetadataSource::answering(fixtures::public_metadata()));
    let loader = Arc::new(lmdb_loader(&dir, source.clone(), metadata.clone()));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let loader = Arc::clone(&loader);
        handles.push(tokio::spawn(async move {
            loader.load(&fixtures::usz_identity()).await
        }));
    }
    for handle in handles {
        handle
            .await
            .expect("task should not panic")
            .expect("load should succeed");
    }

    assert_eq!(source.fetch_count(), 1);
    assert_eq!(metadata.lookup_count(), 1);
}

// ============================================================================
// NORMALIZATION SCENARIOS
// ============================================================================

#[tokio::test]
async fn test_pet_only_dataset_has_empty_mri_block() {
    let dir = TempDir::new().expect("TempDir creation should succeed");
    let (source, metadata) = sources();
    let loader = lmdb_loader(&dir, source, metadata);

    let outcome = loader
        .load(&fixtures::usz_identity())
        .await
        .expect("load should succeed");
    let catalog = fixtures::small_catalog();

    assertions::assert_canonical_complete(&outcome.table, &catalog);
    assertions::assert_rows_preserved(&fixtures::pet_only_table(), &outcome.table, &catalog);
    assertions::assert_modality_missing(&outcome.table, "MRI");
    assertions::assert_modality_missing(&outcome.table, "CT");
    assert_eq!(
        outcome
            .table
            .passthrough_column(&ColumnKey::new("patient", "#", "id"))
            .expect("passthrough kept")
            .values[0],
        RawValue::Text("P001".to_string())
    );
}

#[tokio::test]
async fn test_unknown_level_is_dropped() {
    let dir = TempDir::new().expect("TempDir creation should succeed");
    let (source, metadata) = sources();
    let loader = lmdb_loader(&dir, source, metadata);

    let outcome = loader
        .load(&fixtures::clb_identity())
        .await
        .expect("load should succeed");

    let unknown = ColumnKey::involvement("PET", Laterality::Ipsi, "VIII");
    assert!(outcome.table.column(&unknown).is_none());
    assert!(outcome.table.passthrough_column(&unknown).is_none());
    let known = outcome
        .table
        .column(&ColumnKey::involvement("PET", Laterality::Ipsi, "II"))
        .expect("canonical column");
    assert_eq!(known.values[0].as_bool(), Some(true));
    assert_eq!(known.values[1].as_bool(), Some(false));
}

// ============================================================================
// REGISTRATION
// ============================================================================

fn spec(year: i32, institution: &str, subsite: &str) -> DatasetSpec {
    DatasetSpec {
        year,
        institution: institution.to_string(),
        subsite: subsite.to_string(),
        repo_name: fixtures::LYDATA.to_string(),
        git_ref: "main".to_string(),
    }
}

#[tokio::test]
async fn test_register_batch_collects_failures() {
    let dir = TempDir::new().expect("TempDir creation should succeed");
    let (source, metadata) = sources();
    let loader = lmdb_loader(&dir, source, metadata);
    let cohort = CohortStore::new();

    let specs = vec![
        spec(2021, "USZ", "oropharynx"),
        spec(2019, "xyz", "larynx"),
        spec(2023, "CLB", "multisite"),
        spec(2021, "usz", "oropharynx"),
    ];
    let report = register_all(&loader, &cohort, &specs, false).await;

    assert_eq!(
        report.registered,
        vec!["2021-usz-oropharynx".to_string(), "2023-clb-multisite".to_string()]
    );
    assert_eq!(report.skipped, vec!["2021-usz-oropharynx".to_string()]);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].error.is_not_found());
    assert_eq!(report.total(), 4);
    assert!(!report.is_success());

    let combined = cohort
        .combined()
        .expect("combined should succeed")
        .expect("cohort is not empty");
    assert_eq!(combined.row_count(), 5);
}

#[tokio::test]
async fn test_register_from_file() {
    let dir = TempDir::new().expect("TempDir creation should succeed");
    let (source, metadata) = sources();
    let loader = lmdb_loader(&dir, source, metadata);
    let cohort = CohortStore::new();

    let path = dir.path().join("datasets.json");
    std::fs::write(
        &path,
        serde_json::to_string(&vec![spec(2021, "USZ", "oropharynx")]).expect("serialize specs"),
    )
    .expect("write specs");

    let report = register_from_file(&loader, &cohort, &path, false)
        .await
        .expect("file should be read");
    assert!(report.is_success());
    assert_eq!(cohort.dataset_names(), vec!["2021-usz-oropharynx".to_string()]);
}

// ============================================================================
// CONFIGURATION WIRING
// ============================================================================

#[tokio::test]
async fn test_from_config_opens_lmdb_under_cache_dir() {
    let dir = TempDir::new().expect("TempDir creation should succeed");
    let cache_dir = dir.path().join("cache");
    let config = LoaderConfig {
        cache_dir: cache_dir.clone(),
        cache_max_size_mb: 16,
        ..LoaderConfig::default()
    };
    let (source, metadata) = sources();

    let records = Arc::new(InMemoryRecordStore::new());
    let loader = DatasetLoader::from_config(&config, source, metadata, records)
        .expect("loader should build");
    assert!(cache_dir.exists());
    assert_eq!(loader.normalizer().catalog().version(), "builtin-1");

    let outcome = loader
        .load(&fixtures::usz_identity())
        .await
        .expect("load should succeed");
    assert!(!outcome.report.cache_hit);
    let stats = loader
        .result_cache()
        .backend()
        .stats()
        .await
        .expect("stats");
    assert_eq!(stats.entry_count, 1);
}

#[test]
fn test_from_config_rejects_invalid_config() {
    let config = LoaderConfig {
        cache_max_size_mb: 0,
        ..LoaderConfig::default()
    };
    let (source, metadata) = sources();
    let result =
        DatasetLoader::from_config(&config, source, metadata, Arc::new(InMemoryRecordStore::new()));
    assert!(matches!(result, Err(LyproxError::Config(_))));
}
