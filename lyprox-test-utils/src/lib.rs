//! LyProX Test Utilities
//!
//! Centralized test infrastructure for the LyProX workspace:
//! - Mock remote sources with call counters and failure injection
//! - Proptest generators for identities and raw tables
//! - Test fixtures for common scenarios
//! - Custom assertions for normalized tables and error variants

pub use lyprox_core::{
    CellValue, CollectionMetadata, ColumnDef, ColumnKey, ColumnKind, DatasetIdentity,
    DatasetRecord, Laterality, LyproxError, LyproxResult, MetadataSource, ModalityCatalog,
    NormalizedTable, RawColumn, RawTable, RawTableSource, RawValue, RemoteError, SchemaError,
    TableSchema,
};

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// MOCK SOURCES
// ============================================================================

/// In-memory [`RawTableSource`] that counts fetches.
///
/// Unknown identities yield `RemoteError::NotFound`. An injected failure is
/// returned by every fetch until cleared.
#[derive(Debug, Default)]
pub struct MockRawSource {
    tables: Mutex<HashMap<DatasetIdentity, RawTable>>,
    failure: Mutex<Option<LyproxError>>,
    delay: Option<Duration>,
    fetches: AtomicUsize,
}

impl MockRawSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, identity: DatasetIdentity, table: RawTable) -> Self {
        self.insert(identity, table);
        self
    }

    /// Sleep for `delay` inside every fetch, before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn insert(&self, identity: DatasetIdentity, table: RawTable) {
        lock(&self.tables).insert(identity, table);
    }

    pub fn fail_with(&self, error: LyproxError) {
        *lock(&self.failure) = Some(error);
    }

    pub fn clear_failure(&self) {
        *lock(&self.failure) = None;
    }

    /// Number of `fetch_raw` calls so far, failed ones included.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RawTableSource for MockRawSource {
    async fn fetch_raw(&self, identity: &DatasetIdentity) -> LyproxResult<RawTable> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = lock(&self.failure).clone() {
            return Err(error);
        }
        lock(&self.tables)
            .get(identity)
            .cloned()
            .ok_or_else(|| LyproxError::not_found(identity.to_string()))
    }
}

/// In-memory [`MetadataSource`] that counts lookups.
///
/// Collections without an explicit entry fall back to the default
/// metadata, if one is set, and to `RemoteError::NotFound` otherwise.
#[derive(Debug, Default)]
pub struct MockMetadataSource {
    entries: Mutex<HashMap<String, CollectionMetadata>>,
    default: Option<CollectionMetadata>,
    failure: Mutex<Option<LyproxError>>,
    delay: Option<Duration>,
    lookups: AtomicUsize,
}

impl MockMetadataSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every collection with `metadata`.
    pub fn answering(metadata: CollectionMetadata) -> Self {
        Self {
            default: Some(metadata),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn insert(&self, collection: impl Into<String>, metadata: CollectionMetadata) {
        lock(&self.entries).insert(collection.into(), metadata);
    }

    pub fn fail_with(&self, error: LyproxError) {
        *lock(&self.failure) = Some(error);
    }

    pub fn clear_failure(&self) {
        *lock(&self.failure) = None;
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataSource for MockMetadataSource {
    async fn fetch_metadata(&self, collection: &str) -> LyproxResult<CollectionMetadata> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = lock(&self.failure).clone() {
            return Err(error);
        }
        lock(&self.entries)
            .get(collection)
            .cloned()
            .or_else(|| self.default.clone())
            .ok_or_else(|| LyproxError::not_found(collection.to_string()))
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for identities and raw tables.

    use super::*;
    use proptest::prelude::*;

    /// Generate a valid DatasetIdentity.
    pub fn arb_identity() -> impl Strategy<Value = DatasetIdentity> {
        (
            1990i32..2035,
            "[a-z]{2,5}",
            prop::sample::select(vec!["oropharynx", "larynx", "hypopharynx", "oral-cavity"]),
            "[a-z]{3,8}/[a-z]{3,8}",
            prop_oneof![Just("main".to_string()), "v[0-9]\\.[0-9]\\.[0-9]"],
        )
            .prop_map(|(period, institution, subsite, collection, version_ref)| {
                DatasetIdentity::new(period, institution, subsite, collection, version_ref)
                    .expect("generated identity should be valid")
            })
    }

    /// Generate a Timestamp between 2020 and 2030.
    pub fn arb_timestamp() -> impl Strategy<Value = chrono::DateTime<chrono::Utc>> {
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(chrono::Utc::now)
        })
    }

    /// A raw involvement cell that coerces successfully.
    pub fn arb_involvement_cell() -> impl Strategy<Value = RawValue> {
        prop_oneof![
            Just(RawValue::Missing),
            any::<bool>().prop_map(RawValue::Bool),
            (0i64..=1).prop_map(RawValue::Int),
            prop::sample::select(vec!["yes", "no", "t", "f", "TRUE", "False", "nan"])
                .prop_map(|text| RawValue::Text(text.to_string())),
        ]
    }

    /// A raw date cell that coerces successfully.
    pub fn arb_date_cell() -> impl Strategy<Value = RawValue> {
        let ymd = (2000i32..2030, 1u32..=12, 1u32..=28);
        prop_oneof![
            Just(RawValue::Missing),
            ymd.clone()
                .prop_map(|(y, m, d)| RawValue::Text(format!("{:04}-{:02}-{:02}", y, m, d))),
            ymd.prop_map(|(y, m, d)| {
                RawValue::Text(format!("{:04}-{:02}-{:02}T08:30:00", y, m, d))
            }),
        ]
    }

    /// A passthrough measurement: any finite float, an integer, a code or missing.
    pub fn arb_measurement_cell() -> impl Strategy<Value = RawValue> {
        prop_oneof![
            Just(RawValue::Missing),
            (-1000i64..1000).prop_map(RawValue::Int),
            prop::num::f64::NORMAL.prop_map(RawValue::Float),
            prop::num::f64::SUBNORMAL.prop_map(RawValue::Float),
            (0i64..10_000).prop_map(|i| RawValue::Float(i as f64 / 7.0)),
            (0i64..10_000).prop_map(|i| RawValue::Float(i as f64 * 0.1)),
            "[A-Z][0-9]{2}".prop_map(RawValue::Text),
        ]
    }

    /// Generate a raw table against `catalog`.
    ///
    /// Every canonical column is independently present or absent, each
    /// modality may carry an unknown `VIII` level column, a `patient.#.id`
    /// passthrough column numbers the rows and a `tumor.1.volume`
    /// passthrough column holds measurements.
    pub fn arb_raw_table(catalog: ModalityCatalog) -> impl Strategy<Value = RawTable> {
        let defs: Vec<ColumnDef> = TableSchema::canonical(&catalog).columns().to_vec();
        let modalities: Vec<String> = catalog.modalities().map(str::to_string).collect();

        (0usize..12).prop_flat_map(move |rows| {
            let canonical: Vec<BoxedStrategy<Option<RawColumn>>> = defs
                .iter()
                .map(|def| {
                    let key = def.key.clone();
                    let values = match def.kind {
                        ColumnKind::Involvement => {
                            prop::collection::vec(arb_involvement_cell(), rows).boxed()
                        }
                        ColumnKind::Date => prop::collection::vec(arb_date_cell(), rows).boxed(),
                    };
                    let column = values.prop_map(move |values| RawColumn::new(key.clone(), values));
                    prop::option::of(column).boxed()
                })
                .collect();

            let unknown: Vec<BoxedStrategy<Option<RawColumn>>> = modalities
                .iter()
                .map(|modality| {
                    let key = ColumnKey::involvement(modality, Laterality::Ipsi, "VIII");
                    prop::option::weighted(
                        0.2,
                        prop::collection::vec(arb_involvement_cell(), rows)
                            .prop_map(move |values| RawColumn::new(key.clone(), values)),
                    )
                    .boxed()
                })
                .collect();

            let volumes = prop::collection::vec(arb_measurement_cell(), rows);

            (canonical, unknown, volumes).prop_map(move |(canonical, unknown, volumes)| {
                let ids = (0..rows).map(|row| RawValue::Int(row as i64)).collect();
                let mut columns = vec![
                    RawColumn::new(ColumnKey::new("patient", "#", "id"), ids),
                    RawColumn::new(ColumnKey::new("tumor", "1", "volume"), volumes),
                ];
                columns.extend(canonical.into_iter().flatten());
                columns.extend(unknown.into_iter().flatten());
                RawTable::new(rows, columns).expect("generated columns share the row count")
            })
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;
    use chrono::TimeZone;

    pub const LYDATA: &str = "rmnldwg/lydata";

    /// Three modalities and three levels; keeps canonical tables small.
    pub fn small_catalog() -> ModalityCatalog {
        ModalityCatalog::new("test-1", ["CT", "MRI", "PET"], ["I", "II", "III"])
            .expect("small catalog should be valid")
    }

    pub fn identity(period: i32, institution: &str, subsite: &str) -> DatasetIdentity {
        DatasetIdentity::new(period, institution, subsite, LYDATA, "main")
            .expect("fixture identity should be valid")
    }

    /// `2021-usz-oropharynx` on `rmnldwg/lydata@main`.
    pub fn usz_identity() -> DatasetIdentity {
        identity(2021, "usz", "oropharynx")
    }

    /// `2023-clb-multisite` on `rmnldwg/lydata@main`.
    pub fn clb_identity() -> DatasetIdentity {
        identity(2023, "clb", "multisite")
    }

    pub fn public_metadata() -> CollectionMetadata {
        CollectionMetadata::new(false, pushed_at())
    }

    pub fn private_metadata() -> CollectionMetadata {
        CollectionMetadata::new(true, pushed_at())
    }

    fn pushed_at() -> chrono::DateTime<chrono::Utc> {
        chrono::Utc
            .with_ymd_and_hms(2024, 6, 1, 12, 0, 0)
            .single()
            .unwrap_or_else(chrono::Utc::now)
    }

    /// Three patients with PET findings only.
    ///
    /// Carries `PET.ipsi.{I,II}`, `PET.contra.II` and `PET.core.date`, plus
    /// the passthrough columns `patient.#.id` and `tumor.1.t_stage`.
    pub fn pet_only_table() -> RawTable {
        let text = |s: &str| RawValue::Text(s.to_string());
        RawTable::from_rows(
            vec![
                ColumnKey::new("patient", "#", "id"),
                ColumnKey::new("tumor", "1", "t_stage"),
                ColumnKey::involvement("PET", Laterality::Ipsi, "I"),
                ColumnKey::involvement("PET", Laterality::Ipsi, "II"),
                ColumnKey::involvement("PET", Laterality::Contra, "II"),
                ColumnKey::date("PET"),
            ],
            vec![
                vec![
                    text("P001"),
                    RawValue::Int(2),
                    RawValue::Bool(false),
                    RawValue::Bool(true),
                    RawValue::Bool(false),
                    text("2019-03-14"),
                ],
                vec![
                    text("P002"),
                    RawValue::Int(3),
                    RawValue::Missing,
                    RawValue::Bool(true),
                    RawValue::Bool(true),
                    RawValue::Missing,
                ],
                vec![
                    text("P003"),
                    RawValue::Int(1),
                    RawValue::Bool(true),
                    RawValue::Missing,
                    RawValue::Bool(false),
                    text("2020-11-02"),
                ],
            ],
        )
        .expect("fixture table should be rectangular")
    }

    /// Two patients whose PET data includes the unknown level `VIII`.
    pub fn unknown_level_table() -> RawTable {
        RawTable::from_rows(
            vec![
                ColumnKey::involvement("PET", Laterality::Ipsi, "II"),
                ColumnKey::involvement("PET", Laterality::Ipsi, "VIII"),
            ],
            vec![
                vec![RawValue::Bool(true), RawValue::Bool(true)],
                vec![RawValue::Bool(false), RawValue::Bool(false)],
            ],
        )
        .expect("fixture table should be rectangular")
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertion functions for LyProX-specific validation.

    use super::*;

    /// Assert that a LyproxResult is Ok.
    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &LyproxResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert that a LyproxResult is Err.
    #[track_caller]
    pub fn assert_err<T: std::fmt::Debug>(result: &LyproxResult<T>) {
        assert!(result.is_err(), "Expected Err, got Ok: {:?}", result);
    }

    #[track_caller]
    pub fn assert_remote_unavailable<T: std::fmt::Debug>(result: &LyproxResult<T>) {
        match result {
            Err(LyproxError::Remote(RemoteError::Unavailable { .. })) => {}
            other => panic!("Expected RemoteUnavailable, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &LyproxResult<T>) {
        match result {
            Err(LyproxError::Remote(RemoteError::NotFound { .. })) => {}
            other => panic!("Expected NotFound, got: {:?}", other),
        }
    }

    /// Assert a schema violation reported against `column`.
    #[track_caller]
    pub fn assert_schema_violation<T: std::fmt::Debug>(result: &LyproxResult<T>, column: &str) {
        match result {
            Err(LyproxError::Schema(SchemaError::Violation { column: c, .. }))
            | Err(LyproxError::Schema(SchemaError::ConflictingColumn { column: c })) => {
                assert_eq!(c, column, "Wrong column in schema violation");
            }
            other => panic!("Expected schema violation for {}, got: {:?}", column, other),
        }
    }

    /// Assert that every canonical column of `catalog` exists, in schema
    /// order, with the dtype contract of its kind.
    #[track_caller]
    pub fn assert_canonical_complete(table: &NormalizedTable, catalog: &ModalityCatalog) {
        let schema = TableSchema::canonical(catalog);
        assert_eq!(
            table.columns().len(),
            schema.len(),
            "Canonical column count mismatch"
        );
        for (def, column) in schema.columns().iter().zip(table.columns()) {
            assert_eq!(column.key, def.key, "Canonical column out of order");
            assert_eq!(column.kind, def.kind, "Wrong kind for {}", def.key);
            assert_eq!(
                column.values.len(),
                table.row_count(),
                "Ragged column {}",
                def.key
            );
            for value in &column.values {
                let ok = match (def.kind, value) {
                    (_, CellValue::Missing) => true,
                    (ColumnKind::Involvement, CellValue::Bool(_)) => true,
                    (ColumnKind::Date, CellValue::Date(_)) => true,
                    _ => false,
                };
                assert!(ok, "Column {} holds {:?}", def.key, value);
            }
        }
    }

    /// Assert that normalization kept every row and every passthrough cell.
    #[track_caller]
    pub fn assert_rows_preserved(
        raw: &RawTable,
        table: &NormalizedTable,
        catalog: &ModalityCatalog,
    ) {
        assert_eq!(raw.row_count(), table.row_count(), "Row count changed");
        let passthrough: Vec<&RawColumn> = raw
            .columns()
            .iter()
            .filter(|column| !catalog.contains_modality(&column.key.top))
            .collect();
        assert_eq!(
            passthrough.len(),
            table.passthrough().len(),
            "Passthrough column count changed"
        );
        for (expected, actual) in passthrough.iter().zip(table.passthrough()) {
            assert_eq!(*expected, actual, "Passthrough column {} changed", expected.key);
        }
    }

    /// Assert that every canonical column of `modality` holds only missing markers.
    #[track_caller]
    pub fn assert_modality_missing(table: &NormalizedTable, modality: &str) {
        let columns: Vec<_> = table
            .columns()
            .iter()
            .filter(|column| column.key.top == modality)
            .collect();
        assert!(!columns.is_empty(), "No columns for modality {}", modality);
        for column in columns {
            assert_eq!(
                column.missing_count(),
                table.row_count(),
                "Column {} is not all missing",
                column.key
            );
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
