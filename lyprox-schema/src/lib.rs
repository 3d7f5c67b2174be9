//! LyProX Schema - Canonical Normalization
//!
//! Turns heterogeneous raw tables into the canonical multi-level layout:
//! every modality of the catalog gets the full `{ipsi, contra} × levels`
//! involvement block plus its `core.date` column, typed per the dtype
//! contract, with row order and identity untouched.

pub mod coerce;
pub mod normalize;

pub use coerce::{coerce, coerce_date, coerce_involvement};
pub use normalize::Normalizer;

// ============================================================================
// PROPERTY TESTS
// ============================================================================

#[cfg(test)]
mod prop_tests {
    use super::*;
    use lyprox_test_utils::{assertions, fixtures, generators};
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Normalizing a normalized table changes nothing.
        #[test]
        fn prop_normalize_is_idempotent(
            raw in generators::arb_raw_table(fixtures::small_catalog()),
        ) {
            let normalizer = Normalizer::new(fixtures::small_catalog());
            let once = normalizer.normalize(&raw).expect("generated tables coerce");
            let twice = normalizer.normalize(&once.to_raw()).expect("normalized tables coerce");
            prop_assert_eq!(once, twice);
        }

        /// Every canonical column exists and honors its dtype.
        #[test]
        fn prop_normalize_is_complete(
            raw in generators::arb_raw_table(fixtures::small_catalog()),
        ) {
            let normalizer = Normalizer::new(fixtures::small_catalog());
            let table = normalizer.normalize(&raw).expect("generated tables coerce");
            assertions::assert_canonical_complete(&table, normalizer.catalog());
        }

        /// Row count, order and passthrough cells survive normalization.
        #[test]
        fn prop_normalize_preserves_rows(
            raw in generators::arb_raw_table(fixtures::small_catalog()),
        ) {
            let normalizer = Normalizer::new(fixtures::small_catalog());
            let table = normalizer.normalize(&raw).expect("generated tables coerce");
            assertions::assert_rows_preserved(&raw, &table, normalizer.catalog());
        }

        /// Supplied canonical cells are never invented or lost: a cell is
        /// missing after normalization iff it was a missing marker before.
        #[test]
        fn prop_normalize_never_invents_data(
            raw in generators::arb_raw_table(fixtures::small_catalog()),
        ) {
            let normalizer = Normalizer::new(fixtures::small_catalog());
            let table = normalizer.normalize(&raw).expect("generated tables coerce");
            for column in table.columns() {
                match raw.column(&column.key) {
                    Some(source) => {
                        for (before, after) in source.values.iter().zip(&column.values) {
                            let was_missing = coerce(column.kind, before)
                                .map(|cell| cell.is_missing())
                                .unwrap_or(false);
                            prop_assert_eq!(was_missing, after.is_missing());
                        }
                    }
                    None => prop_assert_eq!(column.missing_count(), table.row_count()),
                }
            }
        }
    }
}
