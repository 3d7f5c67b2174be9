//! LyProX Loader - Dataset Facade
//!
//! [`DatasetLoader`] turns a [`DatasetIdentity`](lyprox_core::DatasetIdentity)
//! into a normalized table: metadata refresh through the TTL cache, then a
//! durable-cache lookup, and on a miss a time-bounded remote fetch followed
//! by normalization. [`CohortStore`] keeps loaded datasets side by side and
//! combines them; [`registration`] loads batches of datasets from JSON.

pub mod cohort;
pub mod loader;
pub mod registration;
pub mod timeout;

pub use cohort::{CohortStore, DATASET_TOP};
pub use loader::{DatasetLoader, LoadOutcome, LoadReport};
pub use registration::{
    parse_specs, read_specs, register_all, register_from_file, DatasetSpec, RegistrationFailure,
    RegistrationReport,
};
pub use timeout::with_timeout;

// ============================================================================
// PROPERTY TESTS
// ============================================================================
