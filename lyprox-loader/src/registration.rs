//! Batch registration of datasets from JSON specifications.
//!
//! A registration file is a JSON array of [`DatasetSpec`] objects:
//!
//! ```json
//! [
//!   {"year": 2021, "institution": "USZ", "subsite": "oropharynx",
//!    "repo_name": "rmnldwg/lydata", "ref": "main"}
//! ]
//! ```
//!
//! Each spec is loaded through the [`DatasetLoader`] and added to the
//! [`CohortStore`]. One failing spec never aborts the batch.

use std::path::Path;

use lyprox_core::{ConfigError, DatasetIdentity, LyproxError, LyproxResult};
use serde::{Deserialize, Serialize};

use crate::cohort::CohortStore;
use crate::loader::DatasetLoader;

/// One dataset to register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSpec {
    pub year: i32,
    pub institution: String,
    pub subsite: String,
    pub repo_name: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
}

impl DatasetSpec {
    pub fn identity(&self) -> LyproxResult<DatasetIdentity> {
        DatasetIdentity::new(
            self.year,
            &self.institution,
            &self.subsite,
            &self.repo_name,
            &self.git_ref,
        )
    }

    /// Dataset name, e.g. `2021-usz-oropharynx`.
    pub fn name(&self) -> String {
        match self.identity() {
            Ok(identity) => identity.name(),
            Err(_) => format!(
                "{}-{}-{}",
                self.year,
                self.institution.to_lowercase(),
                self.subsite
            ),
        }
    }
}

/// A spec that could not be registered.
#[derive(Debug, Clone)]
pub struct RegistrationFailure {
    pub name: String,
    pub error: LyproxError,
}

/// Outcome of a registration batch.
#[derive(Debug, Clone, Default)]
pub struct RegistrationReport {
    /// Names of datasets loaded and added.
    pub registered: Vec<String>,
    /// Names already present in the cohort.
    pub skipped: Vec<String>,
    pub failures: Vec<RegistrationFailure>,
}

impl RegistrationReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn total(&self) -> usize {
        self.registered.len() + self.skipped.len() + self.failures.len()
    }
}

/// Parse a JSON array of specs.
pub fn parse_specs(json: &str) -> LyproxResult<Vec<DatasetSpec>> {
    serde_json::from_str(json).map_err(|e| {
        ConfigError::InvalidValue {
            field: "datasets".to_string(),
            value: "<json>".to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

pub fn read_specs(path: impl AsRef<Path>) -> LyproxResult<Vec<DatasetSpec>> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    parse_specs(&json)
}

/// Register every spec in order.
///
/// Specs whose name is already in `cohort` are skipped unless
/// `replace_existing` is set.
pub async fn register_all(
    loader: &DatasetLoader,
    cohort: &CohortStore,
    specs: &[DatasetSpec],
    replace_existing: bool,
) -> RegistrationReport {
    let mut report = RegistrationReport::default();

    for spec in specs {
        let name = spec.name();
        if !replace_existing && cohort.contains(&name) {
            tracing::info!(dataset = %name, "Dataset already registered, skipping");
            report.skipped.push(name);
            continue;
        }

        match register_one(loader, cohort, spec, replace_existing).await {
            Ok(true) => {
                tracing::info!(dataset = %name, "Registered dataset");
                report.registered.push(name);
            }
            Ok(false) => report.skipped.push(name),
            Err(error) => {
                tracing::error!(dataset = %name, error = %error, "Dataset could not be registered");
                report.failures.push(RegistrationFailure { name, error });
            }
        }
    }

    report
}

async fn register_one(
    loader: &DatasetLoader,
    cohort: &CohortStore,
    spec: &DatasetSpec,
    replace_existing: bool,
) -> LyproxResult<bool> {
    let identity = spec.identity()?;
    let outcome = loader.load(&identity).await?;
    cohort.add_outcome(outcome, replace_existing)
}

/// Read specs from `path` and register them.
///
/// # Errors
///
/// Only an unreadable or malformed file fails the call; per-dataset
/// failures are collected in the report.
pub async fn register_from_file(
    loader: &DatasetLoader,
    cohort: &CohortStore,
    path: impl AsRef<Path>,
    replace_existing: bool,
) -> LyproxResult<RegistrationReport> {
    let specs = read_specs(path)?;
    Ok(register_all(loader, cohort, &specs, replace_existing).await)
}
