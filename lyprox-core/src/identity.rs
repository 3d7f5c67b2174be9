//! Dataset identity and the content-addressed cache key derived from it.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{LyproxResult, ValidationError};

/// Largest period accepted as a plausible calendar year.
const MAX_PERIOD: i32 = 9999;

/// Immutable 5-tuple naming one version of a remote dataset.
///
/// The fields are private so an identity can only be obtained through
/// [`DatasetIdentity::new`], which enforces that every field is present
/// and that `period` is a plausible year. The institution short code is
/// stored in lower case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "IdentityFields", into = "IdentityFields")]
pub struct DatasetIdentity {
    period: i32,
    institution: String,
    subsite: String,
    collection: String,
    version_ref: String,
}

/// Plain serde shape; deserialization goes back through validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IdentityFields {
    period: i32,
    institution: String,
    subsite: String,
    collection: String,
    version_ref: String,
}

impl DatasetIdentity {
    /// Build a validated identity.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if any string field is blank or the
    /// period is not in `1..=9999`.
    pub fn new(
        period: i32,
        institution: impl Into<String>,
        subsite: impl Into<String>,
        collection: impl Into<String>,
        version_ref: impl Into<String>,
    ) -> LyproxResult<Self> {
        if period <= 0 || period > MAX_PERIOD {
            return Err(ValidationError::InvalidValue {
                field: "period".to_string(),
                reason: format!("{} is not a plausible calendar year", period),
            }
            .into());
        }

        let institution = required("institution", institution.into())?.to_lowercase();
        let subsite = required("subsite", subsite.into())?;
        let collection = required("collection", collection.into())?;
        let version_ref = required("version_ref", version_ref.into())?;

        Ok(Self {
            period,
            institution,
            subsite,
            collection,
            version_ref,
        })
    }

    pub fn period(&self) -> i32 {
        self.period
    }

    pub fn institution(&self) -> &str {
        &self.institution
    }

    pub fn subsite(&self) -> &str {
        &self.subsite
    }

    /// Remote collection holding the dataset, e.g. `rmnldwg/lydata`.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Immutable snapshot reference (tag or commit) within the collection.
    pub fn version_ref(&self) -> &str {
        &self.version_ref
    }

    /// Human readable dataset name, e.g. `2021-usz-oropharynx`.
    pub fn name(&self) -> String {
        format!("{}-{}-{}", self.period, self.institution, self.subsite)
    }

    /// Deterministic durable-cache key for this identity.
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::for_identity(self)
    }
}

fn required(field: &str, value: String) -> LyproxResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: field.to_string(),
        }
        .into());
    }
    Ok(trimmed.to_string())
}

impl fmt::Display for DatasetIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.name(), self.collection, self.version_ref)
    }
}

impl TryFrom<IdentityFields> for DatasetIdentity {
    type Error = crate::LyproxError;

    fn try_from(fields: IdentityFields) -> Result<Self, Self::Error> {
        Self::new(
            fields.period,
            fields.institution,
            fields.subsite,
            fields.collection,
            fields.version_ref,
        )
    }
}

impl From<DatasetIdentity> for IdentityFields {
    fn from(identity: DatasetIdentity) -> Self {
        Self {
            period: identity.period,
            institution: identity.institution,
            subsite: identity.subsite,
            collection: identity.collection,
            version_ref: identity.version_ref,
        }
    }
}

/// SHA-256 key addressing one durable cache entry.
///
/// # Encoding
///
/// The digest is taken over a versioned, length-prefixed encoding of the
/// five identity fields:
/// - a domain tag (`lyprox.dataset.v1`)
/// - the period as 4 big-endian bytes
/// - each string field as `[len: u32 BE][utf-8 bytes]`
///
/// Length prefixes keep `("ab", "c")` and `("a", "bc")` apart, and the
/// encoding has no dependency on platform or process state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    const DOMAIN_TAG: &'static [u8] = b"lyprox.dataset.v1";

    fn for_identity(identity: &DatasetIdentity) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(Self::DOMAIN_TAG);
        hasher.update(identity.period.to_be_bytes());
        for field in [
            identity.institution.as_str(),
            identity.subsite.as_str(),
            identity.collection.as_str(),
            identity.version_ref.as_str(),
        ] {
            hasher.update((field.len() as u32).to_be_bytes());
            hasher.update(field.as_bytes());
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&hasher.finalize());
        Self(key)
    }

    /// Rebuild a key from its raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
