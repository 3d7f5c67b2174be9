//! Loader configuration.
//!
//! Configuration is loaded from environment variables with defaults that
//! suit a local development checkout.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, LyproxResult, ModalityCatalog};

pub const DEFAULT_CACHE_DIR: &str = ".lyprox-cache";
pub const DEFAULT_CACHE_MAX_SIZE_MB: usize = 1024;
pub const DEFAULT_METADATA_CACHE_CAPACITY: usize = 100;
pub const DEFAULT_METADATA_TTL_SECS: u64 = 86_400;
pub const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// LOADER CONFIGURATION
// ============================================================================

/// Settings shared by the loader, both cache tiers and the remote client.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Directory holding the durable LMDB result cache.
    pub cache_dir: PathBuf,

    /// LMDB map size in megabytes.
    pub cache_max_size_mb: usize,

    /// Maximum number of collections held by the metadata cache.
    pub metadata_cache_capacity: usize,

    /// Time after which a cached metadata entry is refreshed.
    pub metadata_ttl: Duration,

    /// Upper bound for every remote call.
    pub remote_timeout: Duration,

    /// Abort a load when the metadata refresh fails instead of proceeding
    /// with the last stored record.
    pub strict_metadata: bool,

    /// Optional JSON modality catalog; the built-in catalog is used when unset.
    pub catalog_path: Option<PathBuf>,

    /// Access token for private collections.
    #[serde(skip_serializing)]
    pub github_token: Option<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            cache_max_size_mb: DEFAULT_CACHE_MAX_SIZE_MB,
            metadata_cache_capacity: DEFAULT_METADATA_CACHE_CAPACITY,
            metadata_ttl: Duration::from_secs(DEFAULT_METADATA_TTL_SECS),
            remote_timeout: Duration::from_secs(DEFAULT_REMOTE_TIMEOUT_SECS),
            strict_metadata: false,
            catalog_path: None,
            github_token: None,
        }
    }
}

impl fmt::Debug for LoaderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderConfig")
            .field("cache_dir", &self.cache_dir)
            .field("cache_max_size_mb", &self.cache_max_size_mb)
            .field("metadata_cache_capacity", &self.metadata_cache_capacity)
            .field("metadata_ttl", &self.metadata_ttl)
            .field("remote_timeout", &self.remote_timeout)
            .field("strict_metadata", &self.strict_metadata)
            .field("catalog_path", &self.catalog_path)
            .field(
                "github_token",
                &self.github_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl LoaderConfig {
    /// Create a LoaderConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `LYPROX_CACHE_DIR`: Durable cache directory (default: `.lyprox-cache`)
    /// - `LYPROX_CACHE_MAX_SIZE_MB`: LMDB map size (default: 1024)
    /// - `LYPROX_METADATA_CACHE_CAPACITY`: Metadata cache entries (default: 100)
    /// - `LYPROX_METADATA_TTL_SECS`: Metadata expiry (default: 86400)
    /// - `LYPROX_REMOTE_TIMEOUT_SECS`: Remote call bound (default: 30)
    /// - `LYPROX_STRICT_METADATA`: "true" aborts loads on metadata failure (default: false)
    /// - `LYPROX_CATALOG_PATH`: JSON modality catalog (default: built-in)
    /// - `GITHUB_TOKEN`: Token for private collections (default: anonymous)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable lookup. Unparseable values
    /// fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let cache_dir = non_empty("LYPROX_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR));

        let cache_max_size_mb = non_empty("LYPROX_CACHE_MAX_SIZE_MB")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(DEFAULT_CACHE_MAX_SIZE_MB);

        let metadata_cache_capacity = non_empty("LYPROX_METADATA_CACHE_CAPACITY")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(DEFAULT_METADATA_CACHE_CAPACITY);

        let metadata_ttl = Duration::from_secs(
            non_empty("LYPROX_METADATA_TTL_SECS")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(DEFAULT_METADATA_TTL_SECS),
        );

        let remote_timeout = Duration::from_secs(
            non_empty("LYPROX_REMOTE_TIMEOUT_SECS")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(DEFAULT_REMOTE_TIMEOUT_SECS),
        );

        let strict_metadata = non_empty("LYPROX_STRICT_METADATA")
            .map(|s| s.trim().to_lowercase() == "true")
            .unwrap_or(false);

        Self {
            cache_dir,
            cache_max_size_mb,
            metadata_cache_capacity,
            metadata_ttl,
            remote_timeout,
            strict_metadata,
            catalog_path: non_empty("LYPROX_CATALOG_PATH").map(PathBuf::from),
            github_token: non_empty("GITHUB_TOKEN"),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> LyproxResult<()> {
        if self.cache_dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "cache_dir".to_string(),
            }
            .into());
        }

        if self.cache_max_size_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache_max_size_mb".to_string(),
                value: self.cache_max_size_mb.to_string(),
                reason: "cache_max_size_mb must be greater than 0".to_string(),
            }
            .into());
        }

        if self.metadata_cache_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "metadata_cache_capacity".to_string(),
                value: self.metadata_cache_capacity.to_string(),
                reason: "metadata_cache_capacity must be greater than 0".to_string(),
            }
            .into());
        }

        if self.metadata_ttl.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "metadata_ttl".to_string(),
                value: format!("{:?}", self.metadata_ttl),
                reason: "metadata_ttl must be positive".to_string(),
            }
            .into());
        }

        if self.remote_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "remote_timeout".to_string(),
                value: format!("{:?}", self.remote_timeout),
                reason: "remote_timeout must be positive".to_string(),
            }
            .into());
        }

        Ok(())
    }

    /// The configured modality catalog, or the built-in one.
    pub fn load_catalog(&self) -> LyproxResult<ModalityCatalog> {
        match &self.catalog_path {
            Some(path) => ModalityCatalog::from_json_file(path),
            None => Ok(ModalityCatalog::builtin()),
        }
    }
}
