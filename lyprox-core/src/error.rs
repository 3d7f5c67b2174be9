//! Error types for LyProX operations

use thiserror::Error;

/// Errors reaching the remote dataset source or its metadata endpoint.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// Network, timeout or authentication failure. Transient, never retried here.
    #[error("Remote source {source_name} unavailable: {reason}")]
    Unavailable { source_name: String, reason: String },

    /// The requested snapshot or collection does not exist at the remote source.
    #[error("Not found at remote source: {resource}")]
    NotFound { resource: String },
}

/// Errors raised while reconciling a raw table with the canonical schema.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Schema violation in column {column} at row {row}: {reason}")]
    Violation {
        column: String,
        row: usize,
        reason: String,
    },

    #[error("Conflicting sources for column {column}")]
    ConflictingColumn { column: String },

    #[error("Malformed table: {reason}")]
    MalformedTable { reason: String },
}

/// Durable cache and record store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    /// A cache entry exists but cannot be decoded. Callers treat this as a miss.
    #[error("Cache entry {key} is corrupted: {reason}")]
    CacheCorruption { key: String, reason: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to read configuration from {path}: {reason}")]
    Unreadable { path: String, reason: String },
}

/// Master error type for all LyProX errors.
#[derive(Debug, Clone, Error)]
pub enum LyproxError {
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl LyproxError {
    /// Shorthand for a [`RemoteError::Unavailable`].
    pub fn remote_unavailable(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Remote(RemoteError::Unavailable {
            source_name: source_name.into(),
            reason: reason.into(),
        })
    }

    /// Shorthand for a [`RemoteError::NotFound`].
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::Remote(RemoteError::NotFound {
            resource: resource.into(),
        })
    }

    pub fn is_remote_unavailable(&self) -> bool {
        matches!(self, Self::Remote(RemoteError::Unavailable { .. }))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Remote(RemoteError::NotFound { .. }))
    }

    pub fn is_schema_violation(&self) -> bool {
        matches!(self, Self::Schema(_))
    }

    pub fn is_cache_corruption(&self) -> bool {
        matches!(self, Self::Storage(StorageError::CacheCorruption { .. }))
    }
}

/// Result type alias for LyProX operations.
pub type LyproxResult<T> = Result<T, LyproxError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_display_unavailable() {
        let err = RemoteError::Unavailable {
            source_name: "github".to_string(),
            reason: "timed out after 30s".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("github"));
        assert!(msg.contains("timed out"));
    }

    #[test]
    fn test_schema_error_display_violation() {
        let err = SchemaError::Violation {
            column: "PET.ipsi.II".to_string(),
            row: 7,
            reason: "cannot coerce 'maybe' to involvement".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("PET.ipsi.II"));
        assert!(msg.contains("row 7"));
        assert!(msg.contains("maybe"));
    }

    #[test]
    fn test_storage_error_display_corruption() {
        let err = StorageError::CacheCorruption {
            key: "abcd".to_string(),
            reason: "truncated".to_string(),
        };
        assert!(format!("{}", err).contains("corrupted"));
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "metadata_cache_capacity".to_string(),
            value: "0".to_string(),
            reason: "must be positive".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("metadata_cache_capacity"));
        assert!(msg.contains("must be positive"));
    }

    #[test]
    fn test_lyprox_error_from_variants() {
        let remote = LyproxError::from(RemoteError::NotFound {
            resource: "x".to_string(),
        });
        assert!(matches!(remote, LyproxError::Remote(_)));

        let schema = LyproxError::from(SchemaError::ConflictingColumn {
            column: "c".to_string(),
        });
        assert!(matches!(schema, LyproxError::Schema(_)));

        let storage = LyproxError::from(StorageError::LockPoisoned);
        assert!(matches!(storage, LyproxError::Storage(_)));

        let validation = LyproxError::from(ValidationError::RequiredFieldMissing {
            field: "subsite".to_string(),
        });
        assert!(matches!(validation, LyproxError::Validation(_)));

        let config = LyproxError::from(ConfigError::MissingRequired {
            field: "cache_dir".to_string(),
        });
        assert!(matches!(config, LyproxError::Config(_)));
    }

    #[test]
    fn test_error_predicates() {
        assert!(LyproxError::remote_unavailable("github", "down").is_remote_unavailable());
        assert!(LyproxError::not_found("repo").is_not_found());
        assert!(!LyproxError::not_found("repo").is_remote_unavailable());

        let corrupted = LyproxError::from(StorageError::CacheCorruption {
            key: "k".to_string(),
            reason: "bad".to_string(),
        });
        assert!(corrupted.is_cache_corruption());
        assert!(!corrupted.is_schema_violation());
    }
}
