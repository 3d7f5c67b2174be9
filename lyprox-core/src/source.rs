//! Collaborator traits at the system boundary.
//!
//! The loader depends on these traits only; the GitHub client and the
//! in-memory record store are interchangeable implementations.

use async_trait::async_trait;

use crate::{CollectionMetadata, DatasetIdentity, DatasetRecord, LyproxResult, RawTable};

/// Remote source of raw dataset tables.
#[async_trait]
pub trait RawTableSource: Send + Sync {
    /// Fetch the raw table of one dataset version.
    ///
    /// # Errors
    ///
    /// `RemoteError::Unavailable` when the source cannot be reached,
    /// `RemoteError::NotFound` when the identity does not resolve.
    async fn fetch_raw(&self, identity: &DatasetIdentity) -> LyproxResult<RawTable>;
}

/// Remote source of collection metadata.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch_metadata(&self, collection: &str) -> LyproxResult<CollectionMetadata>;
}

/// Persistence substrate for identities and their denormalized metadata.
#[async_trait]
pub trait DatasetRecordStore: Send + Sync {
    /// Insert or replace the record for `record.identity`.
    async fn save(&self, record: DatasetRecord) -> LyproxResult<()>;

    /// The last saved record for `identity`, if any.
    async fn get(&self, identity: &DatasetIdentity) -> LyproxResult<Option<DatasetRecord>>;

    /// All stored records, ordered by identity.
    async fn list(&self) -> LyproxResult<Vec<DatasetRecord>>;
}
