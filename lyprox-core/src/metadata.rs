//! Collection metadata and the denormalized dataset record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::DatasetIdentity;

/// Cheap, slowly changing facts about a remote collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionMetadata {
    pub is_private: bool,
    /// When the collection last received a push.
    pub last_updated_at: DateTime<Utc>,
}

impl CollectionMetadata {
    pub fn new(is_private: bool, last_updated_at: DateTime<Utc>) -> Self {
        Self {
            is_private,
            last_updated_at,
        }
    }

    /// Visibility label as shown in the combined cohort table.
    pub fn visibility(&self) -> &'static str {
        if self.is_private {
            "private"
        } else {
            "public"
        }
    }
}

/// An identity together with the metadata snapshot persisted alongside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub identity: DatasetIdentity,
    pub metadata: CollectionMetadata,
    pub saved_at: DateTime<Utc>,
}

impl DatasetRecord {
    pub fn new(identity: DatasetIdentity, metadata: CollectionMetadata) -> Self {
        Self {
            identity,
            metadata,
            saved_at: Utc::now(),
        }
    }
}
