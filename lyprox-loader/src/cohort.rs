//! Loaded datasets held side by side and combined into one cohort table.

use std::collections::BTreeMap;
use std::sync::RwLock;

use lyprox_core::{
    CollectionMetadata, ColumnKey, DatasetIdentity, LyproxError, LyproxResult, NormalizedTable,
    RawValue, StorageError,
};

use crate::loader::LoadOutcome;

/// Top-level header of the per-row dataset tags added by [`CohortStore::combined`].
pub const DATASET_TOP: &str = "dataset";
const DATASET_GROUP: &str = "info";

#[derive(Debug, Clone)]
struct CohortEntry {
    metadata: Option<CollectionMetadata>,
    table: NormalizedTable,
}

/// Thread-safe set of loaded datasets keyed by dataset name.
#[derive(Debug, Default)]
pub struct CohortStore {
    entries: RwLock<BTreeMap<String, CohortEntry>>,
}

fn poisoned() -> LyproxError {
    LyproxError::Storage(StorageError::LockPoisoned)
}

impl CohortStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dataset under its name.
    ///
    /// An existing dataset with the same name is kept unless
    /// `replace_existing` is set. Returns whether the table was stored.
    pub fn add(
        &self,
        identity: &DatasetIdentity,
        metadata: Option<CollectionMetadata>,
        table: NormalizedTable,
        replace_existing: bool,
    ) -> LyproxResult<bool> {
        let name = identity.name();
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        if entries.contains_key(&name) && !replace_existing {
            tracing::debug!(dataset = %name, "Dataset already in cohort, skipping");
            return Ok(false);
        }
        entries.insert(name, CohortEntry { metadata, table });
        Ok(true)
    }

    pub fn add_outcome(&self, outcome: LoadOutcome, replace_existing: bool) -> LyproxResult<bool> {
        self.add(
            &outcome.report.identity,
            outcome.metadata,
            outcome.table,
            replace_existing,
        )
    }

    /// Remove the dataset `name`, returning how many rows it held.
    pub fn remove(&self, name: &str) -> LyproxResult<usize> {
        let removed = self
            .entries
            .write()
            .map_err(|_| poisoned())?
            .remove(name)
            .map(|entry| entry.table.row_count())
            .unwrap_or(0);
        Ok(removed)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries
            .read()
            .map(|entries| entries.contains_key(name))
            .unwrap_or(false)
    }

    /// Dataset names in lexical order.
    pub fn dataset_names(&self) -> Vec<String> {
        self.entries
            .read()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All datasets stacked in name order.
    ///
    /// Every row is tagged with `dataset.info.name`,
    /// `dataset.info.visibility` and `dataset.info.pushed_at`; the latter
    /// two are missing for datasets loaded without metadata. Returns `None`
    /// when the cohort is empty.
    pub fn combined(&self) -> LyproxResult<Option<NormalizedTable>> {
        let entries = self.entries.read().map_err(|_| poisoned())?;

        let mut tagged = Vec::with_capacity(entries.len());
        for (name, entry) in entries.iter() {
            let rows = entry.table.row_count();
            let mut table = entry.table.clone();

            let (visibility, pushed_at) = match &entry.metadata {
                Some(metadata) => (
                    RawValue::Text(metadata.visibility().to_string()),
                    RawValue::Text(metadata.last_updated_at.to_rfc3339()),
                ),
                None => (RawValue::Missing, RawValue::Missing),
            };

            table.set_passthrough(info_key("name"), vec![RawValue::Text(name.clone()); rows])?;
            table.set_passthrough(info_key("visibility"), vec![visibility; rows])?;
            table.set_passthrough(info_key("pushed_at"), vec![pushed_at; rows])?;
            tagged.push(table);
        }

        NormalizedTable::concat(&tagged)
    }
}

fn info_key(field: &str) -> ColumnKey {
    ColumnKey::new(DATASET_TOP, DATASET_GROUP, field)
}
