//! Reconciliation of raw tables with the canonical column layout.

use std::collections::HashMap;

use lyprox_core::{
    Column, ColumnKey, LyproxResult, ModalityCatalog, NormalizedTable, RawColumn, RawTable,
    SchemaError, TableSchema,
};

use crate::coerce::coerce;

/// Maps raw tables onto the canonical schema of one catalog.
///
/// Pure and synchronous; a single normalizer can be shared across threads.
#[derive(Debug, Clone)]
pub struct Normalizer {
    catalog: ModalityCatalog,
    schema: TableSchema,
}

impl Normalizer {
    pub fn new(catalog: ModalityCatalog) -> Self {
        let schema = TableSchema::canonical(&catalog);
        Self { catalog, schema }
    }

    pub fn catalog(&self) -> &ModalityCatalog {
        &self.catalog
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Normalize `raw` into the canonical layout.
    ///
    /// Every canonical column is present in the output; columns the raw
    /// table did not supply hold only missing markers. Modality columns
    /// outside the canonical set are dropped. Columns under any other
    /// top-level header are carried through unchanged, in their original
    /// order, after the canonical columns.
    ///
    /// # Errors
    ///
    /// - `SchemaError::ConflictingColumn` if a key appears twice with
    ///   different content
    /// - `SchemaError::Violation` if a cell cannot be coerced to its
    ///   column's dtype
    pub fn normalize(&self, raw: &RawTable) -> LyproxResult<NormalizedTable> {
        let sources = unique_columns(raw)?;
        let row_count = raw.row_count();

        let mut columns = Vec::with_capacity(self.schema.len());
        for def in self.schema.columns() {
            let column = match sources.get(&def.key) {
                Some(source) => {
                    let mut values = Vec::with_capacity(row_count);
                    for (row, value) in source.values.iter().enumerate() {
                        let cell = coerce(def.kind, value).map_err(|reason| {
                            SchemaError::Violation {
                                column: def.key.to_string(),
                                row,
                                reason,
                            }
                        })?;
                        values.push(cell);
                    }
                    Column {
                        key: def.key.clone(),
                        kind: def.kind,
                        values,
                    }
                }
                None => Column::missing(def.key.clone(), def.kind, row_count),
            };
            columns.push(column);
        }

        let mut passthrough: Vec<RawColumn> = Vec::new();
        let mut dropped = 0usize;
        for column in raw.columns() {
            if self.catalog.contains_modality(&column.key.top) {
                if self.schema.position(&column.key).is_none() {
                    tracing::debug!(column = %column.key, "Dropping non-canonical modality column");
                    dropped += 1;
                }
            } else if !passthrough.iter().any(|kept| kept.key == column.key) {
                passthrough.push(column.clone());
            }
        }

        let table =
            NormalizedTable::from_parts(self.catalog.version(), row_count, columns, passthrough)?;

        tracing::trace!(
            catalog_version = %self.catalog.version(),
            rows = row_count,
            passthrough_columns = table.passthrough().len(),
            dropped_columns = dropped,
            "Normalized raw table"
        );

        Ok(table)
    }
}

/// Index raw columns by key, rejecting duplicates whose cells differ.
fn unique_columns(raw: &RawTable) -> LyproxResult<HashMap<&ColumnKey, &RawColumn>> {
    let mut by_key: HashMap<&ColumnKey, &RawColumn> = HashMap::with_capacity(raw.columns().len());
    for column in raw.columns() {
        if let Some(existing) = by_key.get(&column.key) {
            if existing.values != column.values {
                return Err(SchemaError::ConflictingColumn {
                    column: column.key.to_string(),
                }
                .into());
            }
            continue;
        }
        by_key.insert(&column.key, column);
    }
    Ok(by_key)
}
