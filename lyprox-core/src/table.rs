//! Raw and normalized tabular data.
//!
//! Both tables are stored column-major. A [`RawTable`] is whatever the
//! remote source delivered: untyped cells under free-form three-level
//! headers. A [`NormalizedTable`] carries the canonical columns of a
//! [`TableSchema`](crate::TableSchema) with typed cells, followed by any
//! passthrough (non-modality) columns in their original order.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{ColumnKey, ColumnKind, LyproxResult, SchemaError};

/// An untyped cell as delivered by the remote source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawValue {
    Missing,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl RawValue {
    /// Infer the most specific raw value from a CSV cell.
    ///
    /// Empty cells and the usual NA spellings become [`RawValue::Missing`].
    /// Non-finite floats stay text so they surface as coercion errors.
    pub fn infer(cell: &str) -> Self {
        let trimmed = cell.trim();
        if is_missing_text(trimmed) {
            return Self::Missing;
        }
        match trimmed {
            "True" | "true" | "TRUE" => return Self::Bool(true),
            "False" | "false" | "FALSE" => return Self::Bool(false),
            _ => {}
        }
        if let Ok(int) = trimmed.parse::<i64>() {
            return Self::Int(int);
        }
        match trimmed.parse::<f64>() {
            Ok(float) if float.is_finite() => Self::Float(float),
            _ => Self::Text(trimmed.to_string()),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// Storable form of the value: NaN becomes [`RawValue::Missing`] and an
    /// infinite float becomes its text spelling, matching [`RawValue::infer`].
    pub fn into_storable(self) -> Self {
        match self {
            Self::Float(float) if float.is_nan() => Self::Missing,
            Self::Float(float) if float.is_infinite() => Self::Text(float.to_string()),
            other => other,
        }
    }
}

fn storable_column(column: RawColumn) -> RawColumn {
    RawColumn {
        key: column.key,
        values: column.values.into_iter().map(RawValue::into_storable).collect(),
    }
}

/// Text spellings treated as the missing-value marker.
pub fn is_missing_text(text: &str) -> bool {
    matches!(
        text.to_ascii_lowercase().as_str(),
        "" | "nan" | "na" | "n/a" | "none" | "null" | "<na>" | "nat"
    )
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawColumn {
    pub key: ColumnKey,
    pub values: Vec<RawValue>,
}

impl RawColumn {
    pub fn new(key: ColumnKey, values: Vec<RawValue>) -> Self {
        Self { key, values }
    }
}

/// As-fetched table: ordered rows under three-level headers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawTable {
    row_count: usize,
    columns: Vec<RawColumn>,
}

impl RawTable {
    /// Build a table from columns that must all have `row_count` values.
    ///
    /// Cells are stored in their [`RawValue::into_storable`] form.
    pub fn new(row_count: usize, columns: Vec<RawColumn>) -> LyproxResult<Self> {
        for column in &columns {
            if column.values.len() != row_count {
                return Err(SchemaError::MalformedTable {
                    reason: format!(
                        "column {} has {} values, expected {}",
                        column.key,
                        column.values.len(),
                        row_count
                    ),
                }
                .into());
            }
        }
        let columns = columns.into_iter().map(storable_column).collect();
        Ok(Self { row_count, columns })
    }

    /// Build a table from a header and row-major records.
    pub fn from_rows(keys: Vec<ColumnKey>, rows: Vec<Vec<RawValue>>) -> LyproxResult<Self> {
        let row_count = rows.len();
        let mut columns: Vec<RawColumn> = keys
            .into_iter()
            .map(|key| RawColumn::new(key, Vec::with_capacity(row_count)))
            .collect();

        for (row_index, row) in rows.into_iter().enumerate() {
            if row.len() != columns.len() {
                return Err(SchemaError::MalformedTable {
                    reason: format!(
                        "row {} has {} cells, expected {}",
                        row_index,
                        row.len(),
                        columns.len()
                    ),
                }
                .into());
            }
            for (column, value) in columns.iter_mut().zip(row) {
                column.values.push(value.into_storable());
            }
        }

        Ok(Self { row_count, columns })
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn columns(&self) -> &[RawColumn] {
        &self.columns
    }

    /// First column with the given key.
    pub fn column(&self, key: &ColumnKey) -> Option<&RawColumn> {
        self.columns.iter().find(|column| &column.key == key)
    }

    /// Whether any column sits under the top-level header `top`.
    pub fn has_top(&self, top: &str) -> bool {
        self.columns.iter().any(|column| column.key.top == top)
    }

    /// Columns under the top-level header `top`, in table order.
    pub fn columns_under<'a>(&'a self, top: &'a str) -> impl Iterator<Item = &'a RawColumn> + 'a {
        self.columns.iter().filter(move |column| column.key.top == top)
    }
}

/// A typed cell of a canonical column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellValue {
    Missing,
    Bool(bool),
    Date(NaiveDate),
}

impl CellValue {
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(value) => Some(*value),
            _ => None,
        }
    }

    /// Raw rendering, used when feeding a normalized table back in.
    pub fn to_raw(&self) -> RawValue {
        match self {
            Self::Missing => RawValue::Missing,
            Self::Bool(value) => RawValue::Bool(*value),
            Self::Date(date) => RawValue::Text(date.format("%Y-%m-%d").to_string()),
        }
    }
}

/// A canonical column with its dtype contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub key: ColumnKey,
    pub kind: ColumnKind,
    pub values: Vec<CellValue>,
}

impl Column {
    /// A column of `row_count` missing markers.
    pub fn missing(key: ColumnKey, kind: ColumnKind, row_count: usize) -> Self {
        Self {
            key,
            kind,
            values: vec![CellValue::Missing; row_count],
        }
    }

    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|value| value.is_missing()).count()
    }
}

/// Canonical table produced by the normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedTable {
    catalog_version: String,
    row_count: usize,
    columns: Vec<Column>,
    passthrough: Vec<RawColumn>,
}

impl NormalizedTable {
    /// Assemble a table, checking that every column has `row_count` cells
    /// and that no key appears twice.
    pub fn from_parts(
        catalog_version: impl Into<String>,
        row_count: usize,
        columns: Vec<Column>,
        passthrough: Vec<RawColumn>,
    ) -> LyproxResult<Self> {
        let mut seen = HashSet::new();
        let typed = columns.iter().map(|c| (&c.key, c.values.len()));
        let untyped = passthrough.iter().map(|c| (&c.key, c.values.len()));
        for (key, len) in typed.chain(untyped) {
            if len != row_count {
                return Err(SchemaError::MalformedTable {
                    reason: format!("column {} has {} values, expected {}", key, len, row_count),
                }
                .into());
            }
            if !seen.insert(key) {
                return Err(SchemaError::ConflictingColumn {
                    column: key.to_string(),
                }
                .into());
            }
        }

        Ok(Self {
            catalog_version: catalog_version.into(),
            row_count,
            columns,
            passthrough: passthrough.into_iter().map(storable_column).collect(),
        })
    }

    /// Version of the catalog the canonical columns were built from.
    pub fn catalog_version(&self) -> &str {
        &self.catalog_version
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Canonical (typed) columns in schema order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, key: &ColumnKey) -> Option<&Column> {
        self.columns.iter().find(|column| &column.key == key)
    }

    pub fn passthrough(&self) -> &[RawColumn] {
        &self.passthrough
    }

    pub fn passthrough_column(&self, key: &ColumnKey) -> Option<&RawColumn> {
        self.passthrough.iter().find(|column| &column.key == key)
    }

    /// `(rows, columns)` counting canonical and passthrough columns.
    pub fn shape(&self) -> (usize, usize) {
        (self.row_count, self.columns.len() + self.passthrough.len())
    }

    /// Set a passthrough column, replacing any existing one with the same key.
    pub fn set_passthrough(&mut self, key: ColumnKey, values: Vec<RawValue>) -> LyproxResult<()> {
        if values.len() != self.row_count {
            return Err(SchemaError::MalformedTable {
                reason: format!(
                    "column {} has {} values, expected {}",
                    key,
                    values.len(),
                    self.row_count
                ),
            }
            .into());
        }
        if self.column(&key).is_some() {
            return Err(SchemaError::ConflictingColumn {
                column: key.to_string(),
            }
            .into());
        }
        let values: Vec<RawValue> = values.into_iter().map(RawValue::into_storable).collect();
        match self.passthrough.iter_mut().find(|column| column.key == key) {
            Some(existing) => existing.values = values,
            None => self.passthrough.push(RawColumn::new(key, values)),
        }
        Ok(())
    }

    /// Stack tables vertically.
    ///
    /// All tables must share the same canonical columns. Passthrough columns
    /// are unioned in first-seen order; rows of a table lacking one of them
    /// are filled with [`RawValue::Missing`].
    pub fn concat(tables: &[NormalizedTable]) -> LyproxResult<Option<Self>> {
        let Some(first) = tables.first() else {
            return Ok(None);
        };

        for table in &tables[1..] {
            let same_layout = table.catalog_version == first.catalog_version
                && table.columns.len() == first.columns.len()
                && table
                    .columns
                    .iter()
                    .zip(&first.columns)
                    .all(|(a, b)| a.key == b.key && a.kind == b.kind);
            if !same_layout {
                return Err(SchemaError::MalformedTable {
                    reason: "cannot concatenate tables with different canonical columns"
                        .to_string(),
                }
                .into());
            }
        }

        let row_count = tables.iter().map(|table| table.row_count).sum();

        let columns = first
            .columns
            .iter()
            .enumerate()
            .map(|(position, column)| Column {
                key: column.key.clone(),
                kind: column.kind,
                values: tables
                    .iter()
                    .flat_map(|table| table.columns[position].values.iter().copied())
                    .collect(),
            })
            .collect();

        let mut passthrough_keys: Vec<ColumnKey> = Vec::new();
        for table in tables {
            for column in &table.passthrough {
                if !passthrough_keys.contains(&column.key) {
                    passthrough_keys.push(column.key.clone());
                }
            }
        }

        let passthrough = passthrough_keys
            .into_iter()
            .map(|key| {
                let mut values = Vec::with_capacity(row_count);
                for table in tables {
                    match table.passthrough_column(&key) {
                        Some(column) => values.extend(column.values.iter().cloned()),
                        None => values.extend(
                            std::iter::repeat(RawValue::Missing).take(table.row_count),
                        ),
                    }
                }
                RawColumn::new(key, values)
            })
            .collect();

        Ok(Some(Self {
            catalog_version: first.catalog_version.clone(),
            row_count,
            columns,
            passthrough,
        }))
    }

    /// Render back into a raw table: canonical columns first, dates as ISO text.
    pub fn to_raw(&self) -> RawTable {
        let columns = self
            .columns
            .iter()
            .map(|column| {
                RawColumn::new(
                    column.key.clone(),
                    column.values.iter().map(CellValue::to_raw).collect(),
                )
            })
            .chain(self.passthrough.iter().cloned())
            .collect();

        RawTable {
            row_count: self.row_count,
            columns,
        }
    }
}
