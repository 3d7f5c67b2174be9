//! The modality/level catalog and the typed three-level column schema.
//!
//! Every canonical column is addressed by a [`ColumnKey`] triple
//! `(modality, group, field)`:
//! - `(PET, ipsi, II)` — involvement of level II on the ipsilateral side
//! - `(PET, core, date)` — date of the PET examination
//!
//! [`TableSchema::canonical`] expands a [`ModalityCatalog`] into the full,
//! ordered list of such columns together with their dtype contract.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::ops::Range;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, LyproxResult};

/// Lymph node levels known by default.
pub const DEFAULT_LEVELS: &[&str] = &[
    "I", "Ia", "Ib", "II", "IIa", "IIb", "III", "IV", "V", "Va", "Vb", "VII",
];

/// Diagnostic modalities known by default.
pub const DEFAULT_MODALITIES: &[&str] = &[
    "CT",
    "FNA",
    "MRI",
    "PET",
    "diagnostic_consensus",
    "max_llh",
    "pCT",
    "pathology",
];

/// Second header level of a modality's per-exam fields.
pub const CORE_GROUP: &str = "core";

/// Third header level of a modality's examination date.
pub const DATE_FIELD: &str = "date";

/// Side of the body relative to the primary tumor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Laterality {
    Ipsi,
    Contra,
}

impl Laterality {
    pub const ALL: [Laterality; 2] = [Laterality::Ipsi, Laterality::Contra];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ipsi => "ipsi",
            Self::Contra => "contra",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ipsi" => Some(Self::Ipsi),
            "contra" => Some(Self::Contra),
            _ => None,
        }
    }
}

/// Three-level column header.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnKey {
    pub top: String,
    pub group: String,
    pub field: String,
}

impl ColumnKey {
    pub fn new(top: impl Into<String>, group: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            top: top.into(),
            group: group.into(),
            field: field.into(),
        }
    }

    /// Involvement column of `level` on `side` as seen by `modality`.
    pub fn involvement(modality: &str, side: Laterality, level: &str) -> Self {
        Self::new(modality, side.as_str(), level)
    }

    /// Examination date column of `modality`.
    pub fn date(modality: &str) -> Self {
        Self::new(modality, CORE_GROUP, DATE_FIELD)
    }
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.top, self.group, self.field)
    }
}

/// Dtype contract of a canonical column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnKind {
    /// Boolean-like level involvement: missing, involved or healthy.
    Involvement,
    /// Calendar date without time.
    Date,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub key: ColumnKey,
    pub kind: ColumnKind,
}

/// Fixed, versioned enumeration of modality names and level codes.
///
/// Modalities are kept in a `BTreeSet`, so iteration is always lexical and
/// normalization output is reproducible regardless of input order. Levels
/// keep their configured order because that order is the column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CatalogFile", into = "CatalogFile")]
pub struct ModalityCatalog {
    version: String,
    modalities: BTreeSet<String>,
    levels: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogFile {
    version: String,
    modalities: Vec<String>,
    levels: Vec<String>,
}

impl ModalityCatalog {
    /// Build a catalog, rejecting empty or duplicated entries.
    pub fn new<M, L>(version: impl Into<String>, modalities: M, levels: L) -> LyproxResult<Self>
    where
        M: IntoIterator,
        M::Item: Into<String>,
        L: IntoIterator,
        L::Item: Into<String>,
    {
        let version = version.into();
        if version.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "catalog.version".to_string(),
            }
            .into());
        }

        let mut modality_set = BTreeSet::new();
        for modality in modalities {
            let modality = modality.into();
            if modality.trim().is_empty() || !modality_set.insert(modality.clone()) {
                return Err(invalid_entry("catalog.modalities", &modality));
            }
        }

        let mut seen = HashSet::new();
        let mut level_list = Vec::new();
        for level in levels {
            let level = level.into();
            if level.trim().is_empty() || !seen.insert(level.clone()) {
                return Err(invalid_entry("catalog.levels", &level));
            }
            level_list.push(level);
        }

        if modality_set.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "catalog.modalities".to_string(),
            }
            .into());
        }
        if level_list.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "catalog.levels".to_string(),
            }
            .into());
        }

        Ok(Self {
            version,
            modalities: modality_set,
            levels: level_list,
        })
    }

    /// The catalog compiled into the crate.
    pub fn builtin() -> Self {
        Self {
            version: "builtin-1".to_string(),
            modalities: DEFAULT_MODALITIES.iter().map(|m| m.to_string()).collect(),
            levels: DEFAULT_LEVELS.iter().map(|l| l.to_string()).collect(),
        }
    }

    pub fn from_json_str(json: &str) -> LyproxResult<Self> {
        serde_json::from_str(json).map_err(|e| {
            ConfigError::InvalidValue {
                field: "catalog".to_string(),
                value: "<json>".to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> LyproxResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json_str(&json)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Modalities in lexical order.
    pub fn modalities(&self) -> impl Iterator<Item = &str> {
        self.modalities.iter().map(String::as_str)
    }

    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    pub fn contains_modality(&self, modality: &str) -> bool {
        self.modalities.contains(modality)
    }
}

impl Default for ModalityCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

fn invalid_entry(field: &str, value: &str) -> crate::LyproxError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: "entries must be non-empty and unique".to_string(),
    }
    .into()
}

impl TryFrom<CatalogFile> for ModalityCatalog {
    type Error = crate::LyproxError;

    fn try_from(file: CatalogFile) -> Result<Self, Self::Error> {
        Self::new(file.version, file.modalities, file.levels)
    }
}

impl From<ModalityCatalog> for CatalogFile {
    fn from(catalog: ModalityCatalog) -> Self {
        Self {
            version: catalog.version,
            modalities: catalog.modalities.into_iter().collect(),
            levels: catalog.levels,
        }
    }
}

/// Ordered canonical column set derived from a catalog.
///
/// Layout per modality (modalities in lexical order):
/// `ipsi × levels`, then `contra × levels`, then `core.date`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    catalog_version: String,
    columns: Vec<ColumnDef>,
    index: HashMap<ColumnKey, usize>,
    spans: BTreeMap<String, Range<usize>>,
}

impl TableSchema {
    pub fn canonical(catalog: &ModalityCatalog) -> Self {
        let per_modality = catalog.levels().len() * Laterality::ALL.len() + 1;
        let mut columns = Vec::with_capacity(catalog.modalities.len() * per_modality);
        let mut spans = BTreeMap::new();

        for modality in catalog.modalities() {
            let start = columns.len();
            for side in Laterality::ALL {
                for level in catalog.levels() {
                    columns.push(ColumnDef {
                        key: ColumnKey::involvement(modality, side, level),
                        kind: ColumnKind::Involvement,
                    });
                }
            }
            columns.push(ColumnDef {
                key: ColumnKey::date(modality),
                kind: ColumnKind::Date,
            });
            spans.insert(modality.to_string(), start..columns.len());
        }

        let index = columns
            .iter()
            .enumerate()
            .map(|(position, def)| (def.key.clone(), position))
            .collect();

        Self {
            catalog_version: catalog.version().to_string(),
            columns,
            index,
            spans,
        }
    }

    pub fn catalog_version(&self) -> &str {
        &self.catalog_version
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn position(&self, key: &ColumnKey) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn kind_of(&self, key: &ColumnKey) -> Option<ColumnKind> {
        self.position(key).map(|position| self.columns[position].kind)
    }

    /// Canonical columns belonging to one modality.
    pub fn modality_columns(&self, modality: &str) -> &[ColumnDef] {
        match self.spans.get(modality) {
            Some(span) => &self.columns[span.clone()],
            None => &[],
        }
    }

    pub fn modalities(&self) -> impl Iterator<Item = &str> {
        self.spans.keys().map(String::as_str)
    }
}
