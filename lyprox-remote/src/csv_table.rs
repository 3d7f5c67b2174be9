//! CSV decoding of dataset tables.
//!
//! Dataset files carry a three-row header: row one names the top level
//! (a modality such as `PET`, or `patient`, `tumor`, ...), row two the group
//! and row three the field. Every following row is one patient.

use std::io::Read;

use lyprox_core::{ColumnKey, LyproxError, LyproxResult, RawTable, RawValue, SchemaError};

const HEADER_ROWS: usize = 3;

fn malformed(reason: impl Into<String>) -> LyproxError {
    SchemaError::MalformedTable {
        reason: reason.into(),
    }
    .into()
}

/// Parse a dataset CSV into a [`RawTable`].
///
/// Cells are typed with [`RawValue::infer`]. Rows whose width differs from
/// the header are rejected.
pub fn parse_raw_table<R: Read>(reader: R) -> LyproxResult<RawTable> {
    let mut records = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader)
        .into_records();

    let mut header: Vec<csv::StringRecord> = Vec::with_capacity(HEADER_ROWS);
    for _ in 0..HEADER_ROWS {
        match records.next() {
            Some(record) => header.push(record.map_err(|e| malformed(e.to_string()))?),
            None => {
                return Err(malformed(format!(
                    "expected {} header rows, found {}",
                    HEADER_ROWS,
                    header.len()
                )))
            }
        }
    }

    let keys = header_keys(&header)?;

    let mut rows = Vec::new();
    for record in records {
        let record = record.map_err(|e| malformed(e.to_string()))?;
        rows.push(record.iter().map(RawValue::infer).collect());
    }

    RawTable::from_rows(keys, rows)
}

/// Parse a dataset CSV held in memory.
pub fn parse_raw_table_str(text: &str) -> LyproxResult<RawTable> {
    parse_raw_table(text.as_bytes())
}

fn header_keys(header: &[csv::StringRecord]) -> LyproxResult<Vec<ColumnKey>> {
    let width = header[0].len();
    if let Some((row, record)) = header.iter().enumerate().find(|(_, r)| r.len() != width) {
        return Err(malformed(format!(
            "header row {} has {} cells, expected {}",
            row,
            record.len(),
            width
        )));
    }

    (0..width)
        .map(|index| {
            let part = |row: usize| -> LyproxResult<String> {
                let cell = header[row].get(index).unwrap_or_default().trim();
                if cell.is_empty() {
                    return Err(malformed(format!(
                        "empty header cell in row {} column {}",
                        row, index
                    )));
                }
                Ok(cell.to_string())
            };
            Ok(ColumnKey::new(part(0)?, part(1)?, part(2)?))
        })
        .collect()
}
