//! Cell coercion under the canonical dtype contract.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use lyprox_core::{is_missing_text, CellValue, ColumnKind, RawValue};

const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Coerce one raw cell into the dtype of `kind`.
///
/// The `Err` carries a human readable reason; the caller attaches column
/// and row.
pub fn coerce(kind: ColumnKind, value: &RawValue) -> Result<CellValue, String> {
    match kind {
        ColumnKind::Involvement => coerce_involvement(value),
        ColumnKind::Date => coerce_date(value),
    }
}

pub fn coerce_involvement(value: &RawValue) -> Result<CellValue, String> {
    match value {
        RawValue::Missing => Ok(CellValue::Missing),
        RawValue::Bool(flag) => Ok(CellValue::Bool(*flag)),
        RawValue::Int(0) => Ok(CellValue::Bool(false)),
        RawValue::Int(1) => Ok(CellValue::Bool(true)),
        RawValue::Float(float) if float.is_nan() => Ok(CellValue::Missing),
        RawValue::Float(float) if *float == 0.0 => Ok(CellValue::Bool(false)),
        RawValue::Float(float) if *float == 1.0 => Ok(CellValue::Bool(true)),
        RawValue::Text(text) => {
            let text = text.trim();
            if is_missing_text(text) {
                return Ok(CellValue::Missing);
            }
            match text.to_ascii_lowercase().as_str() {
                "true" | "t" | "yes" | "1" | "1.0" => Ok(CellValue::Bool(true)),
                "false" | "f" | "no" | "0" | "0.0" => Ok(CellValue::Bool(false)),
                _ => Err(format!("cannot coerce {:?} to involvement", text)),
            }
        }
        other => Err(format!("cannot coerce {:?} to involvement", other)),
    }
}

pub fn coerce_date(value: &RawValue) -> Result<CellValue, String> {
    match value {
        RawValue::Missing => Ok(CellValue::Missing),
        RawValue::Float(float) if float.is_nan() => Ok(CellValue::Missing),
        RawValue::Text(text) => {
            let text = text.trim();
            if is_missing_text(text) {
                return Ok(CellValue::Missing);
            }
            parse_date(text)
                .map(CellValue::Date)
                .ok_or_else(|| format!("cannot parse {:?} as a date", text))
        }
        other => Err(format!("cannot coerce {:?} to a date", other)),
    }
}

/// ISO date or date-time; any time part is discarded.
fn parse_date(text: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(stamp) = DateTime::parse_from_rfc3339(text) {
        return Some(stamp.date_naive());
    }
    DATE_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|stamp| stamp.date())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> RawValue {
        RawValue::Text(s.to_string())
    }

    fn date(y: i32, m: u32, d: u32) -> CellValue {
        CellValue::Date(NaiveDate::from_ymd_opt(y, m, d).expect("valid date"))
    }

    #[test]
    fn test_involvement_accepts_boolean_like_values() {
        assert_eq!(coerce_involvement(&RawValue::Bool(true)), Ok(CellValue::Bool(true)));
        assert_eq!(coerce_involvement(&RawValue::Int(0)), Ok(CellValue::Bool(false)));
        assert_eq!(coerce_involvement(&RawValue::Float(1.0)), Ok(CellValue::Bool(true)));
        assert_eq!(coerce_involvement(&text("Yes")), Ok(CellValue::Bool(true)));
        assert_eq!(coerce_involvement(&text("F")), Ok(CellValue::Bool(false)));
        assert_eq!(coerce_involvement(&text("0")), Ok(CellValue::Bool(false)));
    }

    #[test]
    fn test_involvement_missing_markers() {
        assert_eq!(coerce_involvement(&RawValue::Missing), Ok(CellValue::Missing));
        assert_eq!(coerce_involvement(&text("")), Ok(CellValue::Missing));
        assert_eq!(coerce_involvement(&text("NaN")), Ok(CellValue::Missing));
        assert_eq!(coerce_involvement(&text("None")), Ok(CellValue::Missing));
        assert_eq!(coerce_involvement(&RawValue::Float(f64::NAN)), Ok(CellValue::Missing));
    }

    #[test]
    fn test_involvement_rejects_other_values() {
        assert!(coerce_involvement(&RawValue::Int(2)).is_err());
        assert!(coerce_involvement(&RawValue::Float(0.5)).is_err());
        assert!(coerce_involvement(&text("maybe")).is_err());
    }

    #[test]
    fn test_date_formats() {
        assert_eq!(coerce_date(&text("2021-03-04")), Ok(date(2021, 3, 4)));
        assert_eq!(coerce_date(&text("2021-03-04T10:15:00")), Ok(date(2021, 3, 4)));
        assert_eq!(coerce_date(&text("2021-03-04 10:15:00.250")), Ok(date(2021, 3, 4)));
        assert_eq!(coerce_date(&text("2021-03-04T23:30:00+02:00")), Ok(date(2021, 3, 4)));
        assert_eq!(coerce_date(&text("nat")), Ok(CellValue::Missing));
    }

    #[test]
    fn test_date_rejects_non_dates() {
        assert!(coerce_date(&text("04.03.2021")).is_err());
        assert!(coerce_date(&text("2021-02-30")).is_err());
        assert!(coerce_date(&RawValue::Int(20210304)).is_err());
        assert!(coerce_date(&RawValue::Bool(true)).is_err());
    }

    #[test]
    fn test_coerce_dispatches_on_kind() {
        assert_eq!(
            coerce(ColumnKind::Involvement, &RawValue::Bool(false)),
            Ok(CellValue::Bool(false))
        );
        assert_eq!(coerce(ColumnKind::Date, &text("2020-01-01")), Ok(date(2020, 1, 1)));
    }
}
