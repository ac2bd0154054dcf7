//! Structural checks for imported CSV rows.
//!
//! Rows arrive as loosely typed header→value maps; [`parse_reading_row`] is the
//! only way to turn one into a [`NewReading`].

use std::collections::HashMap;

use csv::StringRecord;
use energy_client::domain::NewReading;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

pub type CsvRow = HashMap<String, String>;

/// Columns a reading file must carry in its header. `value` may be empty per row.
pub const READING_COLUMNS: [&str; 3] = ["meter_id", "ts", "value"];

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RowError {
    #[error("missing or empty required field(s): {}", .0.join(", "))]
    MissingFields(Vec<String>),
    #[error("invalid ts '{value}': {reason}")]
    InvalidTimestamp { value: String, reason: String },
    #[error("invalid value '{0}': expected a finite number")]
    InvalidValue(String),
}

/// Pair header names with record fields. Header names are trimmed, values are kept as-is.
pub fn row_map(headers: &StringRecord, record: &StringRecord) -> CsvRow {
    headers
        .iter()
        .zip(record.iter())
        .map(|(h, v)| (h.trim().to_string(), v.to_string()))
        .collect()
}

/// True iff every required key is present and its trimmed value is non-empty.
pub fn validate_csv_row<S: AsRef<str>>(row: &CsvRow, required_fields: &[S]) -> bool {
    required_fields.iter().all(|field| {
        row.get(field.as_ref())
            .is_some_and(|v| !v.trim().is_empty())
    })
}

fn missing_fields<S: AsRef<str>>(row: &CsvRow, required_fields: &[S]) -> Vec<String> {
    required_fields
        .iter()
        .map(AsRef::as_ref)
        .filter(|field| row.get(*field).map_or(true, |v| v.trim().is_empty()))
        .map(str::to_string)
        .collect()
}

fn non_empty<'a>(row: &'a CsvRow, field: &str) -> Option<&'a str> {
    row.get(field).map(|v| v.trim()).filter(|v| !v.is_empty())
}

/// Turn a validated row into a reading.
///
/// An empty `value` is a missing reading, not an error. `source_system` falls
/// back to `default_source` when the column is absent or empty.
pub fn parse_reading_row<S: AsRef<str>>(
    row: &CsvRow,
    required_fields: &[S],
    default_source: &str,
) -> Result<NewReading, RowError> {
    if !validate_csv_row(row, required_fields) {
        return Err(RowError::MissingFields(missing_fields(row, required_fields)));
    }

    let (Some(meter_id), Some(ts_str)) = (non_empty(row, "meter_id"), non_empty(row, "ts")) else {
        return Err(RowError::MissingFields(missing_fields(row, &["meter_id", "ts"])));
    };

    let ts = OffsetDateTime::parse(ts_str, &Rfc3339).map_err(|e| RowError::InvalidTimestamp {
        value: ts_str.to_string(),
        reason: e.to_string(),
    })?;

    let value = match non_empty(row, "value") {
        None => None,
        Some(raw) => match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => Some(v),
            _ => return Err(RowError::InvalidValue(raw.to_string())),
        },
    };

    let source = non_empty(row, "source_system").unwrap_or(default_source);

    Ok(NewReading::new(meter_id, ts, value).with_source(source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn row(pairs: &[(&str, &str)]) -> CsvRow {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn row_with_all_required_fields_is_valid() {
        let r = row(&[("meter_id", "m-1"), ("ts", "2024-01-01T00:00:00Z"), ("value", "12")]);
        assert!(validate_csv_row(&r, &["meter_id", "ts", "value"]));
    }

    #[test]
    fn whitespace_only_counts_as_empty() {
        let r = row(&[("meter_id", "   "), ("ts", "2024-01-01T00:00:00Z")]);
        assert!(!validate_csv_row(&r, &["meter_id", "ts"]));
    }

    #[test]
    fn absent_required_field_is_invalid() {
        let r = row(&[("meter_id", "m-1")]);
        assert!(!validate_csv_row(&r, &["meter_id", "ts"]));
    }

    #[test]
    fn extra_fields_are_ignored() {
        let r = row(&[("meter_id", "m-1"), ("ts", "x"), ("note", "")]);
        assert!(validate_csv_row(&r, &["meter_id", "ts"]));
        assert!(validate_csv_row::<&str>(&r, &[]));
    }

    #[test]
    fn row_map_trims_headers() {
        let headers = StringRecord::from(vec![" meter_id", "ts ", "value"]);
        let record = StringRecord::from(vec!["m-1", "2024-01-01T00:00:00Z", " 4.5 "]);
        let r = row_map(&headers, &record);
        assert_eq!(r.get("meter_id").map(String::as_str), Some("m-1"));
        assert_eq!(r.get("ts").map(String::as_str), Some("2024-01-01T00:00:00Z"));
        assert_eq!(r.get("value").map(String::as_str), Some(" 4.5 "));
    }

    #[test]
    fn parses_a_complete_row() {
        let r = row(&[("meter_id", " m-1 "), ("ts", "2024-01-01T06:00:00+02:00"), ("value", " 4.5 ")]);
        let reading = parse_reading_row(&r, &["meter_id", "ts"], "csv").unwrap();
        assert_eq!(reading.meter_id, "m-1");
        assert_eq!(reading.ts, datetime!(2024-01-01 04:00:00 UTC));
        assert_eq!(reading.value, Some(4.5));
        assert_eq!(reading.source_system.as_deref(), Some("csv"));
    }

    #[test]
    fn empty_value_is_a_missing_reading() {
        let r = row(&[("meter_id", "m-1"), ("ts", "2024-01-01T00:00:00Z"), ("value", ""), ("source_system", "pi")]);
        let reading = parse_reading_row(&r, &["meter_id", "ts"], "csv").unwrap();
        assert_eq!(reading.value, None);
        assert_eq!(reading.source_system.as_deref(), Some("pi"));
    }

    #[test]
    fn non_numeric_values_are_rejected() {
        for bad in ["abc", "NaN", "inf", "1,5"] {
            let r = row(&[("meter_id", "m-1"), ("ts", "2024-01-01T00:00:00Z"), ("value", bad)]);
            assert_eq!(
                parse_reading_row(&r, &["meter_id", "ts"], "csv"),
                Err(RowError::InvalidValue(bad.to_string()))
            );
        }
    }

    #[test]
    fn bad_timestamp_is_reported() {
        let r = row(&[("meter_id", "m-1"), ("ts", "01/02/2024"), ("value", "1")]);
        let err = parse_reading_row(&r, &["meter_id", "ts"], "csv").unwrap_err();
        assert!(matches!(err, RowError::InvalidTimestamp { ref value, .. } if value == "01/02/2024"));
    }

    #[test]
    fn missing_fields_are_listed() {
        let r = row(&[("meter_id", ""), ("value", "1")]);
        let err = parse_reading_row(&r, &["meter_id", "ts", "value"], "csv").unwrap_err();
        assert_eq!(err, RowError::MissingFields(vec!["meter_id".to_string(), "ts".to_string()]));
        assert_eq!(err.to_string(), "missing or empty required field(s): meter_id, ts");
    }

    #[test]
    fn meter_and_ts_are_always_needed() {
        let r = row(&[("ts", "2024-01-01T00:00:00Z"), ("value", "1")]);
        let err = parse_reading_row::<&str>(&r, &[], "csv").unwrap_err();
        assert_eq!(err, RowError::MissingFields(vec!["meter_id".to_string()]));
    }
}
