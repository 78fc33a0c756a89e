//! CSV reader for raw measurement exports.

use std::collections::HashMap;

use anyhow::Result;
use csv::{ReaderBuilder, StringRecord};

/// Column holding the measurement time.
pub const COL_DATE: &str = "Date";
/// Column holding the account identifier.
pub const COL_ACCOUNT_ID: &str = "accountId";
/// Column holding the duration in milliseconds, as text.
pub const COL_DURATION: &str = "@data.duration";
/// Column holding the measurement type.
pub const COL_TYPE: &str = "@data.type";

/// One CSV line keyed by header name. Columns absent from the line are
/// absent from the map; present-but-empty columns map to `""`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    fields: HashMap<String, String>,
}

impl RawRow {
    pub fn from_record(headers: &StringRecord, record: &StringRecord) -> Self {
        let fields = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.to_string(), v.to_string()))
            .collect();
        Self { fields }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Splits a CSV document with a header row into [`RawRow`]s.
///
/// Blank lines are skipped and ragged lines are kept (missing trailing
/// columns simply do not appear in the row).
///
/// # Errors
///
/// Returns an error if the document is not valid UTF-8 or cannot be read.
pub fn parse_csv(bytes: &[u8]) -> Result<Vec<RawRow>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let headers: StringRecord = rdr
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}'))
        .collect();

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        rows.push(RawRow::from_record(&headers, &record));
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_bytes_returns_no_rows() {
        let rows = parse_csv(b"").unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_parse_keys_fields_by_header() {
        let csv = "Date,Host,accountId,@data.duration,@data.type\n\
                   2024-03-01T08:15:00Z,web-1,acct-1,120.5,api\n";
        let rows = parse_csv(csv.as_bytes()).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get(COL_DATE), Some("2024-03-01T08:15:00Z"));
        assert_eq!(rows[0].get("Host"), Some("web-1"));
        assert_eq!(rows[0].get(COL_DURATION), Some("120.5"));
        assert_eq!(rows[0].get(COL_TYPE), Some("api"));
        assert_eq!(rows[0].get("Content"), None);
    }

    #[test]
    fn test_parse_skips_blank_lines_and_keeps_short_rows() {
        let csv = "Date,accountId,@data.duration,@data.type\n\
                   \n\
                   2024-03-01T08:15:00Z,acct-1\n\
                   \n";
        let rows = parse_csv(csv.as_bytes()).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get(COL_ACCOUNT_ID), Some("acct-1"));
        assert_eq!(rows[0].get(COL_DURATION), None);
    }

    #[test]
    fn test_parse_quoted_fields() {
        let csv = "Date,accountId,@data.duration,@data.type,Content\n\
                   2024-03-01T08:15:00Z,acct-1,10,api,\"hello, world\"\n";
        let rows = parse_csv(csv.as_bytes()).unwrap();
        assert_eq!(rows[0].get("Content"), Some("hello, world"));
    }

    #[test]
    fn test_parse_strips_bom_from_first_header() {
        let csv = "\u{feff}Date,accountId\n2024-03-01,acct-1\n";
        let rows = parse_csv(csv.as_bytes()).unwrap();
        assert_eq!(rows[0].get(COL_DATE), Some("2024-03-01"));
    }

    #[test]
    fn test_parse_invalid_utf8_fails() {
        let bytes = b"Date,accountId\n\xff\xfe,acct\n";
        assert!(parse_csv(bytes).is_err());
    }
}
