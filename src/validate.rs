//! Row validation and duration range filtering.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use crate::config::IngestConfig;
use crate::error::RowError;
use crate::parser::{COL_ACCOUNT_ID, COL_DATE, COL_DURATION, COL_TYPE, RawRow};

/// A row that passed schema checks and the duration range filter.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRow {
    pub timestamp: DateTime<Utc>,
    pub account_id: String,
    pub kind: String,
    pub duration_ms: f64,
}

/// What the validator decided for one row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Valid(ValidatedRow),
    /// Well-formed, but the duration is outside the accepted range.
    Filtered,
    Invalid(RowError),
}

/// Validates one raw row. `row` is the number reported in error messages.
///
/// `Host`, `Service` and `Content` may be present but are not inspected.
pub fn validate_row(raw: &RawRow, row: usize, config: &IngestConfig) -> RowOutcome {
    match check_row(raw, config) {
        Ok(Some(valid)) => RowOutcome::Valid(valid),
        Ok(None) => RowOutcome::Filtered,
        Err(message) => RowOutcome::Invalid(RowError::new(row, message)),
    }
}

fn check_row(raw: &RawRow, config: &IngestConfig) -> Result<Option<ValidatedRow>, String> {
    let date = required(raw, COL_DATE)?;
    let duration_raw = required(raw, COL_DURATION)?;
    let account_id = required(raw, COL_ACCOUNT_ID)?;
    let kind = required(raw, COL_TYPE)?;

    let duration_ms = parse_duration(duration_raw)
        .ok_or_else(|| format!("Invalid duration value: {duration_raw}"))?;
    if account_id.is_empty() {
        return Err("Account ID is required".to_string());
    }
    if kind.is_empty() {
        return Err("Measurement type is required".to_string());
    }
    let timestamp = parse_timestamp(date).ok_or_else(|| format!("Invalid date value: {date}"))?;

    if !config.accepts_duration(duration_ms) {
        return Ok(None);
    }

    Ok(Some(ValidatedRow {
        timestamp,
        account_id: account_id.to_string(),
        kind: kind.to_string(),
        duration_ms,
    }))
}

fn required<'a>(raw: &'a RawRow, column: &str) -> Result<&'a str, String> {
    raw.get(column)
        .ok_or_else(|| format!("Missing required field: {column}"))
}

/// Parses a duration given as text.
///
/// The longest leading decimal number is used and trailing text ignored, so
/// `"12ms"` reads as 12. Text without a leading number and non-finite values
/// are rejected.
pub fn parse_duration(raw: &str) -> Option<f64> {
    let number = leading_number(raw.trim());
    if number.is_empty() {
        return None;
    }
    number.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// `[sign] digits [. digits] [e [sign] digits]` prefix of `text`, or `""`.
fn leading_number(text: &str) -> &str {
    let bytes = text.as_bytes();
    let digits_from = |start: usize| {
        start + bytes[start..].iter().take_while(|b| b.is_ascii_digit()).count()
    };

    let mut end = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    let int_end = digits_from(end);
    let mut has_digits = int_end > end;
    end = int_end;

    if bytes.get(end) == Some(&b'.') {
        let frac_end = digits_from(end + 1);
        if frac_end > end + 1 {
            has_digits = true;
            end = frac_end;
        }
    }
    if !has_digits {
        return "";
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp = end + 1;
        if matches!(bytes.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        let exp_end = digits_from(exp);
        if exp_end > exp {
            end = exp_end;
        }
    }
    &text[..end]
}

/// Parses the `Date` column. Offset-less forms are read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date.and_time(NaiveTime::MIN).and_utc());
    }
    DateTime::parse_from_rfc2822(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}
