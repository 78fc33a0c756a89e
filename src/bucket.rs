//! Fixed-width UTC time buckets.
//!
//! Every day is split into six contiguous 4-hour windows starting at
//! 00:00, 04:00, 08:00, 12:00, 16:00 and 20:00 UTC.

use chrono::{DateTime, TimeDelta, Timelike, Utc};

/// Width of one bucket in hours.
pub const BUCKET_HOURS: i64 = 4;

const BUCKET_SECS: i64 = BUCKET_HOURS * 3600;

/// Returns the start of the 4-hour UTC window containing `ts`.
///
/// Truncation happens on the Unix timeline; since 24 is a multiple of 4 this
/// is the same as keeping the calendar date and flooring the hour.
pub fn bucket_start(ts: DateTime<Utc>) -> DateTime<Utc> {
    let into_bucket = ts.timestamp().rem_euclid(BUCKET_SECS);
    ts - TimeDelta::seconds(into_bucket) - TimeDelta::nanoseconds(ts.nanosecond() as i64)
}

/// Returns the exclusive end of the window containing `ts`.
pub fn bucket_end(ts: DateTime<Utc>) -> DateTime<Utc> {
    bucket_start(ts) + TimeDelta::hours(BUCKET_HOURS)
}

/// Returns `true` if `ts` already sits on a bucket boundary.
pub fn is_aligned(ts: DateTime<Utc>) -> bool {
    bucket_start(ts) == ts
}

/// Label used when listing a bucket, e.g. `2024-03-01 08:00 UTC`.
pub fn format_bucket_label(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:00 UTC").to_string()
}

/// Day-only label used on chart axes, e.g. `2024-03-01`.
pub fn format_chart_date(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d").to_string()
}
