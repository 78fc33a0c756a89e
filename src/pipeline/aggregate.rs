use std::collections::BTreeMap;

use crate::bucket::bucket_start;
use crate::types::{AggregatedMetric, BucketKey};
use crate::validate::ValidatedRow;

/// Rounds to two decimals, halves going up.
///
/// Stored averages always pass through here, so re-ingesting the same data
/// yields the same stored value.
pub fn round2(value: f64) -> f64 {
    (value * 100.0 + 0.5).floor() / 100.0
}

/// Running sum and count for one bucket key.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AggregateGroup {
    pub sum: f64,
    pub count: u64,
}

impl AggregateGroup {
    pub fn add(&mut self, duration_ms: f64) {
        self.sum += duration_ms;
        self.count += 1;
    }

    /// Rounded mean; 0.0 for an empty group.
    pub fn average(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        round2(self.sum / self.count as f64)
    }
}

/// Groups rows by `(bucket, account, type)` and averages each group.
///
/// Output is ordered by key.
pub fn aggregate_rows<'a, I>(rows: I) -> Vec<AggregatedMetric>
where
    I: IntoIterator<Item = &'a ValidatedRow>,
{
    let mut groups: BTreeMap<BucketKey, AggregateGroup> = BTreeMap::new();

    for row in rows {
        let key = BucketKey::new(bucket_start(row.timestamp), &row.account_id, &row.kind);
        groups.entry(key).or_default().add(row.duration_ms);
    }

    groups
        .into_iter()
        .map(|(key, group)| AggregatedMetric {
            bucket_timestamp: key.bucket_start,
            account_id: key.account_id,
            kind: key.kind,
            avg_duration: group.average(),
            record_count: group.count,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, 0).unwrap()
    }

    fn row(ts: DateTime<Utc>, account: &str, kind: &str, duration_ms: f64) -> ValidatedRow {
        ValidatedRow {
            timestamp: ts,
            account_id: account.into(),
            kind: kind.into(),
            duration_ms,
        }
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(200.0), 200.0);
        assert_eq!(round2(1.234), 1.23);
        assert_eq!(round2(2.5), 2.5);
        assert_eq!(round2(0.125), 0.13);
        assert_eq!(round2(33.333333), 33.33);
        assert_eq!(round2(round2(12.345)), round2(12.345));
    }

    #[test]
    fn test_single_group_average() {
        let rows = vec![
            row(at(8, 5), "acct-1", "api", 100.0),
            row(at(9, 30), "acct-1", "api", 200.0),
            row(at(11, 59), "acct-1", "api", 300.0),
        ];
        let groups = aggregate_rows(&rows);

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].bucket_timestamp, at(8, 0));
        assert_eq!(groups[0].avg_duration, 200.0);
        assert_eq!(groups[0].record_count, 3);
    }

    #[test]
    fn test_groups_split_on_bucket_account_and_type() {
        let rows = vec![
            row(at(3, 59), "acct-1", "api", 10.0),
            row(at(4, 0), "acct-1", "api", 20.0),
            row(at(4, 1), "acct-2", "api", 30.0),
            row(at(4, 2), "acct-1", "db", 40.0),
            row(at(5, 0), "acct-1", "api", 60.0),
        ];
        let groups = aggregate_rows(&rows);

        assert_eq!(groups.len(), 4);
        let find = |h: u32, account: &str, kind: &str| {
            groups
                .iter()
                .find(|g| g.bucket_timestamp == at(h, 0) && g.account_id == account && g.kind == kind)
                .unwrap()
        };
        assert_eq!(find(0, "acct-1", "api").avg_duration, 10.0);
        assert_eq!(find(4, "acct-1", "api").avg_duration, 40.0);
        assert_eq!(find(4, "acct-1", "api").record_count, 2);
        assert_eq!(find(4, "acct-2", "api").record_count, 1);
        assert_eq!(find(4, "acct-1", "db").avg_duration, 40.0);
    }

    #[test]
    fn test_order_of_rows_does_not_matter() {
        let mut rows = vec![
            row(at(13, 0), "a", "t", 1.1),
            row(at(14, 0), "a", "t", 2.2),
            row(at(1, 0), "b", "t", 3.3),
            row(at(15, 0), "a", "t", 4.4),
        ];
        let forward = aggregate_rows(&rows);
        rows.reverse();
        assert_eq!(aggregate_rows(&rows), forward);
    }

    #[test]
    fn test_average_is_rounded() {
        let rows = vec![
            row(at(0, 0), "a", "t", 1.0),
            row(at(0, 1), "a", "t", 1.0),
            row(at(0, 2), "a", "t", 2.0),
        ];
        assert_eq!(aggregate_rows(&rows)[0].avg_duration, 1.33);
    }

    #[test]
    fn test_no_rows_no_groups() {
        assert!(aggregate_rows(&Vec::<ValidatedRow>::new()).is_empty());
    }
}
