use crate::pipeline::aggregate::round2;
use crate::types::{AggregatedMetric, PersistedMetric};

/// An average together with the number of samples behind it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeValue {
    pub avg_duration: f64,
    pub record_count: u64,
}

impl MergeValue {
    pub fn new(avg_duration: f64, record_count: u64) -> Self {
        Self {
            avg_duration,
            record_count,
        }
    }
}

impl From<&AggregatedMetric> for MergeValue {
    fn from(metric: &AggregatedMetric) -> Self {
        Self::new(metric.avg_duration, metric.record_count)
    }
}

impl From<&PersistedMetric> for MergeValue {
    fn from(metric: &PersistedMetric) -> Self {
        Self::new(metric.avg_duration, metric.record_count)
    }
}

/// Combines an incoming aggregate with the stored one for the same key.
///
/// The stored average is weighted by its count as if every original sample
/// were still available; only the average survives first aggregation.
pub fn merge(incoming: MergeValue, existing: Option<MergeValue>) -> MergeValue {
    let Some(existing) = existing else {
        return MergeValue::new(round2(incoming.avg_duration), incoming.record_count);
    };

    let record_count = existing.record_count + incoming.record_count;
    if record_count == 0 {
        return existing;
    }

    let weighted = existing.avg_duration * existing.record_count as f64
        + incoming.avg_duration * incoming.record_count as f64;

    MergeValue::new(round2(weighted / record_count as f64), record_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::aggregate::aggregate_rows;
    use crate::validate::ValidatedRow;
    use chrono::{TimeDelta, TimeZone, Utc};

    #[test]
    fn test_first_write_is_unchanged() {
        let merged = merge(MergeValue::new(200.0, 3), None);
        assert_eq!(merged, MergeValue::new(200.0, 3));
    }

    #[test]
    fn test_weighted_merge() {
        let merged = merge(MergeValue::new(400.0, 1), Some(MergeValue::new(200.0, 3)));
        assert_eq!(merged, MergeValue::new(250.0, 4));
    }

    #[test]
    fn test_merge_is_order_independent() {
        let a = MergeValue::new(10.0, 2);
        let b = MergeValue::new(20.0, 2);

        let forward = merge(b, Some(merge(a, None)));
        let backward = merge(a, Some(merge(b, None)));

        assert_eq!(forward, MergeValue::new(15.0, 4));
        assert_eq!(backward, forward);
    }

    #[test]
    fn test_merge_rounds_result() {
        let merged = merge(MergeValue::new(10.0, 1), Some(MergeValue::new(20.0, 2)));
        assert_eq!(merged, MergeValue::new(16.67, 3));
    }

    #[test]
    fn test_zero_counts_keep_existing() {
        let existing = MergeValue::new(12.5, 0);
        assert_eq!(merge(MergeValue::new(99.0, 0), Some(existing)), existing);
    }

    #[test]
    fn test_aggregator_output_survives_first_merge() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let rows: Vec<ValidatedRow> = (0..50)
            .map(|i| ValidatedRow {
                timestamp: start + TimeDelta::minutes(i * 29),
                account_id: format!("acct-{}", i % 3),
                kind: "api".into(),
                duration_ms: 10.0 + i as f64 * 7.31,
            })
            .collect();

        for group in aggregate_rows(&rows) {
            let value = MergeValue::from(&group);
            assert_eq!(merge(value, None), value);
        }
    }
}
