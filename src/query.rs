//! Read side over stored metrics: filtered, newest-first pages plus the
//! distinct account and type lists used to populate filters.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::QueryError;
use crate::types::PersistedMetric;

pub const DEFAULT_LIMIT: usize = 100;
pub const MAX_LIMIT: usize = 1000;

/// Which metrics to return. Empty id/type lists match everything; date bounds
/// are inclusive and apply to the bucket timestamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetricsFilter {
    pub account_ids: Vec<String>,
    pub types: Vec<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    /// Return every match and ignore `limit`/`offset`.
    pub no_limit: bool,
}

impl MetricsFilter {
    fn matches(&self, metric: &PersistedMetric) -> bool {
        (self.account_ids.is_empty() || self.account_ids.contains(&metric.account_id))
            && (self.types.is_empty() || self.types.contains(&metric.kind))
            && self.start_date.is_none_or(|start| metric.bucket_timestamp >= start)
            && self.end_date.is_none_or(|end| metric.bucket_timestamp <= end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsPage {
    pub data: Vec<PersistedMetric>,
    pub pagination: Pagination,
}

/// Applies `filter` to `records`, newest bucket first.
pub fn query_metrics(
    records: Vec<PersistedMetric>,
    filter: &MetricsFilter,
) -> Result<MetricsPage, QueryError> {
    let mut matched: Vec<PersistedMetric> =
        records.into_iter().filter(|m| filter.matches(m)).collect();
    matched.sort_by(|a, b| {
        b.bucket_timestamp
            .cmp(&a.bucket_timestamp)
            .then_with(|| a.account_id.cmp(&b.account_id))
            .then_with(|| a.kind.cmp(&b.kind))
    });
    let total = matched.len();

    if filter.no_limit {
        return Ok(MetricsPage {
            data: matched,
            pagination: Pagination {
                total,
                limit: None,
                offset: None,
                has_more: false,
            },
        });
    }

    let limit = filter.limit.unwrap_or(DEFAULT_LIMIT);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(QueryError::LimitOutOfRange { limit, max: MAX_LIMIT });
    }
    let offset = filter.offset.unwrap_or(0);

    let data: Vec<PersistedMetric> = matched.into_iter().skip(offset).take(limit).collect();
    let has_more = offset + data.len() < total;

    Ok(MetricsPage {
        data,
        pagination: Pagination {
            total,
            limit: Some(limit),
            offset: Some(offset),
            has_more,
        },
    })
}

/// Sorted, de-duplicated account ids.
pub fn distinct_accounts(records: &[PersistedMetric]) -> Vec<String> {
    records
        .iter()
        .map(|m| m.account_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Sorted, de-duplicated measurement types.
pub fn distinct_types(records: &[PersistedMetric]) -> Vec<String> {
    records
        .iter()
        .map(|m| m.kind.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BucketKey;
    use chrono::TimeZone;

    fn metric(h: u32, account: &str, kind: &str) -> PersistedMetric {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, h, 0, 0).unwrap();
        PersistedMetric::create(BucketKey::new(ts, account, kind), 10.0, 1, "alice")
    }

    fn sample() -> Vec<PersistedMetric> {
        vec![
            metric(0, "b", "api"),
            metric(4, "a", "api"),
            metric(8, "a", "db"),
            metric(12, "c", "api"),
            metric(16, "a", "api"),
        ]
    }

    #[test]
    fn test_default_query_is_newest_first() {
        let page = query_metrics(sample(), &MetricsFilter::default()).unwrap();
        let hours: Vec<u32> = page
            .data
            .iter()
            .map(|m| chrono::Timelike::hour(&m.bucket_timestamp))
            .collect();
        assert_eq!(hours, vec![16, 12, 8, 4, 0]);
        assert_eq!(page.pagination.total, 5);
        assert_eq!(page.pagination.limit, Some(100));
        assert!(!page.pagination.has_more);
    }

    #[test]
    fn test_filters_combine() {
        let filter = MetricsFilter {
            account_ids: vec!["a".into()],
            types: vec!["api".into()],
            start_date: Some(Utc.with_ymd_and_hms(2024, 3, 1, 4, 0, 0).unwrap()),
            end_date: Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()),
            ..MetricsFilter::default()
        };
        let page = query_metrics(sample(), &filter).unwrap();
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].account_id, "a");
        assert_eq!(page.data[0].kind, "api");
    }

    #[test]
    fn test_pagination() {
        let filter = MetricsFilter {
            limit: Some(2),
            offset: Some(2),
            ..MetricsFilter::default()
        };
        let page = query_metrics(sample(), &filter).unwrap();
        assert_eq!(page.data.len(), 2);
        assert!(page.pagination.has_more);

        let filter = MetricsFilter {
            limit: Some(2),
            offset: Some(4),
            ..MetricsFilter::default()
        };
        let page = query_metrics(sample(), &filter).unwrap();
        assert_eq!(page.data.len(), 1);
        assert!(!page.pagination.has_more);
    }

    #[test]
    fn test_no_limit_returns_everything() {
        let filter = MetricsFilter {
            no_limit: true,
            limit: Some(1),
            ..MetricsFilter::default()
        };
        let page = query_metrics(sample(), &filter).unwrap();
        assert_eq!(page.data.len(), 5);
        assert_eq!(page.pagination.limit, None);

        let json = serde_json::to_value(&page.pagination).unwrap();
        assert!(json.get("limit").is_none());
        assert_eq!(json["hasMore"], false);
    }

    #[test]
    fn test_limit_bounds() {
        for limit in [0, MAX_LIMIT + 1] {
            let filter = MetricsFilter {
                limit: Some(limit),
                ..MetricsFilter::default()
            };
            assert!(query_metrics(sample(), &filter).is_err());
        }
    }

    #[test]
    fn test_distinct_lists() {
        let records = sample();
        assert_eq!(distinct_accounts(&records), vec!["a", "b", "c"]);
        assert_eq!(distinct_types(&records), vec!["api", "db"]);
    }
}
