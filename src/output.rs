//! Output formatting and CSV export for results and stored metrics.

use anyhow::Result;
use csv::WriterBuilder;
use serde::Serialize;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info};

use crate::bucket::format_bucket_label;
use crate::types::PersistedMetric;

/// Writes `value` to stdout as pretty-printed JSON.
pub fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Logs one line per metric, labelled by bucket.
pub fn log_metrics(metrics: &[PersistedMetric]) {
    for metric in metrics {
        info!(
            bucket = %format_bucket_label(metric.bucket_timestamp),
            account_id = %metric.account_id,
            kind = %metric.kind,
            avg_duration = metric.avg_duration,
            record_count = metric.record_count,
            "Metric"
        );
    }
}

/// Writes metrics to a CSV file at `path`, replacing any existing file.
pub fn write_metrics_csv(path: &Path, metrics: &[PersistedMetric]) -> Result<()> {
    debug!(path = %path.display(), rows = metrics.len(), "Writing metrics CSV");

    let file = File::create(path)?;
    let mut writer = WriterBuilder::new().has_headers(true).from_writer(file);

    for metric in metrics {
        writer.serialize(metric)?;
    }
    writer.flush()?;

    Ok(())
}
