//! Snapshot export to local files or S3.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use aws_sdk_s3::primitives::ByteStream;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;
use tracing::info;

use crate::output::write_metrics_csv;
use crate::types::PersistedMetric;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

/// Orders records by bucket, account and type so exports diff cleanly.
pub fn sorted(mut metrics: Vec<PersistedMetric>) -> Vec<PersistedMetric> {
    metrics.sort_by(|a, b| a.key().cmp(&b.key()));
    metrics
}

/// Gzip-compresses `bytes` with the default level.
pub fn gzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

/// Writes `metrics` to `path` in the requested format.
pub fn export_to_file(path: &Path, metrics: &[PersistedMetric], format: ExportFormat) -> Result<()> {
    match format {
        ExportFormat::Json => {
            let body = serde_json::to_vec_pretty(metrics)?;
            std::fs::write(path, body)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        ExportFormat::Csv => write_metrics_csv(path, metrics)?,
    }
    info!(path = %path.display(), records = metrics.len(), ?format, "Snapshot exported");
    Ok(())
}

/// Serializes a value to JSON and uploads it to S3, gzip-compressed when `compress` is set.
pub async fn write_json_to_s3(
    client: &aws_sdk_s3::Client,
    bucket: &str,
    key: &str,
    value: &impl Serialize,
    compress: bool,
) -> Result<()> {
    let json = serde_json::to_vec(value)?;
    let (body, key) = if compress {
        (gzip(&json)?, format!("{key}.gz"))
    } else {
        (json, key.to_string())
    };

    let mut request = client
        .put_object()
        .bucket(bucket)
        .key(&key)
        .body(ByteStream::from(body))
        .content_type("application/json");
    if compress {
        request = request.content_encoding("gzip");
    }
    request
        .send()
        .await
        .with_context(|| format!("S3 PutObject failed for s3://{bucket}/{key}"))?;

    info!(bucket, key = %key, "Snapshot uploaded to S3");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BucketKey;
    use chrono::{TimeZone, Utc};
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn metric(h: u32, account: &str) -> PersistedMetric {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, h, 0, 0).unwrap();
        PersistedMetric::create(BucketKey::new(ts, account, "api"), 10.0, 1, "alice")
    }

    #[test]
    fn test_gzip_round_trips() {
        let compressed = gzip(b"hello metrics").unwrap();
        let mut decoded = String::new();
        GzDecoder::new(&compressed[..])
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, "hello metrics");
    }

    #[test]
    fn test_sorted_orders_by_key() {
        let out = sorted(vec![metric(8, "b"), metric(4, "z"), metric(8, "a")]);
        let accounts: Vec<_> = out.iter().map(|m| m.account_id.as_str()).collect();
        assert_eq!(accounts, vec!["z", "a", "b"]);
    }

    #[test]
    fn test_export_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        let metrics = vec![metric(4, "a")];

        export_to_file(&path, &metrics, ExportFormat::Json).unwrap();

        let read: Vec<PersistedMetric> =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(read, metrics);
    }
}
