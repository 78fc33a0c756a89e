//! Loads CSV uploads from a local path or an HTTP(S) URL.

use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::debug;

/// Returns `true` if `source` should be fetched over HTTP.
pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Reads a CSV upload, enforcing the `.csv` extension and a size cap.
#[tracing::instrument(skip(max_bytes))]
pub async fn load_csv(source: &str, max_bytes: u64) -> Result<Vec<u8>> {
    let name = source.split(['?', '#']).next().unwrap_or(source);
    if !name.to_ascii_lowercase().ends_with(".csv") {
        bail!("only CSV files are allowed: {source}");
    }

    let bytes = if is_url(source) {
        fetch_bytes(source, max_bytes).await?
    } else {
        read_file(Path::new(source), max_bytes).await?
    };
    debug!(bytes = bytes.len(), "CSV loaded");
    Ok(bytes)
}

async fn read_file(path: &Path, max_bytes: u64) -> Result<Vec<u8>> {
    let len = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("cannot open {}", path.display()))?
        .len();
    check_size(len, max_bytes)?;
    tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))
}

/// Downloads `url`, failing on non-success status or an oversized body.
pub async fn fetch_bytes(url: &str, max_bytes: u64) -> Result<Vec<u8>> {
    let resp = reqwest::Client::new()
        .get(url)
        .send()
        .await
        .with_context(|| format!("request to {url} failed"))?
        .error_for_status()?;

    if let Some(len) = resp.content_length() {
        check_size(len, max_bytes)?;
    }
    let bytes = resp.bytes().await?;
    check_size(bytes.len() as u64, max_bytes)?;
    Ok(bytes.to_vec())
}

fn check_size(len: u64, max_bytes: u64) -> Result<()> {
    if len > max_bytes {
        bail!("file size {len} bytes exceeds the {max_bytes} byte limit");
    }
    Ok(())
}
