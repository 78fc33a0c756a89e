use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{Instrument, debug, info, warn};

use crate::bucket::{bucket_start, is_aligned};
use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::parser::parse_csv;
use crate::pipeline::aggregate::aggregate_rows;
use crate::pipeline::merge::{MergeValue, merge};
use crate::pipeline::stage::Stage;
use crate::store::MetricStore;
use crate::types::{
    AggregatedMetric, BucketKey, PersistedMetric, PreAggregatedEntry, PreAggregatedPayload,
    ProcessingResult, ProcessingStats, UploadSummary,
};
use crate::validate::{RowOutcome, parse_timestamp, validate_row};

/// Number reported for the first data row; the header counts as row 1.
const FIRST_DATA_ROW: usize = 2;

/// Whether a merge created a record or updated an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Updated,
}

/// Validates and aggregates a CSV document without touching any store.
pub fn process_csv(bytes: &[u8], config: &IngestConfig) -> Result<ProcessingResult> {
    let mut stage = Stage::Reading;
    run_csv(bytes, config, &mut stage)
}

fn run_csv(bytes: &[u8], config: &IngestConfig, stage: &mut Stage) -> Result<ProcessingResult> {
    let rows = match parse_csv(bytes) {
        Ok(rows) => rows,
        Err(e) => {
            stage.advance(Stage::Aborted)?;
            warn!(error = %e, "CSV could not be parsed");
            return Ok(ProcessingResult::failure(vec![format!(
                "Failed to parse CSV: {e}"
            )]));
        }
    };

    stage.advance(Stage::Validating)?;
    let total_rows = rows.len();
    let mut valid = Vec::with_capacity(total_rows);
    let mut errors = Vec::new();

    for (index, raw) in rows.iter().enumerate() {
        match validate_row(raw, index + FIRST_DATA_ROW, config) {
            RowOutcome::Valid(row) => valid.push(row),
            RowOutcome::Filtered => {}
            RowOutcome::Invalid(err) => errors.push(err),
        }
    }

    if errors.len() > config.max_row_errors {
        stage.advance(Stage::Aborted)?;
        warn!(
            total_rows,
            errors = errors.len(),
            limit = config.max_row_errors,
            "Too many invalid rows, aborting file"
        );
        return Ok(ProcessingResult::failure(
            errors
                .iter()
                .take(config.max_row_errors)
                .map(ToString::to_string)
                .collect(),
        ));
    }

    stage.advance(Stage::Aggregating)?;
    let aggregated = aggregate_rows(&valid);
    let stats = ProcessingStats {
        total_rows,
        valid_rows: valid.len(),
        filtered_rows: total_rows - valid.len() - errors.len(),
        aggregated_groups: aggregated.len(),
    };
    info!(
        total_rows = stats.total_rows,
        valid_rows = stats.valid_rows,
        filtered_rows = stats.filtered_rows,
        invalid_rows = errors.len(),
        groups = stats.aggregated_groups,
        "CSV aggregated"
    );

    Ok(ProcessingResult {
        success: true,
        aggregated_data: Some(aggregated),
        stats: Some(stats),
        errors: Some(errors.iter().map(ToString::to_string).collect()),
    })
}

/// Runs uploads through the pipeline and merges the results into a store.
pub struct Ingestor<S> {
    store: Arc<S>,
    config: IngestConfig,
}

impl<S: MetricStore + 'static> Ingestor<S> {
    pub fn new(store: Arc<S>, config: IngestConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Raw CSV entry point: validate, aggregate, then merge every group.
    ///
    /// A failed [`ProcessingResult`] (unreadable CSV, too many bad rows) is
    /// returned as-is with nothing written.
    #[tracing::instrument(skip(self, bytes), fields(bytes = bytes.len()))]
    pub async fn ingest_csv(&self, bytes: &[u8], uploaded_by: &str) -> Result<UploadSummary> {
        let mut stage = Stage::Reading;
        let mut result = run_csv(bytes, &self.config, &mut stage)?;
        if stage == Stage::Aborted {
            return Ok(UploadSummary::unwritten(result));
        }

        stage.advance(Stage::Merging)?;
        let groups = result.aggregated_data.take().unwrap_or_default();
        let (inserted, updated) = self.merge_all(&groups, uploaded_by).await?;
        result.aggregated_data = Some(groups);
        stage.advance(Stage::Done)?;

        Ok(UploadSummary {
            result,
            inserted,
            updated,
        })
    }

    /// Pre-aggregated entry point: goes straight to merging the caller's groups.
    ///
    /// Malformed entries are reported as `Entry N: ...` and skipped. Entries
    /// sharing a key are combined first so each key is written once.
    #[tracing::instrument(skip(self, payload), fields(entries = payload.aggregated_data.len()))]
    pub async fn ingest_aggregated(
        &self,
        payload: PreAggregatedPayload,
        uploaded_by: &str,
    ) -> Result<UploadSummary> {
        let mut stage = Stage::Reading;
        let mut errors = Vec::new();
        let mut combined: BTreeMap<BucketKey, MergeValue> = BTreeMap::new();

        for (index, entry) in payload.aggregated_data.iter().enumerate() {
            match check_entry(entry) {
                Ok((key, value)) => {
                    let previous = combined.get(&key).copied();
                    combined.insert(key, merge(value, previous));
                }
                Err(message) => errors.push(format!("Entry {}: {message}", index + 1)),
            }
        }

        stage.advance(Stage::Merging)?;
        let groups: Vec<AggregatedMetric> = combined
            .into_iter()
            .map(|(key, value)| AggregatedMetric {
                bucket_timestamp: key.bucket_start,
                account_id: key.account_id,
                kind: key.kind,
                avg_duration: value.avg_duration,
                record_count: value.record_count,
            })
            .collect();
        let (inserted, updated) = self.merge_all(&groups, uploaded_by).await?;
        stage.advance(Stage::Done)?;

        let stats = payload.stats.unwrap_or(ProcessingStats {
            aggregated_groups: groups.len(),
            ..ProcessingStats::default()
        });

        Ok(UploadSummary {
            result: ProcessingResult {
                success: true,
                aggregated_data: Some(groups),
                stats: Some(stats),
                errors: Some(errors),
            },
            inserted,
            updated,
        })
    }

    /// Merges every group concurrently, one task per key, then flushes the store.
    ///
    /// Every task is awaited and the store flushed even when a merge fails, so
    /// keys that did merge are durable; the first failure is returned after.
    async fn merge_all(
        &self,
        groups: &[AggregatedMetric],
        uploaded_by: &str,
    ) -> Result<(usize, usize)> {
        let semaphore = Arc::new(Semaphore::new(self.config.merge_concurrency.max(1)));
        let mut tasks = Vec::with_capacity(groups.len());

        for group in groups {
            let store = self.store.clone();
            let semaphore = semaphore.clone();
            let group = group.clone();
            let uploaded_by = uploaded_by.to_string();
            let span = tracing::debug_span!("merge_group", key = %group.key());

            tasks.push(tokio::spawn(
                async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|e| IngestError::Store(e.into()))?;
                    merge_group(store.as_ref(), &group, &uploaded_by)
                        .await
                        .map_err(IngestError::Store)
                }
                .instrument(span),
            ));
        }

        let mut inserted = 0;
        let mut updated = 0;
        let mut first_error = None;
        for task in tasks {
            match task.await.map_err(IngestError::from).and_then(|r| r) {
                Ok(MergeOutcome::Inserted) => inserted += 1,
                Ok(MergeOutcome::Updated) => updated += 1,
                Err(e) => {
                    warn!(error = %e, "Merge failed");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        let flushed = self.store.flush().await.map_err(IngestError::Store);
        if let Some(e) = first_error {
            if let Err(flush_err) = flushed {
                warn!(error = %flush_err, "Flush after failed merge also failed");
            }
            return Err(e);
        }
        flushed?;
        info!(inserted, updated, "Groups merged into store");
        Ok((inserted, updated))
    }
}

/// Read-merge-write for one key while holding that key's lock.
pub async fn merge_group<S: MetricStore + ?Sized>(
    store: &S,
    group: &AggregatedMetric,
    uploaded_by: &str,
) -> anyhow::Result<MergeOutcome> {
    let key = group.key();
    let _guard = store.lock(&key).await;

    let incoming = MergeValue::from(group);
    match store.lookup(&key).await? {
        Some(mut existing) => {
            let merged = merge(incoming, Some(MergeValue::from(&existing)));
            debug!(
                previous_avg = existing.avg_duration,
                previous_count = existing.record_count,
                avg = merged.avg_duration,
                count = merged.record_count,
                "Updating metric"
            );
            existing.avg_duration = merged.avg_duration;
            existing.record_count = merged.record_count;
            store.upsert(existing).await?;
            Ok(MergeOutcome::Updated)
        }
        None => {
            let merged = merge(incoming, None);
            debug!(avg = merged.avg_duration, count = merged.record_count, "Inserting metric");
            store
                .upsert(PersistedMetric::create(
                    key,
                    merged.avg_duration,
                    merged.record_count,
                    uploaded_by,
                ))
                .await?;
            Ok(MergeOutcome::Inserted)
        }
    }
}

fn check_entry(entry: &PreAggregatedEntry) -> std::result::Result<(BucketKey, MergeValue), String> {
    let ts = parse_timestamp(&entry.bucket_timestamp)
        .ok_or_else(|| format!("Invalid bucket timestamp: {}", entry.bucket_timestamp))?;
    if entry.account_id.is_empty() {
        return Err("Account ID is required".to_string());
    }
    if entry.kind.is_empty() {
        return Err("Measurement type is required".to_string());
    }
    if !entry.avg_duration.is_finite() || entry.avg_duration <= 0.0 {
        return Err(format!("Invalid average duration: {}", entry.avg_duration));
    }
    if entry.record_count == 0 {
        return Err("Record count must be positive".to_string());
    }

    if !is_aligned(ts) {
        warn!(
            bucket_timestamp = %entry.bucket_timestamp,
            "Bucket timestamp not on a 4-hour boundary, realigning"
        );
    }

    Ok((
        BucketKey::new(bucket_start(ts), &entry.account_id, &entry.kind),
        MergeValue::new(entry.avg_duration, entry.record_count),
    ))
}
