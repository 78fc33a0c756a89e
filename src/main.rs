//! CLI entry point for perf_bucketer.
//!
//! Provides subcommands for ingesting raw CSV measurements or pre-aggregated
//! payloads into the metric store, querying stored buckets, and exporting
//! snapshots locally or to S3.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use perf_bucketer::config::IngestConfig;
use perf_bucketer::export::{ExportFormat, export_to_file, sorted, write_json_to_s3};
use perf_bucketer::output::{log_metrics, print_json};
use perf_bucketer::pipeline::{Ingestor, process_csv};
use perf_bucketer::query::{MetricsFilter, distinct_accounts, distinct_types, query_metrics};
use perf_bucketer::source::load_csv;
use perf_bucketer::store::{JsonFileStore, MetricStore};
use perf_bucketer::types::{PreAggregatedPayload, UploadSummary};
use perf_bucketer::validate::parse_timestamp;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "perf_bucketer")]
#[command(about = "Aggregate performance measurements into 4-hour UTC buckets", long_about = None)]
struct Cli {
    /// JSON file backing the metric store
    #[arg(long, global = true, env = "PERF_STORE_PATH", default_value = "data/metrics.json")]
    store: PathBuf,

    /// Optional JSON file overriding ingestion limits
    #[arg(long, global = true, env = "PERF_CONFIG_PATH")]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate, aggregate and merge a raw CSV file into the store
    Ingest {
        /// Path to a CSV file or URL to fetch
        #[arg(value_name = "FILE_OR_URL")]
        source: String,

        /// User recorded as the uploader of newly created buckets
        #[arg(short, long, env = "PERF_UPLOADED_BY")]
        uploaded_by: String,
    },
    /// Merge a pre-aggregated JSON payload into the store
    IngestAggregated {
        /// JSON file with `aggregatedData` and `stats`
        #[arg(value_name = "JSON_FILE")]
        payload: PathBuf,

        /// User recorded as the uploader of newly created buckets
        #[arg(short, long, env = "PERF_UPLOADED_BY")]
        uploaded_by: String,
    },
    /// Validate and aggregate a CSV file without writing anything
    Process {
        /// Path to a CSV file or URL to fetch
        #[arg(value_name = "FILE_OR_URL")]
        source: String,
    },
    /// Query stored metrics, newest bucket first
    Metrics {
        /// Only these account ids (comma separated)
        #[arg(short, long = "account", value_delimiter = ',')]
        accounts: Vec<String>,

        /// Only these measurement types (comma separated)
        #[arg(short, long = "type", value_delimiter = ',')]
        types: Vec<String>,

        /// Earliest bucket timestamp (inclusive)
        #[arg(long, value_parser = parse_date)]
        start: Option<DateTime<Utc>>,

        /// Latest bucket timestamp (inclusive)
        #[arg(long, value_parser = parse_date)]
        end: Option<DateTime<Utc>>,

        /// Page size (1-1000)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Records to skip
        #[arg(short, long)]
        offset: Option<usize>,

        /// Return every match, ignoring limit and offset
        #[arg(long, default_value_t = false)]
        all: bool,

        /// Log one line per metric instead of printing JSON
        #[arg(long, default_value_t = false)]
        log: bool,
    },
    /// List distinct account ids in the store
    Accounts,
    /// List distinct measurement types in the store
    Types,
    /// Export the full store snapshot to a file and/or S3
    Export {
        /// Local file to write
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Format of the local file
        #[arg(short, long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,

        /// S3 bucket to upload the JSON snapshot to (e.g., "my-bucket")
        #[arg(long)]
        s3_bucket: Option<String>,

        /// Object key for the S3 upload
        #[arg(long, default_value = "metrics/snapshot.json")]
        s3_key: String,

        /// Gzip compress the S3 upload
        #[arg(long, default_value_t = false)]
        gzip: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/perf_bucketer.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("perf_bucketer.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse().unwrap()));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse().unwrap()));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => IngestConfig::load(path)?,
        None => IngestConfig::default(),
    };

    match cli.command {
        Commands::Ingest {
            source,
            uploaded_by,
        } => {
            let bytes = load_csv(&source, config.max_file_bytes).await?;
            let ingestor = open_ingestor(&cli.store, config).await?;
            let summary = ingestor.ingest_csv(&bytes, &uploaded_by).await?;
            report_upload(&summary)?;
        }
        Commands::IngestAggregated {
            payload,
            uploaded_by,
        } => {
            let body = tokio::fs::read(&payload)
                .await
                .with_context(|| format!("failed to read {}", payload.display()))?;
            let payload: PreAggregatedPayload =
                serde_json::from_slice(&body).context("invalid aggregated data format")?;
            let ingestor = open_ingestor(&cli.store, config).await?;
            let summary = ingestor.ingest_aggregated(payload, &uploaded_by).await?;
            report_upload(&summary)?;
        }
        Commands::Process { source } => {
            let bytes = load_csv(&source, config.max_file_bytes).await?;
            let result = process_csv(&bytes, &config)?;
            print_json(&result)?;
            if !result.success {
                bail!("CSV rejected with {} error(s)", result.error_count());
            }
        }
        Commands::Metrics {
            accounts,
            types,
            start,
            end,
            limit,
            offset,
            all,
            log,
        } => {
            let store = JsonFileStore::open(&cli.store).await?;
            let filter = MetricsFilter {
                account_ids: accounts,
                types,
                start_date: start,
                end_date: end,
                limit,
                offset,
                no_limit: all,
            };
            let page = query_metrics(store.snapshot().await?, &filter)?;
            if log {
                log_metrics(&page.data);
                info!(
                    total = page.pagination.total,
                    has_more = page.pagination.has_more,
                    "Metrics page"
                );
            } else {
                print_json(&page)?;
            }
        }
        Commands::Accounts => {
            let store = JsonFileStore::open(&cli.store).await?;
            print_json(&distinct_accounts(&store.snapshot().await?))?;
        }
        Commands::Types => {
            let store = JsonFileStore::open(&cli.store).await?;
            print_json(&distinct_types(&store.snapshot().await?))?;
        }
        Commands::Export {
            output,
            format,
            s3_bucket,
            s3_key,
            gzip,
        } => {
            if output.is_none() && s3_bucket.is_none() {
                bail!("nothing to do: pass --output and/or --s3-bucket");
            }
            let store = JsonFileStore::open(&cli.store).await?;
            let metrics = sorted(store.snapshot().await?);

            if let Some(path) = output {
                export_to_file(&path, &metrics, format)?;
            }
            if let Some(bucket) = s3_bucket {
                let aws = aws_config::load_from_env().await;
                let s3 = aws_sdk_s3::Client::new(&aws);
                write_json_to_s3(&s3, &bucket, &s3_key, &metrics, gzip).await?;
            }
        }
    }

    Ok(())
}

async fn open_ingestor(path: &Path, config: IngestConfig) -> Result<Ingestor<JsonFileStore>> {
    let store = JsonFileStore::open(path).await?;
    Ok(Ingestor::new(Arc::new(store), config))
}

/// Prints the upload summary and turns a rejected upload into a failing exit.
fn report_upload(summary: &UploadSummary) -> Result<()> {
    print_json(summary)?;
    let result = &summary.result;
    if !result.success {
        bail!("upload rejected with {} error(s)", result.error_count());
    }
    if result.error_count() > 0 {
        warn!(
            warnings = result.error_count(),
            "Upload accepted with skipped rows"
        );
    }
    info!(
        inserted = summary.inserted,
        updated = summary.updated,
        "Upload processed successfully"
    );
    Ok(())
}

fn parse_date(raw: &str) -> Result<DateTime<Utc>, String> {
    parse_timestamp(raw).ok_or_else(|| format!("invalid date: {raw}"))
}
