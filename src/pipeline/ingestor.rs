use anyhow::{Context, Result};
use derive_builder::Builder;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::sink::TableSink;
use crate::formats::{ChunkedCsvReader, Compression, ReadOptions};
use crate::io::{ResourceFetcher, SourceUri};
use crate::telemetry::{IngestEvent, ProgressStats};

/// Configuration for an ingestion run
#[derive(Debug, Clone, Builder)]
pub struct IngestConfig {
    pub source: SourceUri,
    pub target_table: String,
    pub read_options: ReadOptions,
    #[builder(default = "false")]
    pub quiet: bool,
}

/// Result of a completed ingestion run
#[derive(Debug)]
pub struct IngestResult {
    pub run_id: String,
    pub batches_written: usize,
    pub rows_written: u64,
    pub duration: Duration,
    pub stats: ProgressStats,
}

/// The Ingestor drives the pipeline: fetch, parse, replace table, append.
pub struct Ingestor {
    fetcher: Box<dyn ResourceFetcher>,
    sink: Arc<dyn TableSink>,
}

impl Ingestor {
    /// Create a new Ingestor instance
    pub fn new(fetcher: Box<dyn ResourceFetcher>, sink: Arc<dyn TableSink>) -> Self {
        Self { fetcher, sink }
    }

    /// Run the complete ingestion
    ///
    /// Stages run strictly in sequence:
    /// 1. Fetch the source archive
    /// 2. Parse it lazily into batches
    /// 3. Before the first batch, drop and recreate the destination table
    /// 4. Append each batch in source order
    pub async fn run(&self, config: &IngestConfig) -> Result<IngestResult> {
        let start_time = Instant::now();
        let run_id = Uuid::new_v4().to_string();
        info!(run_id = %run_id, source = %config.source, table = %config.target_table, "starting ingestion");

        let mut stats = ProgressStats::new();

        // 1. Fetch
        let resource = self
            .fetcher
            .fetch()
            .await
            .with_context(|| format!("Failed to fetch {}", config.source))?;
        stats.update(&IngestEvent::Downloaded {
            bytes: resource.size_bytes,
        });

        // 2. Parse
        let compression = Compression::infer(config.source.file_name().as_deref());
        let reader = ChunkedCsvReader::from_resource(resource, compression, &config.read_options)
            .with_context(|| format!("Failed to open {} as CSV", config.source))?;
        debug!(columns = reader.headers().len(), ?compression, "reading source");

        let progress = Self::setup_progress(config.quiet);

        // 3 + 4. Replace once, then append every batch
        let mut table_initialized = false;
        for batch in reader {
            let batch = batch.with_context(|| {
                format!("Failed to read batch {} from source", stats.batches_written)
            })?;

            if !table_initialized {
                self.sink
                    .replace_table(&config.target_table, &batch.schema)
                    .await?;
                stats.update(&IngestEvent::TableReplaced);
                table_initialized = true;
            }

            let batch_start = Instant::now();
            let rows = self
                .sink
                .append_batch(&config.target_table, &batch)
                .await
                .with_context(|| format!("Failed to write batch {}", batch.index))?;

            stats.update(&IngestEvent::BatchWritten {
                rows,
                duration_ms: batch_start.elapsed().as_millis() as u64,
            });
            progress.inc(1);
            progress.set_message(format!("{} rows", stats.rows_written));
        }

        progress.finish_with_message(format!("{} rows", stats.rows_written));

        if stats.rows_written == 0 {
            warn!(
                table = %config.target_table,
                "source holds no data rows; destination table is empty"
            );
        }

        let duration = start_time.elapsed();
        info!(
            run_id = %run_id,
            batches = stats.batches_written,
            rows = stats.rows_written,
            "ingestion complete in {:.2}s",
            duration.as_secs_f64()
        );

        Ok(IngestResult {
            run_id,
            batches_written: stats.batches_written,
            rows_written: stats.rows_written,
            duration,
            stats,
        })
    }

    /// Spinner counting batches, hidden in quiet mode
    fn setup_progress(quiet: bool) -> ProgressBar {
        if quiet {
            return ProgressBar::hidden();
        }

        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner()
            .template("{spinner} ingesting: {pos} chunk [{elapsed_precise}, {per_sec}] {msg}")
        {
            bar.set_style(style);
        }
        bar.enable_steady_tick(Duration::from_millis(200));
        bar
    }
}
