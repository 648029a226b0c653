//! High-level runner API for the taxi ingester.
//!
//! This module provides a simplified public interface that encapsulates the
//! setup of the connection pool, the fetcher, the reader and the ingestor.
//!
//! This is the primary API for external users and for the CLI.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use crate::db::pool::{self as db_pool, PoolArgsBuilder};
use crate::formats::ReadOptions;
use crate::io::{SourceUri, build_url, fetcher_for};
use crate::pipeline::{DatabaseWriter, IngestConfigBuilder, Ingestor};

pub use crate::config::{DEFAULT_CHUNKSIZE, DEFAULT_TARGET_TABLE};
pub use crate::db::PgTarget;

/// Arguments for running an ingestion
#[derive(Debug, Clone)]
pub struct IngestArgs {
    // Connection configuration
    pub target: PgTarget,

    // Source configuration
    pub year: i32,
    pub month: u32,
    /// Read from this URL or path instead of the one built from year and month
    pub source: Option<String>,
    pub target_table: String,

    // Chunking
    pub chunksize: usize,

    // Options
    pub quiet: bool,

    // Test-only: inject a pre-created pool (for SQLite testing)
    #[cfg(test)]
    pub test_pool: Option<crate::db::Pool>,
}

impl IngestArgs {
    /// The resolved source location
    pub fn source_location(&self) -> String {
        self.source
            .clone()
            .unwrap_or_else(|| build_url(self.year, self.month))
    }
}

/// Result of a completed ingestion
#[derive(Debug)]
pub struct IngestResult {
    pub run_id: String,
    pub source: String,
    pub batches_written: usize,
    pub rows_written: u64,
    pub bytes_downloaded: u64,
    pub duration: Duration,
    /// Batch write latency percentiles (p50, p90, p99) in milliseconds
    pub batch_latency_ms: (Option<u64>, Option<u64>, Option<u64>),
}

/// What a run would do, without touching the network or the database
#[derive(Debug, Clone)]
pub struct IngestPlan {
    pub source: String,
    pub target: String,
    pub target_table: String,
    pub chunksize: usize,
    /// Declared `(column, type)` pairs
    pub column_types: Vec<(String, String)>,
    pub date_columns: Vec<String>,
}

/// Resolve the arguments into a plan, validating them on the way
pub fn plan(args: &IngestArgs) -> Result<IngestPlan> {
    let source = args.source_location();
    SourceUri::parse(&source)?;
    let read_options = ReadOptions::yellow_taxi(args.chunksize)?;

    Ok(IngestPlan {
        source,
        target: args.target.redacted(),
        target_table: args.target_table.clone(),
        chunksize: read_options.chunksize,
        column_types: read_options
            .column_schema
            .iter()
            .map(|(name, ty)| (name.to_string(), ty.sql_type().to_postgres().to_string()))
            .collect(),
        date_columns: read_options.date_columns.iter().map(String::from).collect(),
    })
}

/// Run an ingestion with the specified arguments
///
/// This is the main entry point for loading one month of trip records. It
/// handles all the internal setup including:
/// - Resolving the source URL from the year and month
/// - Connecting to PostgreSQL before any download starts
/// - Fetching and decompressing the archive
/// - Replacing the destination table and appending every batch
///
/// # Example
///
/// ```no_run
/// use taxi_ingest::runner::{IngestArgs, PgTarget, run_ingest};
///
/// # async fn example() -> anyhow::Result<()> {
/// let args = IngestArgs {
///     target: PgTarget {
///         user: "root".to_string(),
///         password: "root".to_string(),
///         host: "localhost".to_string(),
///         port: 5432,
///         database: "ny_taxi".to_string(),
///     },
///     year: 2021,
///     month: 1,
///     source: None,
///     target_table: "yellow_taxi_data".to_string(),
///     chunksize: 100_000,
///     quiet: true,
/// };
///
/// let result = run_ingest(args).await?;
/// println!("Wrote {} rows in {:?}", result.rows_written, result.duration);
/// # Ok(())
/// # }
/// ```
pub async fn run_ingest(args: IngestArgs) -> Result<IngestResult> {
    let source_location = args.source_location();
    let source = SourceUri::parse(&source_location)
        .with_context(|| format!("Invalid source '{}'", source_location))?;
    let read_options = ReadOptions::yellow_taxi(args.chunksize)?;

    // Create connection pool (or use test pool if provided)
    #[cfg(test)]
    let pool = if let Some(test_pool) = args.test_pool {
        test_pool
    } else {
        let pool_args = PoolArgsBuilder::default()
            .target(args.target.clone())
            .build()?;
        db_pool::pool(pool_args).await?
    };

    #[cfg(not(test))]
    let pool = {
        let pool_args = PoolArgsBuilder::default()
            .target(args.target.clone())
            .build()?;
        db_pool::pool(pool_args).await?
    };

    let sink = Arc::new(DatabaseWriter::new(pool));
    let ingestor = Ingestor::new(fetcher_for(&source), sink);

    let config = IngestConfigBuilder::default()
        .source(source)
        .target_table(args.target_table)
        .read_options(read_options)
        .quiet(args.quiet)
        .build()?;

    let result = ingestor.run(&config).await?;

    // Convert to public IngestResult type
    Ok(IngestResult {
        run_id: result.run_id,
        source: source_location,
        batches_written: result.batches_written,
        rows_written: result.rows_written,
        bytes_downloaded: result.stats.bytes_downloaded,
        duration: result.duration,
        batch_latency_ms: result.stats.get_percentiles(),
    })
}
