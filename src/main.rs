use clap::Parser;
use taxi_ingest::runner::{
    DEFAULT_CHUNKSIZE, DEFAULT_TARGET_TABLE, IngestArgs, PgTarget, plan, run_ingest,
};

/// Ingest one month of NYC yellow taxi trip records into PostgreSQL
#[derive(Parser, Clone)]
#[command(version, about)]
struct Args {
    /// Database user
    #[arg(long, default_value = "root")]
    pg_user: String,

    /// Database password
    #[arg(long, default_value = "root")]
    pg_pass: String,

    /// Database host
    #[arg(long, default_value = "localhost")]
    pg_host: String,

    /// Database port
    #[arg(long, default_value_t = 5432)]
    pg_port: u16,

    /// Database name
    #[arg(long, default_value = "ny_taxi")]
    pg_db: String,

    /// Year of the trip records
    #[arg(long, default_value_t = 2021)]
    year: i32,

    /// Month of the trip records (1-12)
    #[arg(long, default_value_t = 1)]
    month: u32,

    /// Destination table, dropped and recreated on every run
    #[arg(long, default_value = DEFAULT_TARGET_TABLE)]
    target_table: String,

    /// Rows per batch
    #[arg(long, default_value_t = DEFAULT_CHUNKSIZE)]
    chunksize: usize,

    /// Read from this URL or local path instead of the monthly archive URL
    #[arg(long)]
    source: Option<String>,

    /// Show the resolved configuration without downloading or writing anything
    #[arg(long)]
    dry_run: bool,

    /// Quiet mode - minimal output, only show summary
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing(args.quiet);

    let dry_run = args.dry_run;
    let ingest_args = IngestArgs {
        target: PgTarget {
            user: args.pg_user,
            password: args.pg_pass,
            host: args.pg_host,
            port: args.pg_port,
            database: args.pg_db,
        },
        year: args.year,
        month: args.month,
        source: args.source,
        target_table: args.target_table,
        chunksize: args.chunksize,
        quiet: args.quiet,
    };

    let plan = plan(&ingest_args)?;

    if !ingest_args.quiet {
        println!("NYC Taxi Ingest");
        println!("===============");
        println!("Source: {}", plan.source);
        println!("Target: {}", plan.target);
        println!("Table: {}", plan.target_table);
        println!("Chunk size: {}", plan.chunksize);
        println!();
    }

    // Handle dry-run mode
    if dry_run {
        println!("DRY RUN MODE - Nothing will be downloaded or written");
        println!();
        println!("Declared column types:");
        for (column, sql_type) in &plan.column_types {
            println!("  {}: {}", column, sql_type);
        }
        println!("Date columns:");
        for column in &plan.date_columns {
            println!("  {}", column);
        }
        println!();
        println!("To execute, run without --dry-run");
        return Ok(());
    }

    let result = run_ingest(ingest_args).await?;

    println!();
    println!("Ingest Summary");
    println!("==============");
    println!("Run ID: {}", result.run_id);
    println!("Source: {}", result.source);
    println!("Bytes downloaded: {}", result.bytes_downloaded);
    println!("Batches written: {}", result.batches_written);
    println!("Rows written: {}", result.rows_written);
    println!("Duration: {:.2}s", result.duration.as_secs_f64());
    println!(
        "Throughput: {:.2} rows/sec",
        result.rows_written as f64 / result.duration.as_secs_f64().max(f64::EPSILON)
    );
    if let (Some(p50), Some(p90), Some(p99)) = result.batch_latency_ms {
        println!("Batch latency: p50={}ms p90={}ms p99={}ms", p50, p90, p99);
    }

    Ok(())
}

/// Initialize tracing based on quiet mode; `RUST_LOG` takes precedence
fn init_tracing(quiet: bool) {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if quiet {
            EnvFilter::new("taxi_ingest=warn,sqlx=off")
        } else {
            EnvFilter::new("taxi_ingest=info,sqlx=off")
        }
    });
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
