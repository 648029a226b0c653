//! Configuration constants for the ingester
//!
//! This module centralizes the tunable parameters and fixed locations used
//! throughout the application.

// ============================================================================
// Source Configuration
// ============================================================================

/// Release directory holding the monthly yellow taxi CSV archives
pub const DATASET_BASE_URL: &str =
    "https://github.com/DataTalksClub/nyc-tlc-data/releases/download/yellow";

/// Emit a download progress log line every time this many bytes arrive
pub const DOWNLOAD_LOG_INTERVAL: u64 = 8 * 1024 * 1024; // 8 MB

/// Field values that are read as NULL in every column, whatever its type
pub const NA_VALUES: &[&str] = &[
    "", "NA", "N/A", "n/a", "NaN", "nan", "-NaN", "-nan", "null", "NULL", "None", "<NA>", "#N/A",
];

// ============================================================================
// Writer Configuration
// ============================================================================

/// Upper bound on bind parameters in a single INSERT statement
///
/// PostgreSQL caps a statement at 65535 parameters and SQLite defaults to
/// 32766. Staying below both lets one statement builder serve either driver.
pub const MAX_BIND_PARAMS: usize = 32_000;

// ============================================================================
// CLI Defaults
// ============================================================================

pub const DEFAULT_CHUNKSIZE: usize = 100_000;

pub const DEFAULT_TARGET_TABLE: &str = "yellow_taxi_data";
