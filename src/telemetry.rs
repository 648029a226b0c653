/// Telemetry events emitted by the ingestion loop for progress tracking
#[derive(Debug, Clone)]
pub enum IngestEvent {
    /// The source archive has been fetched
    Downloaded { bytes: u64 },
    /// The destination table was dropped and recreated
    TableReplaced,
    /// A batch was appended to the destination table
    BatchWritten { rows: u64, duration_ms: u64 },
}

/// Statistics aggregated from telemetry events
#[derive(Debug, Default, Clone)]
pub struct ProgressStats {
    pub bytes_downloaded: u64,
    pub table_replaced: bool,
    pub batches_written: usize,
    pub rows_written: u64,
    pub batch_durations_ms: Vec<u64>,
}

impl ProgressStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update stats with a telemetry event
    pub fn update(&mut self, event: &IngestEvent) {
        match event {
            IngestEvent::Downloaded { bytes } => {
                self.bytes_downloaded = *bytes;
            }
            IngestEvent::TableReplaced => {
                self.table_replaced = true;
            }
            IngestEvent::BatchWritten { rows, duration_ms } => {
                self.batches_written += 1;
                self.rows_written += rows;
                self.batch_durations_ms.push(*duration_ms);
            }
        }
    }

    /// Calculate percentile from batch durations
    pub fn percentile(&self, p: f64) -> Option<u64> {
        if self.batch_durations_ms.is_empty() {
            return None;
        }

        let mut sorted = self.batch_durations_ms.clone();
        sorted.sort_unstable();

        let index = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
        let index = index.saturating_sub(1).min(sorted.len() - 1);

        Some(sorted[index])
    }

    /// Get p50, p90, p99 percentiles
    pub fn get_percentiles(&self) -> (Option<u64>, Option<u64>, Option<u64>) {
        (
            self.percentile(50.0),
            self.percentile(90.0),
            self.percentile(99.0),
        )
    }
}
