use anyhow::Result;
use async_trait::async_trait;

use crate::db::schema::TableSchema;
use crate::formats::Batch;

/// Destination of the ingested batches
#[async_trait]
pub trait TableSink: Send + Sync {
    /// Drop `table` if it exists and recreate it empty with the given layout
    async fn replace_table(&self, table: &str, schema: &TableSchema) -> Result<()>;

    /// Append every row of `batch` to `table`, in order
    ///
    /// Returns the number of rows written.
    async fn append_batch(&self, table: &str, batch: &Batch) -> Result<u64>;
}
