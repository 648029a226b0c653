//! CSV parsing into typed batches

pub mod coerce;
pub mod delimited;
pub mod reader;

pub use coerce::Value;
pub use delimited::ChunkedCsvReader;
pub use reader::{Batch, Compression, ReadOptions};
