//! Ingestion pipeline: drives batches from the reader into a table sink

pub mod ingestor;
pub mod sink;
pub mod writer;

pub use ingestor::{IngestConfigBuilder, Ingestor};
pub use writer::DatabaseWriter;
