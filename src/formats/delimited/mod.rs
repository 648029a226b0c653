pub mod reader;

pub use reader::ChunkedCsvReader;
