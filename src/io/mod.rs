//! I/O layer: locating and fetching the source archive

pub mod fetch;
pub mod uri;

pub use fetch::{FetchedResource, ResourceFetcher, fetcher_for};
pub use uri::{SourceUri, build_url};
