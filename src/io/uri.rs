use anyhow::{Result, anyhow};
use std::path::PathBuf;
use url::Url;

use crate::config::DATASET_BASE_URL;

/// Build the download URL of the yellow taxi archive for a given month
///
/// No range check is made: a month outside 1..=12 yields a well-formed URL
/// for a file that does not exist, and the failure surfaces when it is fetched.
pub fn build_url(year: i32, month: u32) -> String {
    format!("{DATASET_BASE_URL}/yellow_tripdata_{year:04}-{month:02}.csv.gz")
}

/// Represents a parsed source URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceUri {
    Local(PathBuf),
    Http(Url),
}

impl SourceUri {
    /// Parse a URI string into a SourceUri
    pub fn parse(uri: &str) -> Result<Self> {
        // Try parsing as URL first
        if let Ok(url) = Url::parse(uri) {
            match url.scheme() {
                "http" | "https" => {
                    if url.host_str().is_none() {
                        return Err(anyhow!("HTTP URI missing host: {}", uri));
                    }
                    Ok(SourceUri::Http(url))
                }
                "file" => {
                    let path = url
                        .to_file_path()
                        .map_err(|_| anyhow!("Invalid file:// URI: {}", uri))?;
                    Ok(SourceUri::Local(path))
                }
                scheme => Err(anyhow!("Unsupported URI scheme: {}", scheme)),
            }
        } else {
            // Treat as local file path
            Ok(SourceUri::Local(PathBuf::from(uri)))
        }
    }

    /// Last path segment, used to infer the compression of the payload
    pub fn file_name(&self) -> Option<String> {
        match self {
            SourceUri::Local(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
            SourceUri::Http(url) => url
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .filter(|name| !name.is_empty())
                .map(str::to_string),
        }
    }
}

impl std::fmt::Display for SourceUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceUri::Local(path) => write!(f, "{}", path.display()),
            SourceUri::Http(url) => write!(f, "{}", url),
        }
    }
}
