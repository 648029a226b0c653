use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use url::Url;

use super::uri::SourceUri;
use crate::config::DOWNLOAD_LOG_INTERVAL;

/// A fetched resource, readable from its first byte
///
/// Remote payloads are spooled to an anonymous temp file that the OS removes
/// once the handle is dropped.
#[derive(Debug)]
pub struct FetchedResource {
    pub file: File,
    pub size_bytes: u64,
}

/// Abstraction over where the compressed CSV comes from
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    /// Retrieve the whole resource
    async fn fetch(&self) -> Result<FetchedResource>;
}

/// Create the fetcher matching a source URI
pub fn fetcher_for(source: &SourceUri) -> Box<dyn ResourceFetcher> {
    match source {
        SourceUri::Local(path) => Box::new(LocalFileFetcher::new(path)),
        SourceUri::Http(url) => Box::new(HttpFetcher::new(Client::new(), url.clone())),
    }
}

/// Fetcher for files already on disk
#[derive(Clone)]
pub struct LocalFileFetcher {
    file_path: PathBuf,
}

impl LocalFileFetcher {
    pub fn new(file_path: impl AsRef<Path>) -> Self {
        Self {
            file_path: file_path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl ResourceFetcher for LocalFileFetcher {
    async fn fetch(&self) -> Result<FetchedResource> {
        let file = tokio::fs::File::open(&self.file_path)
            .await
            .with_context(|| format!("Failed to open {}", self.file_path.display()))?;
        let size_bytes = file.metadata().await?.len();

        Ok(FetchedResource {
            file: file.into_std().await,
            size_bytes,
        })
    }
}

/// Fetcher for HTTP(S) resources
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    url: Url,
}

impl HttpFetcher {
    pub fn new(client: Client, url: Url) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl ResourceFetcher for HttpFetcher {
    async fn fetch(&self) -> Result<FetchedResource> {
        info!(url = %self.url, "downloading");

        let mut response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .with_context(|| format!("Failed to request {}", self.url))?
            .error_for_status()
            .with_context(|| format!("Server rejected request for {}", self.url))?;

        let spool = tempfile::tempfile().context("Failed to create download spool file")?;
        let mut writer = tokio::fs::File::from_std(spool);

        let mut size_bytes = 0u64;
        let mut next_report = DOWNLOAD_LOG_INTERVAL;
        while let Some(chunk) = response
            .chunk()
            .await
            .with_context(|| format!("Failed while downloading {}", self.url))?
        {
            writer.write_all(&chunk).await?;
            size_bytes += chunk.len() as u64;

            if size_bytes >= next_report {
                debug!(bytes = size_bytes, "download progress");
                next_report += DOWNLOAD_LOG_INTERVAL;
            }
        }
        writer.flush().await?;

        let mut file = writer.into_std().await;
        file.seek(SeekFrom::Start(0))?;

        info!(bytes = size_bytes, "download complete");

        Ok(FetchedResource { file, size_bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_local_fetch_reads_from_start() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "a,b\n1,2\n").unwrap();
        temp_file.flush().unwrap();

        let fetcher = LocalFileFetcher::new(temp_file.path());
        let mut fetched = fetcher.fetch().await.unwrap();
        assert_eq!(fetched.size_bytes, 8);

        let mut contents = String::new();
        fetched.file.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "a,b\n1,2\n");
    }

    #[tokio::test]
    async fn test_local_fetch_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let fetcher = LocalFileFetcher::new(dir.path().join("absent.csv.gz"));
        let err = fetcher.fetch().await.unwrap_err();
        assert!(format!("{:#}", err).contains("absent.csv.gz"));
    }

    #[tokio::test]
    async fn test_http_fetch_connection_refused() {
        // Port 1 is reserved and never has a listener in the test environment
        let url = Url::parse("http://127.0.0.1:1/yellow_tripdata_2021-01.csv.gz").unwrap();
        let fetcher = HttpFetcher::new(Client::new(), url);
        assert!(fetcher.fetch().await.is_err());
    }
}
