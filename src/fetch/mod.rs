mod basic;
mod client;

pub use basic::BasicClient;
pub use client::HttpClient;

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{MobilityError, Result};

/// GETs `url` and returns the body. Non-2xx responses are errors.
pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Bytes> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| MobilityError::Config(format!("invalid url '{url}': {e}")))?;
    let req = reqwest::Request::new(reqwest::Method::GET, parsed);

    let resp = client.execute(req).await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(MobilityError::FetchStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(resp.bytes().await?)
}

/// Makes a remote file available at a local path.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, local_path: &Path) -> Result<()>;
}

/// Downloads over HTTP into the local cache.
///
/// A non-empty file already at `local_path` is reused without any request.
/// Downloads land in a `.part` sibling first and are renamed into place, so
/// an interrupted transfer never leaves a truncated cache entry.
pub struct HttpFetcher<C: HttpClient = BasicClient> {
    client: C,
}

impl HttpFetcher<BasicClient> {
    pub fn new() -> Self {
        Self::with_client(BasicClient::new())
    }
}

impl Default for HttpFetcher<BasicClient> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: HttpClient> HttpFetcher<C> {
    pub fn with_client(client: C) -> Self {
        Self { client }
    }
}

fn part_path(local_path: &Path) -> PathBuf {
    let mut name = local_path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

#[async_trait]
impl<C: HttpClient> Fetcher for HttpFetcher<C> {
    #[tracing::instrument(skip(self, local_path), fields(path = %local_path.display()))]
    async fn fetch(&self, url: &str, local_path: &Path) -> Result<()> {
        if let Ok(meta) = tokio::fs::metadata(local_path).await {
            if meta.len() > 0 {
                debug!("Already downloaded, skipping");
                return Ok(());
            }
            debug!("Replacing empty cached file");
        }

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let fetch_start = std::time::Instant::now();
        let bytes = fetch_bytes(&self.client, url).await?;
        let part = part_path(local_path);
        tokio::fs::write(&part, &bytes).await?;
        tokio::fs::rename(&part, local_path).await?;

        info!(
            bytes = bytes.len(),
            elapsed_ms = fetch_start.elapsed().as_millis() as u64,
            "Downloaded source file"
        );
        Ok(())
    }
}
