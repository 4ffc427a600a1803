//! Streaming artifact downloader

use async_trait::async_trait;
use futures_util::StreamExt;
use selfup_core::traits::ArtifactDownloader;
use selfup_core::{Error, Result, UpdaterConfig};
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::{USER_AGENT, client_error, describe, ensure_timeout};

/// Downloads release assets chunk by chunk straight into the destination file
///
/// The configured timeout bounds connecting and each read, not the whole
/// transfer, so large assets on slow links still complete.
pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    pub fn from_config(config: &UpdaterConfig) -> Result<Self> {
        Self::new(config.http_timeout())
    }

    pub fn new(timeout: Duration) -> Result<Self> {
        ensure_timeout(timeout)?;

        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(client_error)?;

        Ok(Self { client })
    }

    async fn stream_to(&self, url: &str, destination: &Path) -> Result<u64> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/octet-stream")
            .send()
            .await
            .map_err(|e| Error::execution(format!("Download request failed: {}", describe(e))))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::execution(format!(
                "Download failed with HTTP {}",
                status.as_u16()
            )));
        }
        if let Some(length) = response.content_length() {
            debug!("Downloading {} bytes", length);
        }

        let mut file = File::create(destination).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|e| Error::execution(format!("Download interrupted: {}", describe(e))))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        file.flush().await?;
        file.sync_all().await?;
        Ok(written)
    }
}

#[async_trait]
impl ArtifactDownloader for HttpDownloader {
    async fn download(&self, url: &str, destination: &Path) -> Result<u64> {
        match self.stream_to(url, destination).await {
            Ok(bytes) => {
                info!("Downloaded {} bytes to {}", bytes, destination.display());
                Ok(bytes)
            }
            Err(e) => {
                // Never leave a truncated artifact for the wrapper to find
                if destination.exists()
                    && let Err(remove) = tokio::fs::remove_file(destination).await
                {
                    warn!(
                        "Failed to remove partial download {}: {}",
                        destination.display(),
                        remove
                    );
                }
                Err(e)
            }
        }
    }
}
