use async_trait::async_trait;
use std::path::Path;

use crate::error::Result;

/// Downloads a release artifact to a local file
#[async_trait]
pub trait ArtifactDownloader: Send + Sync {
    /// Download `url` into `destination`, creating or truncating the file
    ///
    /// The parent directory already exists when this is called.
    /// Returns the number of bytes written.
    async fn download(&self, url: &str, destination: &Path) -> Result<u64>;
}
