// # Release Source Traits
//
// Remote metadata the orchestrator depends on.
//
// ## Implementations
//
// - `selfup-github`: GitHub-style REST endpoints over reqwest
// - Tests: in-memory doubles with call counters
//
// Implementations are single-shot: one call is one network round-trip.
// Caching is owned by `CachedReleaseFeed`, the fail-open policy for the
// block list by `UpdateOrchestrator`. Neither belongs in a source.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{BlockedVersion, ChangelogEntry, Release};

/// Source of release descriptors and changelog entries
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Fetch the latest published release
    ///
    /// # Returns
    ///
    /// - `Ok(Release)`: The latest release descriptor
    /// - `Err(Error::UpdateFeed)`: Request failed or returned non-success
    async fn latest_release(&self) -> Result<Release>;

    /// Fetch the full changelog, in whatever order the feed returns it
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<ChangelogEntry>)`: All entries
    /// - `Err(Error::UpdateFeed)`: Request failed or returned non-success
    async fn changelog(&self) -> Result<Vec<ChangelogEntry>>;
}

/// Source of versions the vendor has blocked
#[async_trait]
pub trait BlockedVersionSource: Send + Sync {
    /// Fetch the current block list
    async fn blocked_versions(&self) -> Result<Vec<BlockedVersion>>;
}
