//! Cached release feed
//!
//! [`CachedReleaseFeed`] sits between the orchestrator and a
//! [`ReleaseSource`] and bounds how often the remote repository is asked for
//! its latest release.
//!
//! ## Caching
//!
//! ```text
//! caller ─┐
//! caller ─┼─► lock ─► fresh entry? ─yes─► clone
//! caller ─┘              │
//!                        no
//!                        ▼
//!               source.latest_release() ─ok─► store (release, now + ttl)
//!                        │
//!                       err ─► UpdateFeed error, entry untouched
//! ```
//!
//! The lock is held across the fetch, so callers arriving while a refresh
//! is in flight wait for it and then find a fresh entry. At most one fetch
//! runs per expiry window. An expired entry is never served, not even when
//! the refresh fails.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{ChangelogEntry, Release};
use crate::traits::ReleaseSource;

/// Default time-to-live of the latest release
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(15 * 60);

struct CacheEntry {
    release: Release,
    expires_at: Instant,
}

/// Release feed with single-flight, expiring memoization of the latest release
pub struct CachedReleaseFeed {
    source: Arc<dyn ReleaseSource>,
    ttl: Duration,
    cache: Mutex<Option<CacheEntry>>,
}

impl CachedReleaseFeed {
    /// Wrap `source` with the default 15 minute TTL
    pub fn new(source: Arc<dyn ReleaseSource>) -> Self {
        Self::with_ttl(source, DEFAULT_CACHE_TTL)
    }

    /// Wrap `source` with a custom TTL
    pub fn with_ttl(source: Arc<dyn ReleaseSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            cache: Mutex::new(None),
        }
    }

    /// Latest release, from cache when fresh
    pub async fn latest_release(&self) -> Result<Release> {
        let mut cache = self.cache.lock().await;

        if let Some(entry) = cache.as_ref()
            && Instant::now() < entry.expires_at
        {
            return Ok(entry.release.clone());
        }

        debug!("Latest release cache empty or expired, fetching");
        let release = self.source.latest_release().await.map_err(into_feed_error)?;
        *cache = Some(CacheEntry {
            release: release.clone(),
            expires_at: Instant::now() + self.ttl,
        });
        Ok(release)
    }

    /// Full changelog, newest version first
    ///
    /// Never cached.
    pub async fn all_changes(&self) -> Result<Vec<ChangelogEntry>> {
        let entries = self.source.changelog().await.map_err(into_feed_error)?;

        let mut keyed = entries
            .into_iter()
            .map(|entry| entry.parsed_version().map(|v| (v, entry)))
            .collect::<Result<Vec<_>>>()?;
        keyed.sort_by(|(a, _), (b, _)| b.cmp(a));

        Ok(keyed.into_iter().map(|(_, entry)| entry).collect())
    }

    /// Drop the cached release so the next call refetches
    pub async fn invalidate(&self) {
        *self.cache.lock().await = None;
    }

    /// Configured time-to-live
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

/// Sources are expected to report feed errors already; anything else is wrapped
fn into_feed_error(err: Error) -> Error {
    match err {
        Error::UpdateFeed(_) => err,
        other => Error::feed(other.to_string()),
    }
}
