// # GitHub Release Feed
//
// This crate provides the HTTP collaborators of the selfup orchestrator
// for a GitHub-style release repository.
//
// ## Components
//
// - `GithubReleaseFeed`: `ReleaseSource` + `BlockedVersionSource`
//   - `GET {repository_base_url}/releases/latest`
//   - `GET {changelog_url}` (JSON list of changelog entries)
//   - `GET {blocked_versions_url}` (JSON list of `{version, comment}`)
// - `HttpDownloader`: `ArtifactDownloader` streaming to disk
//
// ## Constraints
//
// - One HTTP request per call. No retries, no caching: caching of the
//   latest release is owned by `CachedReleaseFeed` in selfup-core
// - Every request has a finite timeout
// - The access token NEVER appears in logs or error messages

mod download;
mod feed;

pub use download::HttpDownloader;
pub use feed::GithubReleaseFeed;

use selfup_core::{Error, Result};
use std::time::Duration;

/// User agent sent with every request; GitHub rejects requests without one
pub const USER_AGENT: &str = concat!("selfup/", env!("CARGO_PKG_VERSION"));

/// Default timeout for feed requests (30 seconds)
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// reqwest errors carry the request URL, which may carry the token
pub(crate) fn describe(err: reqwest::Error) -> String {
    err.without_url().to_string()
}

pub(crate) fn client_error(err: reqwest::Error) -> Error {
    Error::config(format!("Failed to create HTTP client: {}", describe(err)))
}

pub(crate) fn ensure_timeout(timeout: Duration) -> Result<()> {
    if timeout.is_zero() {
        return Err(Error::config("HTTP timeout must be > 0"));
    }
    Ok(())
}
