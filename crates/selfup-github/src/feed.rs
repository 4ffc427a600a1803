//! Release, changelog and block list over HTTP

use async_trait::async_trait;
use reqwest::StatusCode;
use selfup_core::model::{BlockedVersion, ChangelogEntry, Release};
use selfup_core::traits::{BlockedVersionSource, ReleaseSource};
use selfup_core::{Error, Result, UpdaterConfig, with_access_token};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::{USER_AGENT, client_error, describe, ensure_timeout};

/// GitHub-style release feed
///
/// Stateless: every call is exactly one GET.
pub struct GithubReleaseFeed {
    client: reqwest::Client,
    repository_base_url: String,
    changelog_url: String,
    blocked_versions_url: String,
    access_token: Option<String>,
}

impl GithubReleaseFeed {
    /// Create a feed for the URLs and token in `config`
    ///
    /// # Errors
    ///
    /// Returns a config error if the HTTP client cannot be built.
    pub fn from_config(config: &UpdaterConfig) -> Result<Self> {
        Self::new(
            &config.repository_base_url,
            &config.changelog_url,
            &config.blocked_versions_url,
            config.access_token.clone(),
            config.http_timeout(),
        )
    }

    pub fn new(
        repository_base_url: &str,
        changelog_url: &str,
        blocked_versions_url: &str,
        access_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        ensure_timeout(timeout)?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(client_error)?;

        Ok(Self {
            client,
            repository_base_url: repository_base_url.trim_end_matches('/').to_string(),
            changelog_url: changelog_url.to_string(),
            blocked_versions_url: blocked_versions_url.to_string(),
            access_token: access_token.filter(|t| !t.is_empty()),
        })
    }

    /// URL of the latest release, without the token
    pub fn latest_release_url(&self) -> String {
        format!("{}/releases/latest", self.repository_base_url)
    }

    /// GET `url` and decode the JSON body
    ///
    /// `label` is logged and used in error messages in place of `url`,
    /// which may carry the token.
    async fn get_json<T: DeserializeOwned>(&self, url: &str, label: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| Error::feed(format!("Request to {} failed: {}", label, describe(e))))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::feed(match status {
                StatusCode::NOT_FOUND => format!("{} not found (HTTP 404)", label),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => format!(
                    "Access to {} denied (HTTP {}). Check the access token.",
                    label,
                    status.as_u16()
                ),
                StatusCode::TOO_MANY_REQUESTS => format!("Rate limited by {} (HTTP 429)", label),
                _ => format!("{} returned HTTP {}", label, status.as_u16()),
            }));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| Error::feed(format!("Invalid JSON from {}: {}", label, describe(e))))
    }
}

#[async_trait]
impl ReleaseSource for GithubReleaseFeed {
    async fn latest_release(&self) -> Result<Release> {
        let url = self.latest_release_url();
        debug!("Getting latest release from {}", url);

        let request_url = with_access_token(&url, self.access_token.as_deref())
            .map_err(|e| Error::feed(e.to_string()))?;
        let release: Release = self.get_json(&request_url, &url).await?;
        debug!(
            "Latest release is {} with {} asset(s)",
            release.tag_name,
            release.assets.len()
        );
        Ok(release)
    }

    async fn changelog(&self) -> Result<Vec<ChangelogEntry>> {
        debug!("Getting changelog from {}", self.changelog_url);
        self.get_json(&self.changelog_url, &self.changelog_url).await
    }
}

#[async_trait]
impl BlockedVersionSource for GithubReleaseFeed {
    async fn blocked_versions(&self) -> Result<Vec<BlockedVersion>> {
        debug!("Getting blocked versions from {}", self.blocked_versions_url);
        self.get_json(&self.blocked_versions_url, &self.blocked_versions_url)
            .await
    }
}

// Custom Debug implementation that hides the access token
impl std::fmt::Debug for GithubReleaseFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubReleaseFeed")
            .field("repository_base_url", &self.repository_base_url)
            .field("changelog_url", &self.changelog_url)
            .field("blocked_versions_url", &self.blocked_versions_url)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "<REDACTED>"),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(token: Option<&str>) -> GithubReleaseFeed {
        GithubReleaseFeed::new(
            "https://api.example.invalid/repos/owner/app/",
            "https://raw.example.invalid/changelog.json",
            "https://raw.example.invalid/blocked.json",
            token.map(str::to_string),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_latest_release_url_trims_trailing_slash() {
        assert_eq!(
            feed(None).latest_release_url(),
            "https://api.example.invalid/repos/owner/app/releases/latest"
        );
    }

    #[test]
    fn test_debug_redacts_token() {
        let debug = format!("{:?}", feed(Some("ghp_secret")));
        assert!(!debug.contains("ghp_secret"));
        assert!(debug.contains("<REDACTED>"));
    }

    #[test]
    fn test_empty_token_is_no_token() {
        assert!(format!("{:?}", feed(Some(""))).contains("access_token: None"));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = GithubReleaseFeed::new(
            "https://a.invalid",
            "https://b.invalid",
            "https://c.invalid",
            None,
            Duration::ZERO,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
