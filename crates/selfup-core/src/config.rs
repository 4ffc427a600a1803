//! Configuration types for the update orchestrator
//!
//! Loading (environment, files) belongs to the embedding application; this
//! module only defines the shape, the defaults and validation.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Name of the control file inside the data directory
pub const CONTROL_FILE_NAME: &str = "control.id";

/// Name of the download directory inside the data directory
pub const UPDATE_DIR_NAME: &str = "update";

/// Name of the key-value store file inside the data directory
pub const STORE_FILE_NAME: &str = "selfup-store.json";

/// Main updater configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// Repository API base, e.g. `https://api.github.com/repos/owner/name`
    pub repository_base_url: String,

    /// URL of the JSON changelog
    pub changelog_url: String,

    /// URL of the JSON block list
    pub blocked_versions_url: String,

    /// Data directory holding `control.id`, `update/` and the store file
    pub data_dir: PathBuf,

    /// Version of the running build
    #[serde(default = "default_current_version")]
    pub current_version: String,

    /// Optional access token appended as `access_token` query parameter
    ///
    /// Never logged; `Debug` output redacts it.
    #[serde(default)]
    pub access_token: Option<String>,

    /// How long a fetched latest release is reused (seconds)
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Delay between writing the control file and exiting (milliseconds)
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,

    /// Timeout applied to every HTTP request (seconds)
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Capacity of the orchestrator event channel
    ///
    /// When full, events are dropped with a warning.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl UpdaterConfig {
    /// Create a configuration with default tuning
    pub fn new(
        repository_base_url: impl Into<String>,
        changelog_url: impl Into<String>,
        blocked_versions_url: impl Into<String>,
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            repository_base_url: repository_base_url.into(),
            changelog_url: changelog_url.into(),
            blocked_versions_url: blocked_versions_url.into(),
            data_dir: data_dir.into(),
            current_version: default_current_version(),
            access_token: None,
            cache_ttl_secs: default_cache_ttl_secs(),
            grace_period_ms: default_grace_period_ms(),
            http_timeout_secs: default_http_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }

    /// Set the running version
    pub fn with_current_version(mut self, version: impl Into<String>) -> Self {
        self.current_version = version.into();
        self
    }

    /// Set the access token; empty strings mean "no token"
    pub fn with_access_token(mut self, token: Option<String>) -> Self {
        self.access_token = token.filter(|t| !t.is_empty());
        self
    }

    /// Set the grace period
    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period_ms = grace.as_millis() as u64;
        self
    }

    /// Set the cache time-to-live
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl_secs = ttl.as_secs();
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        for (name, url) in [
            ("repository_base_url", &self.repository_base_url),
            ("changelog_url", &self.changelog_url),
            ("blocked_versions_url", &self.blocked_versions_url),
        ] {
            if url.is_empty() {
                return Err(crate::Error::config(format!("{} cannot be empty", name)));
            }
            if !url.starts_with("https://") && !url.starts_with("http://") {
                return Err(crate::Error::config(format!(
                    "{} must use HTTP or HTTPS scheme. Got: {}",
                    name, url
                )));
            }
        }

        if self.data_dir.as_os_str().is_empty() {
            return Err(crate::Error::config("data_dir cannot be empty"));
        }
        if self.http_timeout_secs == 0 {
            return Err(crate::Error::config("http_timeout_secs must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("event_channel_capacity must be > 0"));
        }

        Ok(())
    }

    /// Directory the release asset is downloaded into
    pub fn update_dir(&self) -> PathBuf {
        self.data_dir.join(UPDATE_DIR_NAME)
    }

    /// Path of the wrapper control file
    pub fn control_file_path(&self) -> PathBuf {
        self.data_dir.join(CONTROL_FILE_NAME)
    }

    /// Path of the file-backed key-value store
    pub fn store_file_path(&self) -> PathBuf {
        self.data_dir.join(STORE_FILE_NAME)
    }

    /// Latest-release cache time-to-live
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Grace period before process exit
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    /// HTTP request timeout
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

// Custom Debug implementation that hides the access token
impl std::fmt::Debug for UpdaterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdaterConfig")
            .field("repository_base_url", &self.repository_base_url)
            .field("changelog_url", &self.changelog_url)
            .field("blocked_versions_url", &self.blocked_versions_url)
            .field("data_dir", &self.data_dir)
            .field("current_version", &self.current_version)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "<REDACTED>"),
            )
            .field("cache_ttl_secs", &self.cache_ttl_secs)
            .field("grace_period_ms", &self.grace_period_ms)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("event_channel_capacity", &self.event_channel_capacity)
            .finish()
    }
}

fn default_current_version() -> String {
    crate::version::FALLBACK_VERSION.to_string()
}

fn default_cache_ttl_secs() -> u64 {
    15 * 60
}

fn default_grace_period_ms() -> u64 {
    300
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_event_channel_capacity() -> usize {
    100
}
