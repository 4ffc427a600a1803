//! Environment configuration of the daemon
//!
//! Every setting comes from a `SELFUP_*` environment variable. The updater
//! settings end up in a [`selfup_core::UpdaterConfig`]; the rest belongs
//! to the daemon itself.

use anyhow::{Context, Result};
use selfup_core::UpdaterConfig;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// Default interval between checks in `watch` mode (1 hour)
const DEFAULT_CHECK_INTERVAL_SECS: u64 = 60 * 60;

/// Daemon configuration
pub struct Config {
    pub updater: UpdaterConfig,
    pub check_interval: Duration,
    pub backup_command: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its value
    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("{} is required", key))
        };
        let number = |key: &str| -> Result<Option<u64>> {
            lookup(key)
                .map(|v| {
                    v.trim()
                        .parse::<u64>()
                        .with_context(|| format!("{} must be a whole number. Got: {}", key, v))
                })
                .transpose()
        };

        let mut updater = UpdaterConfig::new(
            required("SELFUP_REPOSITORY_BASE_URL")?,
            required("SELFUP_CHANGELOG_URL")?,
            required("SELFUP_BLOCKED_VERSIONS_URL")?,
            PathBuf::from(required("SELFUP_DATA_DIR")?),
        )
        .with_current_version(
            lookup("SELFUP_CURRENT_VERSION")
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
        )
        .with_access_token(lookup("SELFUP_GITHUB_TOKEN"));

        if let Some(secs) = number("SELFUP_HTTP_TIMEOUT_SECS")? {
            updater.http_timeout_secs = secs;
        }
        if let Some(secs) = number("SELFUP_CACHE_TTL_SECS")? {
            updater.cache_ttl_secs = secs;
        }

        Ok(Self {
            updater,
            check_interval: Duration::from_secs(
                number("SELFUP_CHECK_INTERVAL_SECS")?.unwrap_or(DEFAULT_CHECK_INTERVAL_SECS),
            ),
            backup_command: lookup("SELFUP_BACKUP_COMMAND").filter(|c| !c.trim().is_empty()),
            log_level: lookup("SELFUP_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.updater
            .validate()
            .map_err(|e| anyhow::anyhow!("{}", e))?;

        let interval = self.check_interval.as_secs();
        if !(60..=7 * 24 * 60 * 60).contains(&interval) {
            anyhow::bail!(
                "SELFUP_CHECK_INTERVAL_SECS must be between 60 seconds and 7 days. Got: {}",
                interval
            );
        }

        self.level()?;
        Ok(())
    }

    /// Maximum tracing level
    pub fn level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => anyhow::bail!(
                "SELFUP_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }
    }
}
