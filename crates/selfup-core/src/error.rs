//! Error types for the update orchestrator
//!
//! Four variants carry the update taxonomy (version parsing, feed access,
//! asset selection, update execution); the rest cover ambient concerns.

use thiserror::Error;

/// Result type alias for update operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the update orchestrator
#[derive(Error, Debug)]
pub enum Error {
    /// A version string could not be decomposed into a comparable form
    #[error("Invalid version format: {0}")]
    InvalidVersionFormat(String),

    /// Remote release metadata could not be fetched or was rejected
    #[error("Update feed error: {0}")]
    UpdateFeed(String),

    /// The release carries no artifact for the running platform
    #[error("No asset for platform {platform} in release {release}")]
    NoAssetForPlatform {
        /// Platform hint that was searched for
        platform: String,
        /// Release tag that was searched
        release: String,
    },

    /// Download, filesystem or backup failure during an update attempt
    #[error("Update execution error: {0}")]
    UpdateExecution(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Key-value store errors
    #[error("Store error: {0}")]
    Store(String),

    /// Filesystem errors outside of an update attempt
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an invalid version error
    pub fn invalid_version(msg: impl Into<String>) -> Self {
        Self::InvalidVersionFormat(msg.into())
    }

    /// Create an update feed error
    pub fn feed(msg: impl Into<String>) -> Self {
        Self::UpdateFeed(msg.into())
    }

    /// Create a "no asset for platform" error
    pub fn no_asset(platform: impl Into<String>, release: impl Into<String>) -> Self {
        Self::NoAssetForPlatform {
            platform: platform.into(),
            release: release.into(),
        }
    }

    /// Create an update execution error
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::UpdateExecution(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Whether this error came from the remote feed
    pub fn is_feed_error(&self) -> bool {
        matches!(self, Self::UpdateFeed(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
