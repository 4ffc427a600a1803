//! Remote release metadata and persisted policy records
//!
//! Field names follow the GitHub releases API (`tag_name`,
//! `browser_download_url`, ...) so the descriptors deserialize directly
//! from the repository endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::Result;
use crate::version::SemanticVersion;

/// Logical key under which [`UpdateData`] is stored
pub const UPDATE_DATA_KEY: &str = "UpdateData";

/// A published release and its downloadable artifacts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    /// Release tag, a version string such as `v2.3.1`
    pub tag_name: String,

    /// Downloadable artifacts, in the order the feed lists them
    #[serde(default)]
    pub assets: Vec<Asset>,

    /// Publication timestamp
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,

    /// Release notes
    #[serde(default)]
    pub body: Option<String>,

    /// Whether the feed marks this as a pre-release
    #[serde(default)]
    pub prerelease: bool,
}

impl Release {
    /// Create a release with the given tag and assets
    pub fn new(tag_name: impl Into<String>, assets: Vec<Asset>) -> Self {
        Self {
            tag_name: tag_name.into(),
            assets,
            published_at: None,
            body: None,
            prerelease: false,
        }
    }

    /// Parse the release tag as a version
    pub fn version(&self) -> Result<SemanticVersion> {
        SemanticVersion::parse(&self.tag_name)
    }
}

/// One downloadable file attached to a release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// File name, also used as the name of the downloaded file
    pub name: String,

    /// Direct download URL
    pub browser_download_url: String,

    /// Size in bytes as reported by the feed
    #[serde(default)]
    pub size: u64,
}

impl Asset {
    pub fn new(name: impl Into<String>, browser_download_url: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            browser_download_url: browser_download_url.into(),
            size,
        }
    }
}

/// One version's section of the changelog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangelogEntry {
    /// Version string of this entry
    pub version: String,

    /// Release date as written in the changelog
    #[serde(default)]
    pub date: Option<String>,

    /// Individual changes
    #[serde(default)]
    pub changes: Vec<ChangelogChange>,
}

impl ChangelogEntry {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            date: None,
            changes: Vec::new(),
        }
    }

    /// Add a change line
    pub fn with_change(mut self, kind: impl Into<String>, text: impl Into<String>) -> Self {
        self.changes.push(ChangelogChange {
            kind: kind.into(),
            text: text.into(),
        });
        self
    }

    /// Parse the entry's version
    pub fn parsed_version(&self) -> Result<SemanticVersion> {
        SemanticVersion::parse(&self.version)
    }
}

/// A single changelog line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangelogChange {
    /// Change category ("feature", "fix", "note", ...)
    #[serde(rename = "type")]
    pub kind: String,

    /// Human readable description
    pub text: String,
}

/// A version the vendor flagged as unsafe to install
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedVersion {
    pub version: SemanticVersion,

    #[serde(default)]
    pub comment: String,
}

impl BlockedVersion {
    pub fn new(version: SemanticVersion, comment: impl Into<String>) -> Self {
        Self {
            version,
            comment: comment.into(),
        }
    }
}

/// Persisted user preferences about updates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateData {
    /// Versions the user asked not to be notified about again
    #[serde(default)]
    pub ignore_versions: BTreeSet<SemanticVersion>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_from_github_payload() {
        let payload = serde_json::json!({
            "tag_name": "v2.0.0",
            "published_at": "2024-03-01T10:00:00Z",
            "prerelease": false,
            "html_url": "https://example.invalid/releases/v2.0.0",
            "assets": [
                {
                    "name": "app-2.0.0-windows.zip",
                    "browser_download_url": "https://example.invalid/app-2.0.0-windows.zip",
                    "size": 1024,
                    "content_type": "application/zip"
                },
                {
                    "name": "app-2.0.0-linux.tar.gz",
                    "browser_download_url": "https://example.invalid/app-2.0.0-linux.tar.gz",
                    "size": 2048
                }
            ]
        });

        let release: Release = serde_json::from_value(payload).unwrap();
        assert_eq!(release.tag_name, "v2.0.0");
        assert_eq!(release.assets.len(), 2);
        assert_eq!(release.assets[1].size, 2048);
        assert!(release.published_at.is_some());
        assert_eq!(release.version().unwrap(), SemanticVersion::parse("2.0.0").unwrap());
    }

    #[test]
    fn test_changelog_change_uses_type_key() {
        let entry: ChangelogEntry = serde_json::from_value(serde_json::json!({
            "version": "v1.5.0",
            "date": "2024-01-02",
            "changes": [{ "type": "fix", "text": "Fixed the thing" }]
        }))
        .unwrap();
        assert_eq!(entry.changes[0].kind, "fix");
    }

    #[test]
    fn test_update_data_set_semantics() {
        let mut data = UpdateData::default();
        assert!(data.ignore_versions.insert(SemanticVersion::parse("2.0").unwrap()));
        assert!(!data.ignore_versions.insert(SemanticVersion::parse("2.0.0").unwrap()));
        assert_eq!(data.ignore_versions.len(), 1);
    }
}
