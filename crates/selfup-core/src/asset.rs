//! Platform asset selection
//!
//! Only two platform hints exist, `windows` and `linux`. Every host that is
//! not Windows (macOS included) searches for `linux`; a release without such
//! an asset fails with [`Error::NoAssetForPlatform`].

use std::fmt;
use tracing::error;

use crate::error::{Error, Result};
use crate::model::{Asset, Release};

/// Platform whose artifact should be installed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Linux,
}

impl Platform {
    /// Detect the host platform
    pub fn detect() -> Self {
        Self::from_os_name(std::env::consts::OS)
    }

    /// Map an operating system name to a platform
    pub fn from_os_name(os_name: &str) -> Self {
        if os_name.to_lowercase().contains("windows") {
            Platform::Windows
        } else {
            // TODO: macOS releases need their own hint once macOS assets are published
            Platform::Linux
        }
    }

    /// Substring searched for in asset names
    pub fn hint(&self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::Linux => "linux",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.hint())
    }
}

/// Pick the asset of `release` built for `platform`
///
/// First asset (in feed order) whose lowercased name contains the hint.
pub fn select_asset(release: &Release, platform: Platform) -> Result<&Asset> {
    if release.assets.is_empty() {
        return Err(Error::no_asset(platform.hint(), &release.tag_name));
    }

    let hint = platform.hint();
    release
        .assets
        .iter()
        .find(|asset| asset.name.to_lowercase().contains(hint))
        .ok_or_else(|| {
            let names = release
                .assets
                .iter()
                .map(|a| a.name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            error!(
                "Unable to find asset for platform {} in these assets: {}",
                hint, names
            );
            Error::no_asset(hint, &release.tag_name)
        })
}
