//! Update orchestrator
//!
//! The UpdateOrchestrator is responsible for:
//! - Deciding whether an update should be offered
//! - Listing the changelog entries newer than the running version
//! - Executing an update: download → backup → wrapper handoff
//!
//! ## Architecture
//!
//! ```text
//!                 ┌────────────────────┐
//!                 │ UpdateOrchestrator │
//!                 └────────────────────┘
//!                           │
//!    ┌──────────────┬───────┴───────┬───────────────┬──────────────┐
//!    ▼              ▼               ▼               ▼              ▼
//! ┌────────┐  ┌────────────┐  ┌────────────┐  ┌──────────┐  ┌──────────┐
//! │  Feed  │  │   Policy   │  │ Downloader │  │  Backup  │  │ Handoff  │
//! │(cached)│  │(ign/block) │  │            │  │          │  │(exit)    │
//! └────────┘  └────────────┘  └────────────┘  └──────────┘  └──────────┘
//! ```
//!
//! ## Phases
//!
//! ```text
//! Idle ─► Checking ─► UpToDate | UpdateAvailable
//!                                   │ install_update()
//!                                   ▼
//!                  Downloading ─► BackingUp ─► HandingOff ─► (process exit)
//!                        │            │
//!                        └────────────┴──► Failed
//! ```
//!
//! Checks are read-only and may run at any time, concurrently. Once an
//! install is underway, checks no longer move the phase.
//!
//! `install_update` must not run concurrently with itself: overlapping
//! calls would race on the update directory and the control file. The
//! caller serializes it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::asset::{Platform, select_asset};
use crate::config::UpdaterConfig;
use crate::error::{Error, Result};
use crate::feed::CachedReleaseFeed;
use crate::handoff::{ControlCode, HandoffHandle, WrapperHandoff};
use crate::model::ChangelogEntry;
use crate::policy::VersionPolicyStore;
use crate::traits::{
    ArtifactDownloader, BackupService, BlockedVersionSource, KeyValueStore, ProcessLifecycle,
    ReleaseSource,
};
use crate::version::SemanticVersion;

/// Where the orchestrator currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePhase {
    Idle,
    Checking,
    UpToDate,
    UpdateAvailable,
    Downloading,
    BackingUp,
    HandingOff,
    Failed,
}

impl UpdatePhase {
    /// Whether an install has started and checks must not move the phase
    fn is_installing(self) -> bool {
        matches!(
            self,
            UpdatePhase::Downloading | UpdatePhase::BackingUp | UpdatePhase::HandingOff
        )
    }
}

/// Events emitted by the UpdateOrchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateEvent {
    /// An availability check finished
    CheckCompleted {
        current: String,
        latest: String,
        available: bool,
    },

    /// An availability check could not reach a verdict
    CheckFailed { error: String },

    /// An install started
    UpdateStarted { version: String },

    /// The release asset is on disk
    DownloadCompleted { asset: String, bytes: u64 },

    /// The pre-update backup succeeded
    BackupCompleted,

    /// The wrapper handoff was started
    HandoffStarted { code: ControlCode },

    /// An install failed before the handoff
    UpdateFailed { error: String },

    /// The user ignored a version
    VersionIgnored { version: String },
}

/// External collaborators of the orchestrator
pub struct Collaborators {
    pub release_source: Arc<dyn ReleaseSource>,
    pub blocked_source: Arc<dyn BlockedVersionSource>,
    pub store: Arc<dyn KeyValueStore>,
    pub downloader: Arc<dyn ArtifactDownloader>,
    pub backup: Arc<dyn BackupService>,
    pub lifecycle: Arc<dyn ProcessLifecycle>,
}

/// Self-update orchestrator
///
/// ## Lifecycle
///
/// 1. Create with [`UpdateOrchestrator::new()`]; the running version is
///    fixed at this point
/// 2. Poll [`is_update_available()`](Self::is_update_available) as often as
///    needed; the latest release is cached
/// 3. Call [`install_update()`](Self::install_update) once; on success the
///    process exits shortly after
pub struct UpdateOrchestrator {
    current_version: SemanticVersion,
    feed: CachedReleaseFeed,
    policy: VersionPolicyStore,
    downloader: Arc<dyn ArtifactDownloader>,
    backup: Arc<dyn BackupService>,
    handoff: WrapperHandoff,
    platform: Platform,
    access_token: Option<String>,
    update_dir: PathBuf,
    phase: watch::Sender<UpdatePhase>,
    event_tx: mpsc::Sender<UpdateEvent>,
}

impl UpdateOrchestrator {
    /// Create a new orchestrator
    ///
    /// # Returns
    ///
    /// A tuple of (orchestrator, event_receiver)
    pub fn new(
        config: &UpdaterConfig,
        collaborators: Collaborators,
    ) -> Result<(Self, mpsc::Receiver<UpdateEvent>)> {
        config.validate()?;

        let current_version = SemanticVersion::running_or_default(&config.current_version)?;
        let (event_tx, event_rx) = mpsc::channel(config.event_channel_capacity);
        let (phase, _) = watch::channel(UpdatePhase::Idle);

        let orchestrator = Self {
            current_version,
            feed: CachedReleaseFeed::with_ttl(collaborators.release_source, config.cache_ttl()),
            policy: VersionPolicyStore::new(collaborators.store, collaborators.blocked_source),
            downloader: collaborators.downloader,
            backup: collaborators.backup,
            handoff: WrapperHandoff::new(
                config.control_file_path(),
                config.grace_period(),
                collaborators.lifecycle,
            ),
            platform: Platform::detect(),
            access_token: config.access_token.clone().filter(|t| !t.is_empty()),
            update_dir: config.update_dir(),
            phase,
            event_tx,
        };

        Ok((orchestrator, event_rx))
    }

    /// Override the detected platform
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Version of the running build
    pub fn current_version(&self) -> &SemanticVersion {
        &self.current_version
    }

    /// Platform whose asset gets installed
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Current phase
    pub fn phase(&self) -> UpdatePhase {
        *self.phase.borrow()
    }

    /// Receiver that observes phase changes
    pub fn subscribe_phase(&self) -> watch::Receiver<UpdatePhase> {
        self.phase.subscribe()
    }

    /// Version of the latest release (cached)
    pub async fn latest_version(&self) -> Result<SemanticVersion> {
        self.feed.latest_release().await?.version()
    }

    /// Whether an update should be offered
    ///
    /// True only if the latest release is strictly newer than the running
    /// version, not ignored and not blocked. Never fails: feed and store
    /// errors are logged and reported as "no update". An unreachable block
    /// list is logged and treated as "not blocked".
    pub async fn is_update_available(&self) -> bool {
        self.set_check_phase(UpdatePhase::Checking);

        match self.evaluate_latest().await {
            Ok((latest, available)) => {
                self.set_check_phase(if available {
                    UpdatePhase::UpdateAvailable
                } else {
                    UpdatePhase::UpToDate
                });
                self.emit_event(UpdateEvent::CheckCompleted {
                    current: self.current_version.to_string(),
                    latest: latest.to_string(),
                    available,
                });
                available
            }
            Err(e) => {
                error!("Error while checking if new version is available: {}", e);
                self.set_check_phase(UpdatePhase::Idle);
                self.emit_event(UpdateEvent::CheckFailed {
                    error: e.to_string(),
                });
                false
            }
        }
    }

    async fn evaluate_latest(&self) -> Result<(SemanticVersion, bool)> {
        let latest = self.latest_version().await?;

        if !latest.is_update_for(&self.current_version) {
            debug!(
                "Latest version {} is not newer than running version {}",
                latest, self.current_version
            );
            return Ok((latest, false));
        }

        if self.policy.is_ignored(&latest).await? {
            return Ok((latest, false));
        }

        let blocked = match self.policy.is_blocked(&latest).await {
            Ok(blocked) => blocked,
            Err(e) => {
                warn!(
                    "Unable to read blocked versions, treating {} as not blocked: {}",
                    latest, e
                );
                false
            }
        };

        Ok((latest, !blocked))
    }

    /// Whether the latest release is in the user's ignore list
    pub async fn latest_version_ignored(&self) -> Result<bool> {
        let latest = self.latest_version().await?;
        self.policy.is_ignored(&latest).await
    }

    /// Whether the latest release is in the vendor's block list
    pub async fn latest_version_blocked(&self) -> Result<bool> {
        let latest = self.latest_version().await?;
        self.policy.is_blocked(&latest).await
    }

    /// Never offer `version` again
    pub async fn ignore(&self, version: &str) -> Result<()> {
        let version = SemanticVersion::parse(version)?;
        let label = version.to_string();
        self.policy.ignore(version).await?;
        self.emit_event(UpdateEvent::VersionIgnored { version: label });
        Ok(())
    }

    /// Access to the ignore/block policy
    pub fn policy(&self) -> &VersionPolicyStore {
        &self.policy
    }

    /// Full changelog, newest first
    pub async fn all_changes(&self) -> Result<Vec<ChangelogEntry>> {
        self.feed.all_changes().await
    }

    /// Changelog entries newer than the running version
    ///
    /// Scans the newest-first changelog and stops at the first entry that
    /// is not newer than the running version.
    pub async fn changes_since_current_version(&self) -> Result<Vec<ChangelogEntry>> {
        let mut collected = Vec::new();
        for entry in self.feed.all_changes().await? {
            let version = entry.parsed_version()?;
            if self.current_version.is_same_or_newer(&version) {
                break;
            }
            collected.push(entry);
        }
        Ok(collected)
    }

    /// Download the latest release, back up, and hand off to the wrapper
    ///
    /// On success the returned handoff is already running and the process
    /// will exit with [`ControlCode::Update`] after the grace period. On
    /// failure nothing was handed off and the process keeps running.
    ///
    /// # Errors
    ///
    /// - `UpdateFeed`: latest release unavailable
    /// - `NoAssetForPlatform`: nothing to download for this platform
    /// - `UpdateExecution`: download, filesystem or backup failure
    pub async fn install_update(&self) -> Result<HandoffHandle> {
        match self.run_install().await {
            Ok(handle) => Ok(handle),
            Err(e) => {
                error!("Update failed: {}", e);
                self.phase.send_replace(UpdatePhase::Failed);
                self.emit_event(UpdateEvent::UpdateFailed {
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn run_install(&self) -> Result<HandoffHandle> {
        let release = self.feed.latest_release().await?;
        info!("Starting update process to {}", release.tag_name);
        self.emit_event(UpdateEvent::UpdateStarted {
            version: release.tag_name.clone(),
        });

        let asset = select_asset(&release, self.platform)?;
        let file_name = Path::new(&asset.name)
            .file_name()
            .ok_or_else(|| Error::execution(format!("Asset name '{}' is not a file name", asset.name)))?;

        debug!("Downloading update from URL {}", asset.browser_download_url);
        let url = with_access_token(&asset.browser_download_url, self.access_token.as_deref())
            .map_err(|e| Error::execution(e.to_string()))?;

        self.phase.send_replace(UpdatePhase::Downloading);
        prepare_update_dir(&self.update_dir).await.map_err(|e| {
            Error::execution(format!(
                "Unable to prepare update directory {}: {}",
                self.update_dir.display(),
                e
            ))
        })?;

        let destination = self.update_dir.join(file_name);
        debug!("Saving update file as {}", destination.display());
        let bytes = self
            .downloader
            .download(&url, &destination)
            .await
            .map_err(|e| {
                Error::execution(format!("Error while downloading or saving update: {}", e))
            })?;
        self.emit_event(UpdateEvent::DownloadCompleted {
            asset: asset.name.clone(),
            bytes,
        });

        self.phase.send_replace(UpdatePhase::BackingUp);
        info!("Creating backup before shutting down");
        self.backup.create_backup().await.map_err(|e| {
            Error::execution(format!("Unable to create backup before update: {}", e))
        })?;
        self.emit_event(UpdateEvent::BackupCompleted);

        info!("Shutting down to let wrapper execute the update");
        Ok(self.hand_off(ControlCode::Update))
    }

    /// Exit and tell the wrapper to stay down
    pub fn shutdown(&self) -> HandoffHandle {
        info!("Shutting down");
        self.hand_off(ControlCode::Shutdown)
    }

    /// Exit and tell the wrapper to start us again
    pub fn restart(&self) -> HandoffHandle {
        info!("Shutting down for restart");
        self.hand_off(ControlCode::Restart)
    }

    /// Exit and tell the wrapper to restore the latest backup
    ///
    /// The backup to restore must already be staged for the wrapper.
    pub fn restore(&self) -> HandoffHandle {
        info!("Shutting down to let wrapper restore backup");
        self.hand_off(ControlCode::Restore)
    }

    fn hand_off(&self, code: ControlCode) -> HandoffHandle {
        self.phase.send_replace(UpdatePhase::HandingOff);
        self.emit_event(UpdateEvent::HandoffStarted { code });
        self.handoff.signal_and_exit(code)
    }

    fn set_check_phase(&self, next: UpdatePhase) {
        self.phase.send_if_modified(|phase| {
            if phase.is_installing() || *phase == next {
                return false;
            }
            *phase = next;
            true
        });
    }

    fn emit_event(&self, event: UpdateEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                // Nobody is listening
            }
        }
    }
}

/// Append `access_token` to `url` when a token is configured
///
/// The token is form-encoded, so reserved characters cannot change the
/// meaning of the URL. Without a token `url` is returned untouched.
pub fn with_access_token(url: &str, token: Option<&str>) -> Result<String> {
    match token {
        Some(token) if !token.is_empty() => {
            let mut parsed = Url::parse(url)
                .map_err(|e| Error::Other(format!("Invalid URL '{}': {}", url, e)))?;
            parsed.query_pairs_mut().append_pair("access_token", token);
            Ok(parsed.into())
        }
        _ => Ok(url.to_string()),
    }
}

/// Create `dir`, or empty it if it already exists
async fn prepare_update_dir(dir: &Path) -> std::io::Result<()> {
    if !dir.exists() {
        return tokio::fs::create_dir_all(dir).await;
    }

    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_dir() {
            tokio::fs::remove_dir_all(&path).await?;
        } else {
            tokio::fs::remove_file(&path).await?;
        }
    }
    Ok(())
}
