//! Version policy: ignored and blocked versions
//!
//! Two independent lists decide whether a newer version is surfaced:
//!
//! - **ignored**: chosen by the user, persisted in the key-value store
//!   under [`UPDATE_DATA_KEY`]
//! - **blocked**: published by the vendor, fetched fresh on every check
//!
//! Neither list is consulted when evaluating the other.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::Result;
use crate::model::{BlockedVersion, UPDATE_DATA_KEY, UpdateData};
use crate::traits::{BlockedVersionSource, KeyValueStore, KeyValueStoreExt};
use crate::version::SemanticVersion;

/// Answers "should version V be offered?"
pub struct VersionPolicyStore {
    store: Arc<dyn KeyValueStore>,
    blocked_source: Arc<dyn BlockedVersionSource>,
    /// Serializes read-modify-write of the ignored set
    write_lock: Mutex<()>,
}

impl VersionPolicyStore {
    pub fn new(store: Arc<dyn KeyValueStore>, blocked_source: Arc<dyn BlockedVersionSource>) -> Self {
        Self {
            store,
            blocked_source,
            write_lock: Mutex::new(()),
        }
    }

    /// Whether the user ignored `version`
    pub async fn is_ignored(&self, version: &SemanticVersion) -> Result<bool> {
        let ignored = self.load().await?.ignore_versions.contains(version);
        if ignored {
            debug!("Version {} is in the list of ignored updates", version);
        }
        Ok(ignored)
    }

    /// Whether the vendor blocked `version`
    ///
    /// Errors from the block list are returned as-is; deciding what an
    /// unreachable block list means is up to the caller.
    pub async fn is_blocked(&self, version: &SemanticVersion) -> Result<bool> {
        debug!("Getting blocked versions");
        let blocked = self
            .blocked_source
            .blocked_versions()
            .await?
            .iter()
            .any(|b| &b.version == version);
        if blocked {
            debug!("Version {} is in the list of blocked updates", version);
        }
        Ok(blocked)
    }

    /// Add `version` to the ignored set
    ///
    /// Idempotent: ignoring an already ignored version writes nothing.
    /// Concurrent calls are serialized, so none of them is lost.
    pub async fn ignore(&self, version: SemanticVersion) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut data = self.load().await?;
        if data.ignore_versions.contains(&version) {
            debug!("Version {} already ignored", version);
            return Ok(());
        }

        info!(
            "Version {} ignored. Will not show update notices for this version.",
            version
        );
        data.ignore_versions.insert(version);
        self.store.save_as(UPDATE_DATA_KEY, &data).await
    }

    /// All ignored versions, ascending
    pub async fn ignored_versions(&self) -> Result<Vec<SemanticVersion>> {
        Ok(self.load().await?.ignore_versions.into_iter().collect())
    }

    /// Current block list
    pub async fn blocked_versions(&self) -> Result<Vec<BlockedVersion>> {
        self.blocked_source.blocked_versions().await
    }

    async fn load(&self) -> Result<UpdateData> {
        let data: Option<UpdateData> = self.store.get_as(UPDATE_DATA_KEY).await?;
        Ok(data.unwrap_or_default())
    }
}
