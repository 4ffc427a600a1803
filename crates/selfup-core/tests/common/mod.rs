//! Test doubles and common utilities for orchestrator contract tests
//!
//! Every double counts its calls so tests can assert not only on results
//! but on which collaborators were (not) touched.

#![allow(dead_code)]

use async_trait::async_trait;
use selfup_core::error::{Error, Result};
use selfup_core::model::{Asset, BlockedVersion, ChangelogEntry, Release};
use selfup_core::traits::{
    ArtifactDownloader, BackupService, BlockedVersionSource, ProcessLifecycle, ReleaseSource,
};
use selfup_core::{
    Collaborators, MemoryKeyValueStore, Platform, SemanticVersion, UpdateEvent,
    UpdateOrchestrator, UpdaterConfig,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

/// A release source whose answers tests can change between calls
pub struct MockReleaseSource {
    latest: Mutex<std::result::Result<Release, String>>,
    changelog: Mutex<std::result::Result<Vec<ChangelogEntry>, String>>,
    delay: Mutex<Duration>,
    latest_calls: AtomicUsize,
    changelog_calls: AtomicUsize,
}

impl MockReleaseSource {
    pub fn new(latest: Release) -> Self {
        Self {
            latest: Mutex::new(Ok(latest)),
            changelog: Mutex::new(Ok(Vec::new())),
            delay: Mutex::new(Duration::ZERO),
            latest_calls: AtomicUsize::new(0),
            changelog_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_latest(&self, release: Release) {
        *self.latest.lock().unwrap() = Ok(release);
    }

    pub fn fail_latest(&self, message: &str) {
        *self.latest.lock().unwrap() = Err(message.to_string());
    }

    pub fn set_changelog(&self, entries: Vec<ChangelogEntry>) {
        *self.changelog.lock().unwrap() = Ok(entries);
    }

    pub fn fail_changelog(&self, message: &str) {
        *self.changelog.lock().unwrap() = Err(message.to_string());
    }

    /// Simulated round-trip time of `latest_release()`
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn latest_calls(&self) -> usize {
        self.latest_calls.load(Ordering::SeqCst)
    }

    pub fn changelog_calls(&self) -> usize {
        self.changelog_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReleaseSource for MockReleaseSource {
    async fn latest_release(&self) -> Result<Release> {
        self.latest_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.latest.lock().unwrap().clone().map_err(Error::feed)
    }

    async fn changelog(&self) -> Result<Vec<ChangelogEntry>> {
        self.changelog_calls.fetch_add(1, Ordering::SeqCst);
        self.changelog.lock().unwrap().clone().map_err(Error::feed)
    }
}

/// A block list that can be changed or made unreachable
#[derive(Default)]
pub struct MockBlockedSource {
    blocked: Mutex<Vec<BlockedVersion>>,
    unreachable: Mutex<bool>,
    calls: AtomicUsize,
}

impl MockBlockedSource {
    pub fn block(&self, version: &str, comment: &str) {
        self.blocked
            .lock()
            .unwrap()
            .push(BlockedVersion::new(version.parse().unwrap(), comment));
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        *self.unreachable.lock().unwrap() = unreachable;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlockedVersionSource for MockBlockedSource {
    async fn blocked_versions(&self) -> Result<Vec<BlockedVersion>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if *self.unreachable.lock().unwrap() {
            return Err(Error::feed("Unable to read blocked versions"));
        }
        Ok(self.blocked.lock().unwrap().clone())
    }
}

/// A downloader that writes fixed content and records requested URLs
#[derive(Default)]
pub struct MockDownloader {
    urls: Mutex<Vec<String>>,
    fail: Mutex<bool>,
}

impl MockDownloader {
    pub const CONTENT: &'static [u8] = b"release archive bytes";

    pub fn set_fail(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.urls.lock().unwrap().len()
    }
}

#[async_trait]
impl ArtifactDownloader for MockDownloader {
    async fn download(&self, url: &str, destination: &Path) -> Result<u64> {
        self.urls.lock().unwrap().push(url.to_string());
        if *self.fail.lock().unwrap() {
            return Err(Error::Other("connection reset by peer".to_string()));
        }
        tokio::fs::write(destination, Self::CONTENT).await?;
        Ok(Self::CONTENT.len() as u64)
    }
}

/// A backup service that can be told to fail
#[derive(Default)]
pub struct MockBackup {
    fail: Mutex<bool>,
    calls: AtomicUsize,
}

impl MockBackup {
    pub fn set_fail(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackupService for MockBackup {
    async fn create_backup(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail.lock().unwrap() {
            return Err(Error::Other("disk full".to_string()));
        }
        Ok(())
    }
}

/// Records the handoff's last two steps instead of exiting
#[derive(Default)]
pub struct RecordingLifecycle {
    closed: AtomicUsize,
    exit_codes: Mutex<Vec<i32>>,
}

impl RecordingLifecycle {
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn exit_codes(&self) -> Vec<i32> {
        self.exit_codes.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessLifecycle for RecordingLifecycle {
    async fn close_context(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }

    fn terminate(&self, code: i32) {
        self.exit_codes.lock().unwrap().push(code);
    }
}

/// Release with one Windows and one Linux asset
pub fn release(tag: &str) -> Release {
    Release::new(
        tag,
        vec![
            Asset::new(
                format!("app-{}-windows.zip", tag),
                format!("https://downloads.example.invalid/app-{}-windows.zip", tag),
                1024,
            ),
            Asset::new(
                format!("app-{}-linux.tar.gz", tag),
                format!("https://downloads.example.invalid/app-{}-linux.tar.gz", tag),
                2048,
            ),
        ],
    )
}

pub fn version(s: &str) -> SemanticVersion {
    SemanticVersion::parse(s).unwrap()
}

/// All doubles wired together around a temporary data directory
pub struct Harness {
    pub dir: TempDir,
    pub source: Arc<MockReleaseSource>,
    pub blocked: Arc<MockBlockedSource>,
    pub store: Arc<MemoryKeyValueStore>,
    pub downloader: Arc<MockDownloader>,
    pub backup: Arc<MockBackup>,
    pub lifecycle: Arc<RecordingLifecycle>,
}

impl Harness {
    pub fn new(latest_tag: &str) -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            source: Arc::new(MockReleaseSource::new(release(latest_tag))),
            blocked: Arc::new(MockBlockedSource::default()),
            store: Arc::new(MemoryKeyValueStore::new()),
            downloader: Arc::new(MockDownloader::default()),
            backup: Arc::new(MockBackup::default()),
            lifecycle: Arc::new(RecordingLifecycle::default()),
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    pub fn config(&self, current_version: &str) -> UpdaterConfig {
        UpdaterConfig::new(
            "https://api.example.invalid/repos/owner/app",
            "https://raw.example.invalid/changelog.json",
            "https://raw.example.invalid/blocked.json",
            self.data_dir(),
        )
        .with_current_version(current_version)
        .with_grace_period(Duration::from_millis(10))
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            release_source: self.source.clone(),
            blocked_source: self.blocked.clone(),
            store: self.store.clone(),
            downloader: self.downloader.clone(),
            backup: self.backup.clone(),
            lifecycle: self.lifecycle.clone(),
        }
    }

    /// Orchestrator running `current_version` on Linux
    pub fn orchestrator(&self, current_version: &str) -> UpdateOrchestrator {
        self.orchestrator_with_config(self.config(current_version)).0
    }

    pub fn orchestrator_with_config(
        &self,
        config: UpdaterConfig,
    ) -> (UpdateOrchestrator, mpsc::Receiver<UpdateEvent>) {
        let (orchestrator, events) = UpdateOrchestrator::new(&config, self.collaborators())
            .expect("orchestrator construction succeeds");
        (orchestrator.with_platform(Platform::Linux), events)
    }

    pub fn control_file(&self) -> PathBuf {
        self.dir.path().join("control.id")
    }

    pub fn update_dir(&self) -> PathBuf {
        self.dir.path().join("update")
    }
}

/// Drain every event currently buffered
pub fn drain(events: &mut mpsc::Receiver<UpdateEvent>) -> Vec<UpdateEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}
