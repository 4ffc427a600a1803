//! Core traits for the update orchestrator
//!
//! These are the seams to the outside world. The orchestrator only ever
//! talks to its collaborators through them:
//!
//! - [`ReleaseSource`]: latest release and changelog from the remote feed
//! - [`BlockedVersionSource`]: vendor-published list of blocked versions
//! - [`ArtifactDownloader`]: fetch a release asset onto local disk
//! - [`KeyValueStore`]: generic persisted records (ignored versions)
//! - [`BackupService`]: "create a backup now"
//! - [`ProcessLifecycle`]: close the application and exit the process

pub mod backup;
pub mod downloader;
pub mod key_value_store;
pub mod lifecycle;
pub mod release_source;

pub use backup::BackupService;
pub use downloader::ArtifactDownloader;
pub use key_value_store::{KeyValueStore, KeyValueStoreExt};
pub use lifecycle::ProcessLifecycle;
pub use release_source::{BlockedVersionSource, ReleaseSource};
