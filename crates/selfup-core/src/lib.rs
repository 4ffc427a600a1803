// # selfup-core
//
// Core library of the selfup update orchestrator.
//
// ## Architecture Overview
//
// A long-running server process uses this library to update itself without
// replacing its own binary:
// - **SemanticVersion**: lenient, totally ordered version values
// - **CachedReleaseFeed**: latest release memoized for 15 minutes, changelog
// - **VersionPolicyStore**: user-ignored and vendor-blocked versions
// - **select_asset**: picks the release artifact for this platform
// - **UpdateOrchestrator**: availability checks and download → backup → handoff
// - **WrapperHandoff**: control file plus exit code for the external wrapper
//
// The wrapper that started the process does the actual replacement after
// it observes exit status 11.
//
// All I/O collaborators are traits (see `traits`) so the embedding
// application decides how releases are fetched, where records persist and
// how backups are made.

pub mod asset;
pub mod config;
pub mod error;
pub mod feed;
pub mod handoff;
pub mod model;
pub mod orchestrator;
pub mod policy;
pub mod store;
pub mod traits;
pub mod version;

// Re-export core types for convenience
pub use asset::{Platform, select_asset};
pub use config::UpdaterConfig;
pub use error::{Error, Result};
pub use feed::CachedReleaseFeed;
pub use handoff::{ControlCode, HandoffHandle, SystemProcess, WrapperHandoff};
pub use model::{Asset, BlockedVersion, ChangelogEntry, Release, UpdateData};
pub use orchestrator::{Collaborators, UpdateEvent, UpdateOrchestrator, UpdatePhase, with_access_token};
pub use policy::VersionPolicyStore;
pub use store::{FileKeyValueStore, MemoryKeyValueStore};
pub use traits::{
    ArtifactDownloader, BackupService, BlockedVersionSource, KeyValueStore, KeyValueStoreExt,
    ProcessLifecycle, ReleaseSource,
};
pub use version::SemanticVersion;
