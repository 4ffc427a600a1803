use async_trait::async_trait;

use crate::error::Result;

/// Creates a safety backup before an update is staged
///
/// The backup implementation is a black box to the orchestrator. It either
/// completes or fails, and a failure always aborts the update.
#[async_trait]
pub trait BackupService: Send + Sync {
    /// Create a backup now
    async fn create_backup(&self) -> Result<()>;
}
