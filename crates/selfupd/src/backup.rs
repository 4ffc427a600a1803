//! Backup through an operator-supplied shell command

use async_trait::async_trait;
use selfup_core::traits::BackupService;
use selfup_core::{Error, Result};
use tokio::process::Command;
use tracing::{debug, info};

/// Runs `SELFUP_BACKUP_COMMAND` and treats a non-zero exit as failure
pub struct CommandBackup {
    command: String,
}

impl CommandBackup {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl BackupService for CommandBackup {
    async fn create_backup(&self) -> Result<()> {
        info!("Running backup command");
        debug!("Backup command: {}", self.command);

        let output = shell(&self.command)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::execution(format!("Unable to start backup command: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::execution(format!(
                "Backup command failed ({}): {}",
                output.status,
                stderr.trim()
            )));
        }

        info!("Backup command finished");
        Ok(())
    }
}

/// Used when no backup command is configured; always fails
pub struct MissingBackup;

#[async_trait]
impl BackupService for MissingBackup {
    async fn create_backup(&self) -> Result<()> {
        Err(Error::execution(
            "SELFUP_BACKUP_COMMAND is not set, refusing to update without a backup",
        ))
    }
}

#[cfg(unix)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(not(unix))]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_successful_command() {
        assert!(CommandBackup::new("true").create_backup().await.is_ok());
    }

    #[tokio::test]
    async fn test_failing_command_reports_stderr() {
        let err = CommandBackup::new("echo 'disk full' >&2; exit 3")
            .create_backup()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UpdateExecution(_)));
        assert!(err.to_string().contains("disk full"));
    }
}
