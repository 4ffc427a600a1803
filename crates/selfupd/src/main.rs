// # selfupd - selfup Daemon
//
// Thin integration layer: all update logic lives in selfup-core, all HTTP
// in selfup-github. This binary only:
// 1. Reads configuration from environment variables
// 2. Initializes tracing and the runtime
// 3. Wires the collaborators into an `UpdateOrchestrator`
// 4. Runs one subcommand
//
// ## Configuration
//
// ### Repository
// - `SELFUP_REPOSITORY_BASE_URL`: e.g. `https://api.github.com/repos/owner/app`
// - `SELFUP_CHANGELOG_URL`: URL of the JSON changelog
// - `SELFUP_BLOCKED_VERSIONS_URL`: URL of the JSON block list
// - `SELFUP_GITHUB_TOKEN`: access token (optional, never logged)
// - `SELFUP_HTTP_TIMEOUT_SECS`: request timeout (default 30)
// - `SELFUP_CACHE_TTL_SECS`: latest release cache lifetime (default 900)
//
// ### Installation
// - `SELFUP_DATA_DIR`: holds `control.id`, `update/` and the store file
// - `SELFUP_CURRENT_VERSION`: running version (default: this binary's)
// - `SELFUP_BACKUP_COMMAND`: shell command run before every update;
//   updates are refused without it
//
// ### Daemon
// - `SELFUP_CHECK_INTERVAL_SECS`: `watch` interval (default 3600)
// - `SELFUP_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// ## Example
//
// ```bash
// export SELFUP_REPOSITORY_BASE_URL=https://api.github.com/repos/owner/app
// export SELFUP_CHANGELOG_URL=https://raw.githubusercontent.com/owner/app/master/changelog.json
// export SELFUP_BLOCKED_VERSIONS_URL=https://raw.githubusercontent.com/owner/app/master/blockedVersions.json
// export SELFUP_DATA_DIR=/var/lib/app
// export SELFUP_BACKUP_COMMAND="tar czf /var/backups/app.tgz /var/lib/app/data"
//
// selfupd watch --install
// ```

mod backup;
mod cli;
mod config;

use anyhow::Result;
use clap::Parser;
use selfup_core::traits::BackupService;
use selfup_core::{
    Collaborators, FileKeyValueStore, HandoffHandle, SystemProcess, UpdateEvent,
    UpdateOrchestrator,
};
use selfup_github::{GithubReleaseFeed, HttpDownloader};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

use backup::{CommandBackup, MissingBackup};
use cli::{Cli, Commands};
use config::Config;

/// Exit codes for failures of the daemon itself
///
/// Exit codes of a wrapper handoff (0, 11, 22, 33) are produced by
/// `SystemProcess` and never pass through here.
#[derive(Debug, Clone, Copy)]
enum SelfupExitCode {
    /// Command finished
    Success = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Command failed
    RuntimeError = 2,
}

impl From<SelfupExitCode> for ExitCode {
    fn from(code: SelfupExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return SelfupExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return SelfupExitCode::ConfigError.into();
    }

    let log_level = match config.level() {
        Ok(level) => level,
        Err(e) => {
            eprintln!("Configuration validation error: {}", e);
            return SelfupExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return SelfupExitCode::ConfigError.into();
    }

    info!("Starting selfupd");
    info!("Configuration loaded: {:?}", config.updater);

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return SelfupExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run(cli.command, config).await {
            error!("{:#}", e);
            SelfupExitCode::RuntimeError
        } else {
            SelfupExitCode::Success
        }
    });

    result.into()
}

/// Wire collaborators and run `command`
async fn run(command: Commands, config: Config) -> Result<()> {
    let feed = Arc::new(GithubReleaseFeed::from_config(&config.updater)?);
    let downloader = Arc::new(HttpDownloader::from_config(&config.updater)?);
    let store = Arc::new(FileKeyValueStore::new(config.updater.store_file_path()).await?);
    let lifecycle = Arc::new(SystemProcess::new());
    let backup: Arc<dyn BackupService> = match &config.backup_command {
        Some(command) => Arc::new(CommandBackup::new(command.clone())),
        None => Arc::new(MissingBackup),
    };

    let (orchestrator, events) = UpdateOrchestrator::new(
        &config.updater,
        Collaborators {
            release_source: feed.clone(),
            blocked_source: feed,
            store,
            downloader,
            backup,
            lifecycle: lifecycle.clone(),
        },
    )?;
    let logger = spawn_event_logger(events, lifecycle.subscribe());

    let result = match command {
        Commands::Check => check(&orchestrator).await,
        Commands::Changes { all } => changes(&orchestrator, all).await,
        Commands::Ignore { version } => {
            orchestrator.ignore(&version).await?;
            println!("Ignoring version {}", version);
            Ok(())
        }
        Commands::Install { force } => {
            require_backup(&config)?;
            install(&orchestrator, force).await
        }
        Commands::Watch { install } => {
            if install {
                require_backup(&config)?;
            }
            watch(&orchestrator, &config, &lifecycle, install).await
        }
    };

    // Closing the event channel lets the logger drain and finish
    drop(orchestrator);
    if let Err(e) = logger.await {
        warn!("Event logger failed: {}", e);
    }
    result
}

fn require_backup(config: &Config) -> Result<()> {
    if config.backup_command.is_none() {
        anyhow::bail!(
            "SELFUP_BACKUP_COMMAND is required to install updates. \
            Set it to a command that backs up the application data."
        );
    }
    Ok(())
}

async fn check(orchestrator: &UpdateOrchestrator) -> Result<()> {
    let available = orchestrator.is_update_available().await;
    let latest = orchestrator.latest_version().await?;

    if available {
        println!(
            "Update available: {} -> {}",
            orchestrator.current_version(),
            latest
        );
    } else {
        println!(
            "No update offered (running {}, latest {})",
            orchestrator.current_version(),
            latest
        );
    }
    Ok(())
}

async fn changes(orchestrator: &UpdateOrchestrator, all: bool) -> Result<()> {
    let entries = if all {
        orchestrator.all_changes().await?
    } else {
        orchestrator.changes_since_current_version().await?
    };

    if entries.is_empty() {
        println!("No changes since {}", orchestrator.current_version());
    }
    for entry in entries {
        match &entry.date {
            Some(date) => println!("{} ({})", entry.version, date),
            None => println!("{}", entry.version),
        }
        for change in &entry.changes {
            println!("  - [{}] {}", change.kind, change.text);
        }
    }
    Ok(())
}

async fn install(orchestrator: &UpdateOrchestrator, force: bool) -> Result<()> {
    if !force && !orchestrator.is_update_available().await {
        println!("No update available");
        return Ok(());
    }

    let handoff = orchestrator.install_update().await?;
    handoff.wait().await;
    Ok(())
}

/// Check every `check_interval` until a signal arrives or a handoff closes us
async fn watch(
    orchestrator: &UpdateOrchestrator,
    config: &Config,
    lifecycle: &SystemProcess,
    install: bool,
) -> Result<()> {
    info!(
        "Checking for updates every {:?}{}",
        config.check_interval,
        if install { ", installing automatically" } else { "" }
    );

    let mut ticker = tokio::time::interval(config.check_interval);
    let mut shutdown = lifecycle.subscribe();
    let signal = wait_for_shutdown_signal();
    tokio::pin!(signal);

    let mut handoff: Option<HandoffHandle> = None;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !orchestrator.is_update_available().await || !install {
                    continue;
                }
                match orchestrator.install_update().await {
                    Ok(handle) => {
                        handoff = Some(handle);
                        break;
                    }
                    Err(e) => error!("Automatic update failed, will retry next check: {}", e),
                }
            }
            received = &mut signal => {
                info!("Received shutdown signal: {}", received?);
                break;
            }
            _ = shutdown.changed() => {
                info!("Application context closing");
                break;
            }
        }
    }

    // The handoff waits for every shutdown receiver to be dropped
    drop(shutdown);
    if let Some(handoff) = handoff {
        handoff.wait().await;
    }
    Ok(())
}

fn spawn_event_logger(
    events: mpsc::Receiver<UpdateEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut events = ReceiverStream::new(events);
        loop {
            tokio::select! {
                event = events.next() => match event {
                    Some(event) => log_event(&event),
                    None => break,
                },
                _ = shutdown.changed() => break,
            }
        }
    })
}

fn log_event(event: &UpdateEvent) {
    match event {
        UpdateEvent::CheckCompleted {
            current,
            latest,
            available,
        } => {
            if *available {
                info!("Update available: {} -> {}", current, latest);
            } else {
                info!("No update offered (running {}, latest {})", current, latest);
            }
        }
        UpdateEvent::CheckFailed { error } => warn!("Update check failed: {}", error),
        UpdateEvent::UpdateStarted { version } => info!("Updating to {}", version),
        UpdateEvent::DownloadCompleted { asset, bytes } => {
            info!("Downloaded {} ({} bytes)", asset, bytes)
        }
        UpdateEvent::BackupCompleted => info!("Backup created"),
        UpdateEvent::HandoffStarted { code } => {
            info!("Handing off to wrapper with control code {}", code)
        }
        UpdateEvent::UpdateFailed { error } => error!("Update failed: {}", error),
        UpdateEvent::VersionIgnored { version } => info!("Version {} ignored", version),
    }
}

/// Wait for SIGTERM or SIGINT
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    tokio::select! {
        _ = sigterm.recv() => Ok("SIGTERM"),
        _ = sigint.recv() => Ok("SIGINT"),
    }
}

/// Wait for CTRL-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
