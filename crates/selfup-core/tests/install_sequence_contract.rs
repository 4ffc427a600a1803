//! Contract Test: Install Sequence
//!
//! Constraints verified:
//! - Download happens into a freshly cleaned `<data_dir>/update`
//! - A failed download aborts before backup and handoff
//! - A failed backup aborts before handoff: no control file, no exit
//! - A successful install writes control code 11 and exits with 11
//! - The access token is appended to the download URL when configured
//!
//! If this test fails, an update could be staged without a backup.

mod common;

use common::*;
use selfup_core::handoff::read_control_file;
use selfup_core::model::Release;
use selfup_core::{ControlCode, Error, Platform, UpdateEvent, UpdatePhase};

#[tokio::test]
async fn successful_install_hands_off_with_update_code() {
    let harness = Harness::new("v2.1.0");
    let (orchestrator, mut events) = harness.orchestrator_with_config(harness.config("2.0.0"));

    let handle = orchestrator.install_update().await.expect("install succeeds");
    assert_eq!(handle.code(), ControlCode::Update);
    assert_eq!(orchestrator.phase(), UpdatePhase::HandingOff);

    handle.wait().await;

    let downloaded = harness.update_dir().join("app-v2.1.0-linux.tar.gz");
    assert_eq!(std::fs::read(&downloaded).unwrap(), MockDownloader::CONTENT);
    assert_eq!(
        harness.downloader.urls(),
        vec!["https://downloads.example.invalid/app-v2.1.0-linux.tar.gz".to_string()]
    );
    assert_eq!(harness.backup.calls(), 1);
    assert_eq!(std::fs::read_to_string(harness.control_file()).unwrap(), "11");
    assert_eq!(read_control_file(&harness.control_file()).await.unwrap(), ControlCode::Update);
    assert_eq!(harness.lifecycle.closed(), 1);
    assert_eq!(harness.lifecycle.exit_codes(), vec![11]);

    assert_eq!(
        drain(&mut events),
        vec![
            UpdateEvent::UpdateStarted { version: "v2.1.0".to_string() },
            UpdateEvent::DownloadCompleted {
                asset: "app-v2.1.0-linux.tar.gz".to_string(),
                bytes: MockDownloader::CONTENT.len() as u64,
            },
            UpdateEvent::BackupCompleted,
            UpdateEvent::HandoffStarted { code: ControlCode::Update },
        ]
    );
}

#[tokio::test]
async fn backup_failure_never_reaches_handoff() {
    let harness = Harness::new("v2.1.0");
    harness.backup.set_fail(true);
    let orchestrator = harness.orchestrator("2.0.0");

    let result = orchestrator.install_update().await;
    assert!(matches!(result, Err(Error::UpdateExecution(ref m)) if m.contains("backup")));
    assert_eq!(orchestrator.phase(), UpdatePhase::Failed);

    // Download did happen, the handoff did not
    assert_eq!(harness.downloader.calls(), 1);
    assert_eq!(harness.backup.calls(), 1);

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(!harness.control_file().exists());
    assert_eq!(harness.lifecycle.closed(), 0);
    assert!(harness.lifecycle.exit_codes().is_empty());
}

#[tokio::test]
async fn download_failure_skips_backup_and_handoff() {
    let harness = Harness::new("v2.1.0");
    harness.downloader.set_fail(true);
    let orchestrator = harness.orchestrator("2.0.0");

    let result = orchestrator.install_update().await;
    assert!(matches!(result, Err(Error::UpdateExecution(_))));
    assert_eq!(harness.backup.calls(), 0);

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(!harness.control_file().exists());
    assert!(harness.lifecycle.exit_codes().is_empty());
}

#[tokio::test]
async fn stale_files_are_removed_before_download() {
    let harness = Harness::new("v2.1.0");
    std::fs::create_dir_all(harness.update_dir()).unwrap();
    std::fs::write(harness.update_dir().join("app-v2.0.9-linux.tar.gz"), b"partial").unwrap();

    let orchestrator = harness.orchestrator("2.0.0");
    orchestrator.install_update().await.unwrap().wait().await;

    let names: Vec<String> = std::fs::read_dir(harness.update_dir())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["app-v2.1.0-linux.tar.gz".to_string()]);
}

#[tokio::test]
async fn access_token_is_appended_to_download_url() {
    let harness = Harness::new("v2.1.0");
    let config = harness
        .config("2.0.0")
        .with_access_token(Some("s3cret".to_string()));
    let (orchestrator, _events) = harness.orchestrator_with_config(config);

    orchestrator.install_update().await.unwrap().wait().await;
    assert_eq!(
        harness.downloader.urls(),
        vec!["https://downloads.example.invalid/app-v2.1.0-linux.tar.gz?access_token=s3cret".to_string()]
    );
}

#[tokio::test]
async fn windows_host_downloads_windows_asset() {
    let harness = Harness::new("v2.1.0");
    let orchestrator = harness.orchestrator("2.0.0").with_platform(Platform::Windows);

    orchestrator.install_update().await.unwrap().wait().await;
    assert!(harness.update_dir().join("app-v2.1.0-windows.zip").exists());
}

#[tokio::test]
async fn release_without_platform_asset_fails_before_download() {
    let harness = Harness::new("v2.1.0");
    harness.source.set_latest(Release::new("v2.1.0", Vec::new()));
    let orchestrator = harness.orchestrator("2.0.0");

    assert!(matches!(
        orchestrator.install_update().await,
        Err(Error::NoAssetForPlatform { .. })
    ));
    assert_eq!(harness.downloader.calls(), 0);
    assert_eq!(harness.backup.calls(), 0);
}

#[tokio::test]
async fn feed_failure_propagates_from_install() {
    let harness = Harness::new("v2.1.0");
    harness.source.fail_latest("HTTP 500");
    let orchestrator = harness.orchestrator("2.0.0");

    assert!(matches!(
        orchestrator.install_update().await,
        Err(Error::UpdateFeed(_))
    ));
    assert_eq!(harness.downloader.calls(), 0);
}

#[tokio::test]
async fn checks_do_not_move_phase_during_handoff() {
    let harness = Harness::new("v2.1.0");
    let orchestrator = harness.orchestrator("2.0.0");

    let handle = orchestrator.install_update().await.unwrap();
    assert!(orchestrator.is_update_available().await);
    assert_eq!(orchestrator.phase(), UpdatePhase::HandingOff);
    handle.wait().await;
}

#[tokio::test]
async fn restart_and_shutdown_hand_off_their_codes() {
    let harness = Harness::new("v2.1.0");
    let orchestrator = harness.orchestrator("2.0.0");

    orchestrator.restart().wait().await;
    assert_eq!(std::fs::read_to_string(harness.control_file()).unwrap(), "22");

    orchestrator.restore().wait().await;
    assert_eq!(std::fs::read_to_string(harness.control_file()).unwrap(), "33");

    orchestrator.shutdown().wait().await;
    assert_eq!(std::fs::read_to_string(harness.control_file()).unwrap(), "0");

    assert_eq!(harness.lifecycle.exit_codes(), vec![22, 33, 0]);
    assert_eq!(harness.backup.calls(), 0);
}
