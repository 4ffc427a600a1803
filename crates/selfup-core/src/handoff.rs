//! Wrapper handoff protocol
//!
//! The process is started by an external supervisor ("wrapper"). To ask
//! the wrapper to do something (apply a staged update, restart, restore a
//! backup, or simply not restart us) the process reports a [`ControlCode`]
//! through two channels:
//!
//! 1. the decimal code is written to `<data_dir>/control.id`
//! 2. the process exits with the code as its exit status
//!
//! The exit status is the authoritative one. A failed control file write
//! is logged and the process still exits.
//!
//! ## Sequence
//!
//! [`WrapperHandoff::signal_and_exit`] returns immediately. A dedicated
//! thread with its own runtime then runs, uncancellable even when the
//! caller's runtime shuts down:
//!
//! ```text
//! write control.id ─► sleep(grace) ─► close_context() ─► terminate(code)
//! ```
//!
//! The grace period (300 ms by default) lets the request that triggered
//! the handoff finish sending its response.

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::traits::ProcessLifecycle;

/// Default delay between writing the control file and exiting
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(300);

/// Upper bound on how long [`SystemProcess`] waits for the application to close
const CLOSE_CONTEXT_TIMEOUT: Duration = Duration::from_secs(5);

/// Action the wrapper should take after this process exits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlCode {
    /// Stay down
    Shutdown = 0,
    /// Apply the update staged in `<data_dir>/update`, then restart
    Update = 11,
    /// Start again
    Restart = 22,
    /// Restore the latest backup, then restart
    Restore = 33,
}

impl ControlCode {
    /// Numeric value, also used as exit status
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map a numeric value back to a control code
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Shutdown),
            11 => Some(Self::Update),
            22 => Some(Self::Restart),
            33 => Some(Self::Restore),
            _ => None,
        }
    }
}

impl fmt::Display for ControlCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for ControlCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let code: i32 = s
            .trim()
            .parse()
            .map_err(|e| Error::Other(format!("Invalid control code '{}': {}", s.trim(), e)))?;
        Self::from_code(code).ok_or_else(|| Error::Other(format!("Unknown control code {}", code)))
    }
}

/// Read a control file written by a previous handoff
pub async fn read_control_file(path: &Path) -> Result<ControlCode> {
    let content = tokio::fs::read_to_string(path).await?;
    content.parse()
}

/// Name of the thread running the handoff
const HANDOFF_THREAD_NAME: &str = "selfup-handoff";

/// Handle to a running handoff
///
/// Dropping it does not cancel anything.
#[derive(Debug)]
pub struct HandoffHandle {
    code: ControlCode,
    done: oneshot::Receiver<()>,
}

impl HandoffHandle {
    /// Control code being handed off
    pub fn code(&self) -> ControlCode {
        self.code
    }

    /// Wait for the handoff to finish
    ///
    /// With a real [`SystemProcess`] this never returns, since the process
    /// exits first. Works from any runtime, not only the one that started
    /// the handoff.
    pub async fn wait(self) {
        if self.done.await.is_err() {
            error!("Handoff for control code {} ended without completing", self.code);
        }
    }
}

/// Writes control codes and terminates the process
#[derive(Clone)]
pub struct WrapperHandoff {
    control_file: PathBuf,
    grace_period: Duration,
    lifecycle: Arc<dyn ProcessLifecycle>,
}

impl WrapperHandoff {
    pub fn new(
        control_file: impl Into<PathBuf>,
        grace_period: Duration,
        lifecycle: Arc<dyn ProcessLifecycle>,
    ) -> Self {
        Self {
            control_file: control_file.into(),
            grace_period,
            lifecycle,
        }
    }

    /// Path of the control file
    pub fn control_file(&self) -> &Path {
        &self.control_file
    }

    /// Start the handoff for `code` and return without waiting
    ///
    /// The sequence runs on its own thread and runtime, so it completes
    /// even if the caller's runtime is dropped right after this returns.
    pub fn signal_and_exit(&self, code: ControlCode) -> HandoffHandle {
        let (done_tx, done) = oneshot::channel();
        let handoff = self.clone();

        let spawned = std::thread::Builder::new()
            .name(HANDOFF_THREAD_NAME.to_string())
            .spawn(move || {
                handoff.run(code);
                let _ = done_tx.send(());
            });

        if let Err(e) = spawned {
            // No thread to run on: block the caller instead of skipping the exit
            error!("Unable to start handoff thread, running inline: {}", e);
            self.run_blocking(code);
        }

        HandoffHandle { code, done }
    }

    fn run(&self, code: ControlCode) {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                error!("Unable to create handoff runtime: {}", e);
                self.run_blocking(code);
                return;
            }
        };

        runtime.block_on(async {
            debug!("Writing control ID {} to {}", code, self.control_file.display());
            if let Err(e) = tokio::fs::write(&self.control_file, code.to_string()).await {
                self.log_write_failure(&e);
            }

            tokio::time::sleep(self.grace_period).await;

            self.lifecycle.close_context().await;
            info!("Exiting with return code {}", code);
            self.lifecycle.terminate(code.code());
        });
    }

    /// Same sequence without a runtime; the application context is not closed
    fn run_blocking(&self, code: ControlCode) {
        if let Err(e) = std::fs::write(&self.control_file, code.to_string()) {
            self.log_write_failure(&e);
        }
        std::thread::sleep(self.grace_period);
        warn!("Exiting with return code {} without closing the application context", code);
        self.lifecycle.terminate(code.code());
    }

    fn log_write_failure(&self, e: &std::io::Error) {
        error!(
            "Unable to write control code to {}: {}. Wrapper might not behave as expected",
            self.control_file.display(),
            e
        );
    }
}

/// Production lifecycle: notify the application, then `std::process::exit`
///
/// `close_context` flips the shutdown flag seen by every
/// [`subscribe`](SystemProcess::subscribe)d receiver and waits (bounded)
/// until all receivers are dropped, which is how the application signals
/// that it finished closing.
pub struct SystemProcess {
    shutdown_tx: watch::Sender<bool>,
}

impl SystemProcess {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self { shutdown_tx }
    }

    /// Receiver that turns `true` when the application should close
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }
}

impl Default for SystemProcess {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessLifecycle for SystemProcess {
    async fn close_context(&self) {
        info!("Closing application context");
        self.shutdown_tx.send_replace(true);
        if tokio::time::timeout(CLOSE_CONTEXT_TIMEOUT, self.shutdown_tx.closed())
            .await
            .is_err()
        {
            warn!(
                "Application did not close within {:?}, exiting anyway",
                CLOSE_CONTEXT_TIMEOUT
            );
        }
    }

    fn terminate(&self, code: i32) {
        std::process::exit(code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::tempdir;
    use tokio::time::Instant;

    #[derive(Default)]
    struct RecordingLifecycle {
        steps: Mutex<Vec<String>>,
    }

    impl RecordingLifecycle {
        fn steps(&self) -> Vec<String> {
            self.steps.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProcessLifecycle for RecordingLifecycle {
        async fn close_context(&self) {
            self.steps.lock().unwrap().push("close".to_string());
        }

        fn terminate(&self, code: i32) {
            self.steps.lock().unwrap().push(format!("exit {}", code));
        }
    }

    #[test]
    fn test_control_code_values() {
        assert_eq!(ControlCode::Shutdown.code(), 0);
        assert_eq!(ControlCode::Update.code(), 11);
        assert_eq!(ControlCode::Restart.code(), 22);
        assert_eq!(ControlCode::Restore.code(), 33);

        assert_eq!("22\n".parse::<ControlCode>().unwrap(), ControlCode::Restart);
        assert!("12".parse::<ControlCode>().is_err());
        assert!("update".parse::<ControlCode>().is_err());
    }

    #[tokio::test]
    async fn test_signal_and_exit_sequence() {
        let dir = tempdir().unwrap();
        let control_file = dir.path().join("control.id");
        std::fs::write(&control_file, "33").unwrap();

        let lifecycle = Arc::new(RecordingLifecycle::default());
        let handoff = WrapperHandoff::new(&control_file, Duration::from_millis(50), lifecycle.clone());

        let started = Instant::now();
        let handle = handoff.signal_and_exit(ControlCode::Update);
        assert_eq!(handle.code(), ControlCode::Update);
        // Returned before the grace period elapsed
        assert!(lifecycle.steps().is_empty());

        handle.wait().await;
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(lifecycle.steps(), vec!["close".to_string(), "exit 11".to_string()]);

        // Previous content overwritten
        assert_eq!(std::fs::read_to_string(&control_file).unwrap(), "11");
        assert_eq!(read_control_file(&control_file).await.unwrap(), ControlCode::Update);
    }

    #[test]
    fn test_handoff_survives_runtime_shutdown() {
        let dir = tempdir().unwrap();
        let control_file = dir.path().join("control.id");
        let lifecycle = Arc::new(RecordingLifecycle::default());
        let handoff = WrapperHandoff::new(&control_file, Duration::from_millis(300), lifecycle.clone());

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let handle = runtime.block_on(async {
            let handle = handoff.signal_and_exit(ControlCode::Update);
            tokio::task::yield_now().await;
            handle
        });
        drop(runtime);

        tokio::runtime::Runtime::new().unwrap().block_on(handle.wait());
        assert_eq!(std::fs::read_to_string(&control_file).unwrap(), "11");
        assert_eq!(lifecycle.steps(), vec!["close".to_string(), "exit 11".to_string()]);
    }

    #[tokio::test]
    async fn test_control_file_failure_still_exits() {
        let dir = tempdir().unwrap();
        let control_file = dir.path().join("missing-dir").join("control.id");

        let lifecycle = Arc::new(RecordingLifecycle::default());
        let handoff = WrapperHandoff::new(&control_file, Duration::from_millis(1), lifecycle.clone());

        handoff.signal_and_exit(ControlCode::Restart).wait().await;

        assert!(!control_file.exists());
        assert_eq!(lifecycle.steps(), vec!["close".to_string(), "exit 22".to_string()]);
    }

    #[tokio::test]
    async fn test_system_process_close_waits_for_receivers() {
        let process = SystemProcess::new();
        let mut rx = process.subscribe();

        let app = tokio::spawn(async move {
            rx.changed().await.unwrap();
            assert!(*rx.borrow());
            // Dropping rx tells close_context the application is done
        });

        process.close_context().await;
        app.await.unwrap();
    }
}
