// # Process Lifecycle
//
// The last two steps of the wrapper handoff: close the application's
// runtime context, then exit with the control code as status.
//
// Production uses `SystemProcess` (see `handoff`), which really exits.
// Tests substitute a recorder so the handoff sequence can be observed.

use async_trait::async_trait;

/// Application shutdown and process termination
#[async_trait]
pub trait ProcessLifecycle: Send + Sync {
    /// Close the application context (stop servers, flush stores)
    async fn close_context(&self);

    /// Terminate the process with `code` as exit status
    ///
    /// Production implementations do not return.
    fn terminate(&self, code: i32);
}
