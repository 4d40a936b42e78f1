//! Ctrl+C handling for scan runs.
//!
//! The first interrupt cancels the scan, which then drains and flushes. A
//! second interrupt means the operator does not want to wait for that.

use std::future::Future;
use std::io;

use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// Exit status for a forced stop (128 + SIGINT).
pub(crate) const FORCED_EXIT_CODE: i32 = 130;

/// Spawns the Ctrl+C listener for `cancel`.
///
/// A second Ctrl+C exits the process immediately, skipping the final flush.
pub(crate) fn spawn_ctrl_c_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        if watch_interrupts(tokio::signal::ctrl_c, cancel).await {
            error!("Second interrupt, exiting without flushing buffered records");
            std::process::exit(FORCED_EXIT_CODE);
        }
    });
}

/// Cancels on the first signal and returns true on the second.
///
/// Returns false if the signal source fails before a second signal.
pub(crate) async fn watch_interrupts<F, Fut>(mut next_signal: F, cancel: CancellationToken) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    if let Err(e) = next_signal().await {
        warn!(error = %e, "Could not listen for Ctrl+C");
        return false;
    }
    warn!("Stopped by user (Ctrl+C), flushing buffered records. Press Ctrl+C again to exit now");
    cancel.cancel();

    next_signal().await.is_ok()
}
