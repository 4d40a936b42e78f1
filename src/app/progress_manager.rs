//! Progress UI (bar) for scan runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use idscan_core::{ScanState, ScanStats};
use indicatif::{ProgressBar, ProgressStyle};

const BAR_TEMPLATE: &str =
    "{spinner} {msg} [{wide_bar}] {pos}/{len} ({percent}%) [{elapsed_precise} < {eta_precise}]";

/// Spawns the progress UI when requested.
/// Returns (handle, stop) so the caller can signal stop and await the handle.
/// When `show` is false, returns (None, stop) with stop already true.
pub(crate) fn spawn_progress_ui(
    show: bool,
    stats: Arc<ScanStats>,
) -> (Option<tokio::task::JoinHandle<()>>, Arc<AtomicBool>) {
    if !show {
        return (None, Arc::new(AtomicBool::new(true)));
    }
    let stop = Arc::new(AtomicBool::new(false));
    let handle = spawn_bar_inner(stats, Arc::clone(&stop));
    (Some(handle), stop)
}

fn spawn_bar_inner(stats: Arc<ScanStats>, stop: Arc<AtomicBool>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(BAR_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.enable_steady_tick(Duration::from_millis(100));

        while !stop.load(Ordering::SeqCst) {
            bar.set_length(stats.total());
            bar.set_position(stats.completed().min(stats.total()));
            bar.set_message(progress_message(&stats));
            tokio::time::sleep(Duration::from_millis(120)).await;
        }

        bar.finish_and_clear();
    })
}

fn progress_message(stats: &ScanStats) -> String {
    match stats.state() {
        ScanState::Init => "Resuming".to_string(),
        ScanState::Running => format!("Fetching ({} saved)", stats.committed()),
        ScanState::Draining => "Flushing".to_string(),
        ScanState::Done => "Done".to_string(),
    }
}
