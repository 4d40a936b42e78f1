//! Resume point discovery.
//!
//! The checkpoint is the highest id the store has acknowledged. A scan
//! resumes right after it, never before the configured start.

use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::store::RecordStore;

/// Upper bound on how long the checkpoint query may take before the scan
/// falls back to the configured start.
pub const CHECKPOINT_TIMEOUT: Duration = Duration::from_secs(30);

/// Returns the first id a scan should fetch.
///
/// This is `max(last_committed + 1, start_id)`, or `start_id` for an empty
/// store. A failed or timed-out checkpoint query is logged and treated as
/// an empty store; records already persisted are simply re-fetched and
/// re-upserted.
#[instrument(level = "debug", skip(store))]
pub async fn resume_point(store: &dyn RecordStore, start_id: i64) -> i64 {
    resume_point_within(store, start_id, CHECKPOINT_TIMEOUT).await
}

pub(crate) async fn resume_point_within(
    store: &dyn RecordStore,
    start_id: i64,
    limit: Duration,
) -> i64 {
    let last = match tokio::time::timeout(limit, store.last_committed_id()).await {
        Ok(Ok(last)) => last,
        Ok(Err(e)) => {
            warn!(error = %e, start_id, "checkpoint query failed, starting from configured start");
            return start_id;
        }
        Err(_) => {
            warn!(
                timeout_secs = limit.as_secs(),
                start_id, "checkpoint query timed out, starting from configured start"
            );
            return start_id;
        }
    };

    match last {
        Some(last) => {
            let resume = last.saturating_add(1).max(start_id);
            info!(last_committed = last, resume_from = resume, "resuming scan");
            resume
        }
        None => {
            info!(start_id, "no committed records, starting from configured start");
            start_id
        }
    }
}
