//! Bounded-concurrency range scan.
//!
//! The [`ScanCoordinator`] walks an id range with at most `max_workers`
//! lookups in flight, routes completions through the name filter into a
//! [`BatchSink`](crate::sink::BatchSink), and owns the termination protocol:
//! normal completion, or a cooperative interrupt through a
//! [`CancellationToken`](tokio_util::sync::CancellationToken). Either way
//! the run ends with exactly one final flush.

mod config;
mod coordinator;
mod stats;

use thiserror::Error;

use crate::sink::FlushError;

pub use config::{DEFAULT_DRAIN_GRACE, DEFAULT_MAX_WORKERS, MAX_WORKERS_LIMIT, ScanConfig};
pub use coordinator::ScanCoordinator;
pub use stats::{ScanReport, ScanState, ScanStats};

/// Errors that end a scan run.
#[derive(Debug, Error)]
pub enum ScanError {
    /// `start_id` is greater than `end_id`.
    #[error("invalid range: start id {start} is greater than end id {end}")]
    InvalidRange {
        /// Configured start.
        start: i64,
        /// Configured end.
        end: i64,
    },

    /// Flush threshold of zero.
    #[error("save_every must be at least 1")]
    InvalidSaveEvery,

    /// Worker count outside the accepted range.
    #[error("invalid max_workers {value}: must be between 1 and {MAX_WORKERS_LIMIT}")]
    InvalidWorkers {
        /// The rejected value.
        value: usize,
    },

    /// The mandatory final flush failed; records remain unwritten.
    #[error("final flush failed, {} records unwritten", .source.unwritten)]
    FinalFlush {
        /// Counters at the time of the failure.
        report: Box<ScanReport>,
        /// The flush failure.
        #[source]
        source: FlushError,
    },
}
