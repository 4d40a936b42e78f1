//! Scan lifecycle state, live counters and the end-of-run report.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};

use crate::record::ScanRange;

/// Coordinator lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// Computing the resume point.
    Init,
    /// Dispatching lookups and routing completions.
    Running,
    /// No new dispatches; finishing in-flight work and the final flush.
    Draining,
    /// Terminal.
    Done,
}

impl ScanState {
    fn as_u8(self) -> u8 {
        match self {
            Self::Init => 0,
            Self::Running => 1,
            Self::Draining => 2,
            Self::Done => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Init,
            1 => Self::Running,
            2 => Self::Draining,
            _ => Self::Done,
        }
    }
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Init => "init",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Done => "done",
        };
        write!(f, "{label}")
    }
}

/// Live counters for a scan run.
///
/// Shared between the coordinator and observers such as a progress bar.
/// All counters are atomics so they can be read at any time without
/// blocking the run.
#[derive(Debug, Default)]
pub struct ScanStats {
    state: AtomicU8,
    total: AtomicU64,
    completed: AtomicU64,
    found: AtomicU64,
    accepted: AtomicU64,
    committed: AtomicU64,
    flushes: AtomicU64,
    failed_flushes: AtomicU64,
    interrupted: AtomicBool,
}

impl ScanStats {
    /// Creates a tracker with zero counts in the [`ScanState::Init`] state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ScanState {
        ScanState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Ids this run will attempt (known once the resume point is computed).
    #[must_use]
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }

    /// Lookups that have completed, whatever their outcome.
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    /// Lookups that returned a record.
    #[must_use]
    pub fn found(&self) -> u64 {
        self.found.load(Ordering::SeqCst)
    }

    /// Records that passed the name filter.
    #[must_use]
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Records acknowledged by the store.
    #[must_use]
    pub fn committed(&self) -> u64 {
        self.committed.load(Ordering::SeqCst)
    }

    /// Flushes that wrote at least one record without error.
    #[must_use]
    pub fn flushes(&self) -> u64 {
        self.flushes.load(Ordering::SeqCst)
    }

    /// Flush attempts that ended with an error.
    #[must_use]
    pub fn failed_flushes(&self) -> u64 {
        self.failed_flushes.load(Ordering::SeqCst)
    }

    /// Returns true once an interrupt has been observed.
    #[must_use]
    pub fn interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    pub(crate) fn set_state(&self, state: ScanState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    pub(crate) fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::SeqCst);
    }

    pub(crate) fn increment_completed(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_found(&self) {
        self.found.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_flush(&self, written: usize) {
        self.committed.fetch_add(written as u64, Ordering::SeqCst);
        if written > 0 {
            self.flushes.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub(crate) fn record_failed_flush(&self, written: usize) {
        self.committed.fetch_add(written as u64, Ordering::SeqCst);
        self.failed_flushes.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn set_interrupted(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }
}

/// Snapshot of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    /// Configured range.
    pub configured: ScanRange,
    /// First id this run dispatched (or would have).
    pub resume_from: i64,
    /// Ids whose lookup completed.
    pub attempted: u64,
    /// Lookups that returned a record.
    pub found: u64,
    /// Records that passed the filter.
    pub accepted: u64,
    /// Records acknowledged by the store during this run.
    pub committed: u64,
    /// Successful non-empty flushes.
    pub flushes: u64,
    /// Failed flush attempts.
    pub failed_flushes: u64,
    /// Records still buffered when the run ended.
    pub pending: usize,
    /// Whether the run ended because of an interrupt.
    pub interrupted: bool,
    /// State at the time of the snapshot.
    pub final_state: ScanState,
}

impl ScanReport {
    pub(crate) fn snapshot(
        stats: &ScanStats,
        configured: ScanRange,
        resume_from: i64,
        pending: usize,
    ) -> Self {
        Self {
            configured,
            resume_from,
            attempted: stats.completed(),
            found: stats.found(),
            accepted: stats.accepted(),
            committed: stats.committed(),
            flushes: stats.flushes(),
            failed_flushes: stats.failed_flushes(),
            pending,
            interrupted: stats.interrupted(),
            final_state: stats.state(),
        }
    }
}
