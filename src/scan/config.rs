//! Scan configuration and validation.

use std::time::Duration;

use super::ScanError;

/// Default number of concurrent lookups.
pub const DEFAULT_MAX_WORKERS: usize = 20;

/// Upper bound accepted for `max_workers`.
pub const MAX_WORKERS_LIMIT: usize = 256;

/// Default time in-flight lookups get to finish after an interrupt.
pub const DEFAULT_DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Parameters for one scan run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// First id of the configured range (inclusive).
    pub start_id: i64,
    /// Last id of the configured range (inclusive).
    pub end_id: i64,
    /// Pending-record count that triggers a flush.
    pub save_every: usize,
    /// Maximum lookups in flight at once.
    pub max_workers: usize,
    /// How long in-flight lookups may keep completing after an interrupt.
    pub drain_grace: Duration,
}

impl ScanConfig {
    /// Creates a configuration with default worker count and drain grace.
    #[must_use]
    pub fn new(start_id: i64, end_id: i64, save_every: usize) -> Self {
        Self {
            start_id,
            end_id,
            save_every,
            max_workers: DEFAULT_MAX_WORKERS,
            drain_grace: DEFAULT_DRAIN_GRACE,
        }
    }

    /// Sets the worker count.
    #[must_use]
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Sets the post-interrupt drain grace.
    #[must_use]
    pub fn with_drain_grace(mut self, drain_grace: Duration) -> Self {
        self.drain_grace = drain_grace;
        self
    }

    /// Checks the configuration before a run.
    ///
    /// # Errors
    ///
    /// - [`ScanError::InvalidRange`] when `start_id > end_id`
    /// - [`ScanError::InvalidSaveEvery`] when `save_every` is zero
    /// - [`ScanError::InvalidWorkers`] when `max_workers` is outside `1..=256`
    pub fn validate(&self) -> Result<(), ScanError> {
        if self.start_id > self.end_id {
            return Err(ScanError::InvalidRange {
                start: self.start_id,
                end: self.end_id,
            });
        }
        if self.save_every == 0 {
            return Err(ScanError::InvalidSaveEvery);
        }
        if !(1..=MAX_WORKERS_LIMIT).contains(&self.max_workers) {
            return Err(ScanError::InvalidWorkers {
                value: self.max_workers,
            });
        }
        Ok(())
    }
}
