//! Durable record stores.
//!
//! A store is an upsert sink keyed on record `id` plus the "last committed
//! id" query that drives resume. Two backends exist:
//! - [`SqliteStore`] - a `records` table with `ON CONFLICT(id)` upserts
//! - [`CsvStore`] - an append-only CSV file read back with later-row-wins
//!
//! Both make re-applying the same records harmless, which is what gives
//! the batch sink its at-least-once delivery guarantee.

mod csv_file;
mod error;
mod sqlite;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::record::Record;

pub use csv_file::CsvStore;
pub use error::{StoreError, StoreErrorKind};
pub use sqlite::SqliteStore;

/// Attempts per write before a transient fault is reported.
pub const WRITE_ATTEMPTS: u32 = 3;

/// Delay step between write attempts (multiplied by the attempt number).
const WRITE_RETRY_STEP: Duration = Duration::from_millis(200);

/// Data-access contract for durable record storage.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Writes `records` with upsert semantics and returns how many were written.
    ///
    /// Implementations retry their own transient faults; an error means the
    /// whole slice must be treated as unwritten.
    async fn upsert(&self, records: &[Record]) -> Result<usize, StoreError>;

    /// Returns the maximum persisted id, or `None` for an empty store.
    async fn last_committed_id(&self) -> Result<Option<i64>, StoreError>;

    /// Returns the number of distinct persisted records.
    async fn record_count(&self) -> Result<u64, StoreError>;
}

/// Runs a store write, retrying transient faults up to [`WRITE_ATTEMPTS`] times.
pub(crate) async fn with_write_retry<T, F, Fut>(mut operation: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < WRITE_ATTEMPTS => {
                warn!(attempt, error = %e, "transient store fault, retrying write");
                tokio::time::sleep(WRITE_RETRY_STEP * attempt).await;
            }
            Err(e) => return Err(e),
        }
    }
}
