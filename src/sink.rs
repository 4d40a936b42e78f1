//! Buffered batch writes with at-least-once delivery.
//!
//! Accepted records collect in an in-memory buffer keyed by id. A flush
//! swaps the buffer out for an empty one and writes the swapped-out records
//! to the store in sub-batches. Records added while a flush is running land
//! in the next flush. When a sub-batch fails, it and every sub-batch after
//! it are returned to the buffer for the next flush attempt, so a record is
//! only dropped from memory once the store has acknowledged it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::{info, instrument};

use crate::record::Record;
use crate::store::{RecordStore, StoreError};

/// Default maximum number of records written per store call.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// A flush that stopped part-way.
#[derive(Debug, Error)]
#[error(
    "flush failed at sub-batch {batch}: {unwritten} records left unwritten ({written} written): {source}"
)]
pub struct FlushError {
    /// Zero-based index of the sub-batch that failed.
    pub batch: usize,
    /// Records acknowledged by the store before the failure.
    pub written: usize,
    /// Records returned to the buffer.
    pub unwritten: usize,
    /// The store error that ended the flush.
    #[source]
    pub source: StoreError,
}

/// Thread-safe pending buffer in front of a [`RecordStore`].
pub struct BatchSink {
    buffer: Mutex<HashMap<i64, Record>>,
    store: Arc<dyn RecordStore>,
    chunk_size: usize,
}

impl std::fmt::Debug for BatchSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchSink")
            .field("pending", &self.pending_len())
            .field("chunk_size", &self.chunk_size)
            .finish_non_exhaustive()
    }
}

impl BatchSink {
    /// Creates a sink writing to `store` in sub-batches of [`DEFAULT_CHUNK_SIZE`].
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self::with_chunk_size(store, DEFAULT_CHUNK_SIZE)
    }

    /// Creates a sink with an explicit sub-batch size (clamped to at least 1).
    #[must_use]
    pub fn with_chunk_size(store: Arc<dyn RecordStore>, chunk_size: usize) -> Self {
        Self {
            buffer: Mutex::new(HashMap::new()),
            store,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Returns the store behind this sink.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Inserts or overwrites `record` and returns the resulting pending count.
    pub fn add(&self, record: Record) -> usize {
        let mut buffer = self.lock_buffer();
        buffer.insert(record.id, record);
        buffer.len()
    }

    /// Number of records awaiting a flush.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.lock_buffer().len()
    }

    /// Writes every pending record and returns how many were written.
    ///
    /// An empty buffer returns `Ok(0)` without touching the store.
    ///
    /// # Errors
    ///
    /// Returns [`FlushError`] naming the failed sub-batch and the number of
    /// records put back into the buffer.
    #[instrument(level = "debug", skip(self))]
    pub async fn flush(&self) -> Result<usize, FlushError> {
        let swapped = std::mem::take(&mut *self.lock_buffer());
        if swapped.is_empty() {
            return Ok(0);
        }

        let mut records: Vec<Record> = swapped.into_values().collect();
        records.sort_unstable_by_key(|record| record.id);

        let mut written = 0usize;
        let mut failure = None;
        for (index, chunk) in records.chunks(self.chunk_size).enumerate() {
            match self.store.upsert(chunk).await {
                Ok(_) => written += chunk.len(),
                Err(source) => {
                    failure = Some((index, source));
                    break;
                }
            }
        }

        if let Some((batch, source)) = failure {
            let unwritten = records.split_off(written);
            let count = unwritten.len();
            self.restore(unwritten);
            return Err(FlushError {
                batch,
                written,
                unwritten: count,
                source,
            });
        }

        info!(count = written, "saved records to store");
        Ok(written)
    }

    /// Puts unwritten records back without clobbering newer values for the same id.
    fn restore(&self, records: Vec<Record>) {
        let mut buffer = self.lock_buffer();
        for record in records {
            buffer.entry(record.id).or_insert(record);
        }
    }

    fn lock_buffer(&self) -> MutexGuard<'_, HashMap<i64, Record>> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
