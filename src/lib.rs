//! ID Scanner Core Library
//!
//! This library sweeps a numeric ID range against a remote HTTP endpoint,
//! extracts a small record for every reachable ID and persists the records
//! to durable storage, resuming from the last committed ID after an
//! interruption.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`record`] - The `Record` and `ScanRange` data model
//! - [`fetch`] - Classified HTTP lookups with bounded retry
//! - [`filter`] - Placeholder-name rejection
//! - [`db`] - SQLite connection and schema management
//! - [`store`] - Durable record stores (SQLite table, CSV file)
//! - [`sink`] - Buffered batch writes with at-least-once delivery
//! - [`checkpoint`] - Resume point discovery
//! - [`scan`] - The bounded-concurrency scan coordinator

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod checkpoint;
pub mod db;
pub mod fetch;
pub mod filter;
pub mod record;
pub mod scan;
pub mod sink;
pub mod store;

// Re-export commonly used types
pub use checkpoint::resume_point;
pub use db::DbError;
pub use fetch::{
    DEFAULT_FETCH_ATTEMPTS, DEFAULT_REQUEST_TIMEOUT, FailureType, FetchError, LookupClient,
    LookupConfig, RecordLookup, RetryDecision, RetryPolicy, classify_error,
};
pub use filter::{DEFAULT_PLACEHOLDER_PREFIX, NameFilter};
pub use record::{Record, ScanRange};
pub use scan::{
    DEFAULT_MAX_WORKERS, ScanConfig, ScanCoordinator, ScanError, ScanReport, ScanState, ScanStats,
};
pub use sink::{BatchSink, FlushError};
pub use store::{CsvStore, RecordStore, SqliteStore, StoreError, StoreErrorKind};
