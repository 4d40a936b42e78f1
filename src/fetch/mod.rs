//! Per-ID lookups against the remote endpoint.
//!
//! A lookup renders the endpoint URL for one ID, performs a GET with a
//! bounded timeout, retries transient failures a fixed number of times and
//! decodes the display name from a JSON body. Every failure collapses into
//! an "absent" result at the [`RecordLookup`] seam; nothing here is fatal
//! to a scan.

mod client;
mod error;
mod retry;

use async_trait::async_trait;

use crate::record::Record;

pub use client::{
    DEFAULT_NAME_FIELD, DEFAULT_REQUEST_TIMEOUT, DEFAULT_USER_AGENT, LookupClient, LookupConfig,
    UrlTemplate,
};
pub use error::FetchError;
pub use retry::{DEFAULT_FETCH_ATTEMPTS, FailureType, RetryDecision, RetryPolicy, classify_error};

/// Lookup contract used by the scan coordinator.
///
/// Implementations must be safe to call concurrently from many tasks.
#[async_trait]
pub trait RecordLookup: Send + Sync {
    /// Returns the record for `id`, or `None` when the ID is absent or the
    /// lookup failed after its retry budget.
    async fn fetch(&self, id: i64) -> Option<Record>;
}
