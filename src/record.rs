//! Data model shared by every stage of a scan.

use serde::{Deserialize, Serialize};

/// A discovered record: one reachable ID and its display name.
///
/// Records are immutable once created. A later record with the same `id`
/// supersedes an earlier one in every buffer and store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Primary key of the record.
    pub id: i64,
    /// Display name extracted from the endpoint response.
    pub display_name: String,
}

impl Record {
    /// Creates a new record.
    #[must_use]
    pub fn new(id: i64, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
        }
    }
}

/// Inclusive ID range swept by one run.
///
/// `start == end + 1` is a valid empty range meaning "nothing to do".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRange {
    start: i64,
    end: i64,
}

impl ScanRange {
    /// Creates a range, collapsing any `start > end` into the empty range
    /// `[end + 1, end]`.
    #[must_use]
    pub fn new(start: i64, end: i64) -> Self {
        if start > end {
            Self {
                start: end.saturating_add(1),
                end,
            }
        } else {
            Self { start, end }
        }
    }

    /// First ID of the range.
    #[must_use]
    pub fn start(&self) -> i64 {
        self.start
    }

    /// Last ID of the range (inclusive).
    #[must_use]
    pub fn end(&self) -> i64 {
        self.end
    }

    /// Returns true when the range contains no IDs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    /// Number of IDs in the range.
    #[must_use]
    pub fn len(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            self.end.abs_diff(self.start) + 1
        }
    }

    /// Iterates the IDs of the range in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = i64> + use<> {
        self.start..=self.end
    }
}
