//! Display-name filter that rejects placeholder accounts.

/// Prefix the endpoint uses for auto-generated placeholder names
/// ("fan club number N").
pub const DEFAULT_PLACEHOLDER_PREFIX: &str = "แฟนคลับหมายเลข";

/// Accepts or rejects candidate names.
#[derive(Debug, Clone)]
pub struct NameFilter {
    placeholder_prefix: String,
}

impl Default for NameFilter {
    fn default() -> Self {
        Self::new(DEFAULT_PLACEHOLDER_PREFIX)
    }
}

impl NameFilter {
    /// Creates a filter rejecting names that start with `placeholder_prefix`.
    ///
    /// An empty prefix disables prefix matching; empty names are still rejected.
    #[must_use]
    pub fn new(placeholder_prefix: impl Into<String>) -> Self {
        Self {
            placeholder_prefix: placeholder_prefix.into(),
        }
    }

    /// Returns true when `display_name` names a real account.
    #[must_use]
    pub fn accept(&self, display_name: &str) -> bool {
        if display_name.is_empty() {
            return false;
        }
        self.placeholder_prefix.is_empty() || !display_name.starts_with(&self.placeholder_prefix)
    }
}
