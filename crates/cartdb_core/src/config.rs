//! Context configuration.

/// Configuration for a [`DbContext`](crate::DbContext).
///
/// The values here are the defaults a context returns to whenever it is
/// reset for reuse by a [`DbContextPool`](crate::DbContextPool).
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Whether save hooks run on commit.
    pub hooks_enabled: bool,

    /// Whether the tracker detects changes automatically on lookups.
    pub auto_detect_changes: bool,

    /// Whether a successful commit marks all written entries as unchanged.
    pub accept_changes_on_success: bool,

    /// Maximum number of idle contexts kept by a pool.
    pub pool_capacity: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            hooks_enabled: true,
            auto_detect_changes: true,
            accept_changes_on_success: true,
            pool_capacity: 16,
        }
    }
}

impl ContextConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether save hooks run on commit.
    #[must_use]
    pub const fn hooks_enabled(mut self, value: bool) -> Self {
        self.hooks_enabled = value;
        self
    }

    /// Sets whether changes are detected automatically.
    #[must_use]
    pub const fn auto_detect_changes(mut self, value: bool) -> Self {
        self.auto_detect_changes = value;
        self
    }

    /// Sets whether commits accept changes on success.
    #[must_use]
    pub const fn accept_changes_on_success(mut self, value: bool) -> Self {
        self.accept_changes_on_success = value;
        self
    }

    /// Sets how many idle contexts a pool keeps.
    #[must_use]
    pub const fn pool_capacity(mut self, capacity: usize) -> Self {
        self.pool_capacity = capacity;
        self
    }
}
