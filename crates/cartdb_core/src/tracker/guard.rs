//! Scoped guards over tracker settings.
//!
//! Both guards restore what they changed when dropped, which covers normal
//! returns, `?` propagation, panics unwinding through the commit, and async
//! commits dropped at an await point.

use crate::entity::EntityEntry;
use crate::tracker::ChangeTracker;

/// Disables automatic change detection for its lifetime.
pub struct AutoDetectChangesGuard<'a> {
    tracker: &'a ChangeTracker,
    prior: bool,
}

impl<'a> AutoDetectChangesGuard<'a> {
    /// Saves the current setting and switches auto-detection off.
    pub fn suppress(tracker: &'a ChangeTracker) -> Self {
        let prior = tracker.auto_detect_changes();
        tracker.set_auto_detect_changes(false);
        Self { tracker, prior }
    }

    /// Returns the setting that will be restored.
    #[must_use]
    pub fn prior(&self) -> bool {
        self.prior
    }
}

impl Drop for AutoDetectChangesGuard<'_> {
    fn drop(&mut self) {
        self.tracker.set_auto_detect_changes(self.prior);
    }
}

/// Sets `merged_data_ignore` on merged-data entities for its lifetime.
///
/// Each entity gets its own prior value back on drop, so an entity that
/// already ignored merged data keeps doing so.
pub struct MergedDataIgnoreGuard {
    saved: Vec<(EntityEntry, bool)>,
}

impl MergedDataIgnoreGuard {
    /// Switches merged values off on every merged-data entity in `entries`.
    pub fn engage<'e>(entries: impl IntoIterator<Item = &'e EntityEntry>) -> Self {
        let mut saved = Vec::new();
        for entry in entries {
            let mut entity = entry.entity().write();
            if let Some(merged) = entity.as_merged_data_mut() {
                saved.push((entry.clone(), merged.merged_data_ignore()));
                merged.set_merged_data_ignore(true);
            }
        }
        Self { saved }
    }

    /// Returns the number of entities the guard toggled.
    #[must_use]
    pub fn len(&self) -> usize {
        self.saved.len()
    }

    /// Returns true if no entity was toggled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.saved.is_empty()
    }
}

impl Drop for MergedDataIgnoreGuard {
    fn drop(&mut self) {
        for (entry, prior) in self.saved.drain(..) {
            let mut entity = entry.entity().write();
            if let Some(merged) = entity.as_merged_data_mut() {
                merged.set_merged_data_ignore(prior);
            }
        }
    }
}
