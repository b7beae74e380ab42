//! Core type definitions for CartDB.

use std::fmt;

/// Persistence state of a tracked entity.
///
/// States are ordered so that `state > EntityState::Unchanged` selects
/// exactly the entries with pending changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityState {
    /// Not tracked by any context.
    Detached,
    /// Tracked and identical to the stored version.
    Unchanged,
    /// Tracked and scheduled for deletion.
    Deleted,
    /// Tracked with changed values.
    Modified,
    /// Tracked and not yet stored.
    Added,
}

impl EntityState {
    /// Returns true if the state carries a pending change.
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::Deleted | Self::Modified | Self::Added)
    }
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Detached => "detached",
            Self::Unchanged => "unchanged",
            Self::Deleted => "deleted",
            Self::Modified => "modified",
            Self::Added => "added",
        };
        f.write_str(name)
    }
}

/// Save state of a context.
///
/// A context is `Idle` until a top-level commit creates a save operation.
/// The operation starts in `PreSave` and moves to `PostSave` right before
/// post-commit hooks run; it never moves backwards. Reentrant commits read
/// this value to decide what to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SaveState {
    /// No save operation is active.
    #[default]
    Idle,
    /// Pre-commit hooks are running or the core write is in progress.
    PreSave,
    /// The core write finished and post-commit hooks are running.
    PostSave,
}

impl SaveState {
    /// Returns true while a save operation is active.
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Idle)
    }
}

impl fmt::Display for SaveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::PreSave => "pre-save",
            Self::PostSave => "post-save",
        };
        f.write_str(name)
    }
}
