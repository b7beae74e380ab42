//! Change tracking for entities owned by a context.
//!
//! The tracker keeps one [`EntityEntry`] per tracked entity and decides
//! which entries carry pending changes. Dirty detection is snapshot based:
//! an entry remembers the encoding of its values at attach (or last
//! acceptance) and is marked modified once the current encoding differs.
//!
//! Detection runs either explicitly through [`ChangeTracker::detect_changes`]
//! or automatically before enumerations while auto-detection is enabled.

mod guard;

pub use guard::{AutoDetectChangesGuard, MergedDataIgnoreGuard};

use crate::entity::{EntityEntry, EntityRef, EntryKey};
use crate::error::{DbError, DbResult};
use crate::types::EntityState;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::trace;

/// Tracks entities and their persistence states.
pub struct ChangeTracker {
    state: RwLock<TrackerState>,
    auto_detect: AtomicBool,
}

#[derive(Default)]
struct TrackerState {
    /// Entries in tracking order.
    entries: Vec<EntityEntry>,
    by_key: HashMap<EntryKey, EntityEntry>,
}

impl TrackerState {
    fn insert(&mut self, entry: EntityEntry) -> DbResult<()> {
        let key = entry.key();
        if self.by_key.contains_key(&key) {
            return Err(DbError::EntityAlreadyTracked {
                kind: key.0,
                entity_id: key.1,
            });
        }
        self.by_key.insert(key, entry.clone());
        self.entries.push(entry);
        Ok(())
    }

    fn prune_detached(&mut self) {
        self.entries.retain(|e| e.state() != EntityState::Detached);
        self.by_key.retain(|_, e| e.state() != EntityState::Detached);
    }
}

impl ChangeTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new(auto_detect_changes: bool) -> Self {
        Self {
            state: RwLock::new(TrackerState::default()),
            auto_detect: AtomicBool::new(auto_detect_changes),
        }
    }

    /// Returns whether enumerations detect changes first.
    #[must_use]
    pub fn auto_detect_changes(&self) -> bool {
        self.auto_detect.load(Ordering::SeqCst)
    }

    /// Enables or disables automatic change detection.
    pub fn set_auto_detect_changes(&self, enabled: bool) {
        self.auto_detect.store(enabled, Ordering::SeqCst);
    }

    /// Starts tracking an already stored entity as unchanged.
    pub fn attach(&self, entity: EntityRef) -> DbResult<EntityEntry> {
        let entry = EntityEntry::new(entity, EntityState::Unchanged, None);
        {
            let _merged = MergedDataIgnoreGuard::engage([&entry]);
            entry.accept()?;
        }
        self.state.write().insert(entry.clone())?;
        trace!(kind = entry.kind().name(), id = %entry.entity_id(), "attached entity");
        Ok(entry)
    }

    /// Starts tracking a new entity as added.
    pub fn add(&self, entity: EntityRef) -> DbResult<EntityEntry> {
        let entry = EntityEntry::new(entity, EntityState::Added, None);
        self.state.write().insert(entry.clone())?;
        trace!(kind = entry.kind().name(), id = %entry.entity_id(), "added entity");
        Ok(entry)
    }

    /// Schedules a tracked entity for deletion.
    ///
    /// An entity that was added but never stored is detached instead.
    pub fn remove(&self, key: EntryKey) -> DbResult<EntityEntry> {
        let mut state = self.state.write();
        let entry = state
            .by_key
            .get(&key)
            .cloned()
            .ok_or(DbError::EntityNotTracked {
                kind: key.0,
                entity_id: key.1,
            })?;
        if entry.state() == EntityState::Added {
            entry.set_state(EntityState::Detached);
            state.prune_detached();
        } else {
            entry.set_state(EntityState::Deleted);
        }
        Ok(entry)
    }

    /// Looks up the entry for a key.
    #[must_use]
    pub fn entry(&self, key: EntryKey) -> Option<EntityEntry> {
        self.state
            .read()
            .by_key
            .get(&key)
            .filter(|e| e.state() != EntityState::Detached)
            .cloned()
    }

    /// Returns the state of a tracked entity, or `None` if it is not tracked.
    #[must_use]
    pub fn state_of(&self, key: EntryKey) -> Option<EntityState> {
        self.entry(key).map(|e| e.state())
    }

    /// Overrides the state of a tracked entity.
    pub fn set_state(&self, key: EntryKey, state: EntityState) -> DbResult<()> {
        let entry = self.entry(key).ok_or(DbError::EntityNotTracked {
            kind: key.0,
            entity_id: key.1,
        })?;
        entry.set_state(state);
        if state == EntityState::Detached {
            self.state.write().prune_detached();
        }
        Ok(())
    }

    /// Returns the number of tracked entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state
            .read()
            .entries
            .iter()
            .filter(|e| e.state() != EntityState::Detached)
            .count()
    }

    /// Returns true if nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs one detection pass over all tracked entries.
    ///
    /// Merged-data entities ignore their merged values for the duration of
    /// the pass. Returns the number of entries that became modified.
    pub fn detect_changes(&self) -> DbResult<usize> {
        let entries = self.snapshot();
        let _merged = MergedDataIgnoreGuard::engage(&entries);
        let mut modified = 0;
        for entry in &entries {
            if entry.detect_change()? {
                trace!(kind = entry.kind().name(), id = %entry.entity_id(), "detected modification");
                modified += 1;
            }
        }
        Ok(modified)
    }

    /// Returns all tracked entries, detecting changes first when
    /// auto-detection is enabled.
    pub fn entries(&self) -> DbResult<Vec<EntityEntry>> {
        if self.auto_detect_changes() {
            self.detect_changes()?;
        }
        Ok(self.snapshot())
    }

    /// Returns entries with a pending change, detecting changes first when
    /// auto-detection is enabled.
    pub fn changed_entries(&self) -> DbResult<Vec<EntityEntry>> {
        if self.auto_detect_changes() {
            self.detect_changes()?;
        }
        Ok(self.pending_entries())
    }

    /// Returns entries whose state is above `Unchanged`, without detection.
    #[must_use]
    pub fn pending_entries(&self) -> Vec<EntityEntry> {
        self.snapshot()
            .into_iter()
            .filter(|e| e.state() > EntityState::Unchanged)
            .collect()
    }

    /// Returns entries whose entity has the merged-data capability.
    #[must_use]
    pub fn merged_data_entries(&self) -> Vec<EntityEntry> {
        self.snapshot()
            .into_iter()
            .filter(EntityEntry::has_merged_data)
            .collect()
    }

    /// Marks the given entries as stored.
    ///
    /// Added and modified entries become unchanged with a fresh baseline;
    /// deleted entries are detached.
    pub fn accept_changes(&self, entries: &[EntityEntry]) -> DbResult<()> {
        let _merged = MergedDataIgnoreGuard::engage(entries);
        for entry in entries {
            match entry.state() {
                EntityState::Added | EntityState::Modified => entry.accept()?,
                EntityState::Deleted => entry.set_state(EntityState::Detached),
                EntityState::Unchanged | EntityState::Detached => {}
            }
        }
        self.state.write().prune_detached();
        Ok(())
    }

    /// Marks every pending entry as stored.
    pub fn accept_all_changes(&self) -> DbResult<()> {
        let pending = self.pending_entries();
        self.accept_changes(&pending)
    }

    /// Stops tracking everything.
    pub fn clear(&self) {
        let mut state = self.state.write();
        for entry in &state.entries {
            entry.set_state(EntityState::Detached);
        }
        state.entries.clear();
        state.by_key.clear();
    }

    /// Copies the live entries so no lock is held while entities are read.
    fn snapshot(&self) -> Vec<EntityEntry> {
        self.state
            .read()
            .entries
            .iter()
            .filter(|e| e.state() != EntityState::Detached)
            .cloned()
            .collect()
    }
}

impl Default for ChangeTracker {
    fn default() -> Self {
        Self::new(true)
    }
}
