//! Tracked entity entries.

use crate::entity::kind::runtime_type_id;
use crate::entity::{Entity, EntityId, EntityKind, EntityRef};
use crate::error::DbResult;
use crate::types::EntityState;
use parking_lot::Mutex;
use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

/// Key identifying a tracked entity: kind name plus entity ID.
pub type EntryKey = (&'static str, EntityId);

/// A tracked entity together with its persistence state.
///
/// Entries are cheap to clone; clones share state, so a state change made
/// by a hook through one clone is visible to the tracker and the store.
///
/// The entry reads the entity through its lock when encoding. Do not hold
/// a guard on a tracked entity while calling into the context.
#[derive(Clone)]
pub struct EntityEntry {
    inner: Arc<EntryInner>,
}

struct EntryInner {
    entity: EntityRef,
    entity_id: EntityId,
    kind: &'static EntityKind,
    type_id: TypeId,
    state: Mutex<EntityState>,
    /// Encoding at attach or last acceptance. `None` until first stored.
    original: Mutex<Option<Vec<u8>>>,
}

impl EntityEntry {
    pub(crate) fn new(
        entity: EntityRef,
        state: EntityState,
        original: Option<Vec<u8>>,
    ) -> Self {
        let (entity_id, kind, type_id) = {
            let guard = entity.read();
            let e: &dyn Entity = &*guard;
            (e.entity_id(), e.kind(), runtime_type_id(e))
        };
        Self {
            inner: Arc::new(EntryInner {
                entity,
                entity_id,
                kind,
                type_id,
                state: Mutex::new(state),
                original: Mutex::new(original),
            }),
        }
    }

    /// Returns the tracked entity.
    #[must_use]
    pub fn entity(&self) -> &EntityRef {
        &self.inner.entity
    }

    /// Returns the entity ID.
    #[must_use]
    pub fn entity_id(&self) -> EntityId {
        self.inner.entity_id
    }

    /// Returns the entity kind.
    #[must_use]
    pub fn kind(&self) -> &'static EntityKind {
        self.inner.kind
    }

    /// Returns the exact runtime type of the entity.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.inner.type_id
    }

    /// Returns the tracker key of this entry.
    #[must_use]
    pub fn key(&self) -> EntryKey {
        (self.inner.kind.name(), self.inner.entity_id)
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> EntityState {
        *self.inner.state.lock()
    }

    /// Changes the state.
    ///
    /// Setting `Detached` removes the entry from its tracker on the next
    /// enumeration.
    pub fn set_state(&self, state: EntityState) {
        *self.inner.state.lock() = state;
    }

    /// Returns true if both handles point at the same entry.
    #[must_use]
    pub fn same_entry(&self, other: &EntityEntry) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Encodes the entity's current values.
    pub fn encode(&self) -> DbResult<Vec<u8>> {
        self.inner.entity.read().encode()
    }

    /// Returns true if the entity has the merged-data capability.
    #[must_use]
    pub fn has_merged_data(&self) -> bool {
        self.inner.entity.read().as_merged_data().is_some()
    }

    /// Compares current and original encodings of an unchanged entry and
    /// marks it modified when they differ.
    ///
    /// Returns true if the state changed.
    pub(crate) fn detect_change(&self) -> DbResult<bool> {
        if self.state() != EntityState::Unchanged {
            return Ok(false);
        }
        let current = self.encode()?;
        let changed = match self.inner.original.lock().as_deref() {
            Some(original) => original != current.as_slice(),
            None => true,
        };
        if changed {
            self.set_state(EntityState::Modified);
        }
        Ok(changed)
    }

    /// Records the current values as stored and marks the entry unchanged.
    pub(crate) fn accept(&self) -> DbResult<()> {
        let current = self.encode()?;
        *self.inner.original.lock() = Some(current);
        self.set_state(EntityState::Unchanged);
        Ok(())
    }
}

impl fmt::Debug for EntityEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityEntry")
            .field("kind", &self.inner.kind.name())
            .field("entity_id", &self.inner.entity_id)
            .field("state", &self.state())
            .finish()
    }
}
