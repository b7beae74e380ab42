//! Per-commit view of a tracked entry handed to hooks.

use crate::entity::{Entity, EntityEntry, EntityId, EntityKind, EntityRef};
use crate::types::EntityState;
use std::any::TypeId;

/// A tracked entry wrapped for one commit cycle.
///
/// The initial state is captured when the entry is wrapped, before any hook
/// runs, so hooks that change the state can still be told apart from
/// entries that arrived in that state. Wrappers are created per commit and
/// dropped when it ends.
#[derive(Debug, Clone)]
pub struct HookedEntity {
    entry: EntityEntry,
    initial_state: EntityState,
}

impl HookedEntity {
    /// Wraps an entry, capturing its current state as the initial state.
    #[must_use]
    pub fn new(entry: EntityEntry) -> Self {
        let initial_state = entry.state();
        Self {
            entry,
            initial_state,
        }
    }

    /// Returns the underlying tracker entry.
    #[must_use]
    pub fn entry(&self) -> &EntityEntry {
        &self.entry
    }

    /// Returns the tracked entity.
    #[must_use]
    pub fn entity(&self) -> &EntityRef {
        self.entry.entity()
    }

    /// Returns the entity ID.
    #[must_use]
    pub fn entity_id(&self) -> EntityId {
        self.entry.entity_id()
    }

    /// Returns the entity kind.
    #[must_use]
    pub fn kind(&self) -> &'static EntityKind {
        self.entry.kind()
    }

    /// Returns the exact runtime type of the entity.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.entry.type_id()
    }

    /// Returns the state captured before hooks ran.
    #[must_use]
    pub fn initial_state(&self) -> EntityState {
        self.initial_state
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> EntityState {
        self.entry.state()
    }

    /// Changes the current state of the underlying entry.
    pub fn set_state(&self, state: EntityState) {
        self.entry.set_state(state);
    }

    /// Returns true if a hook changed the state.
    #[must_use]
    pub fn has_state_changed(&self) -> bool {
        self.state() != self.initial_state
    }

    /// Reads the entity as a concrete type.
    ///
    /// Returns `None` if the entity is not a `T`.
    pub fn with_entity<T: Entity, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let guard = self.entry.entity().read();
        let entity: &dyn Entity = &*guard;
        entity.as_any().downcast_ref::<T>().map(f)
    }

    /// Mutates the entity as a concrete type.
    ///
    /// Returns `None` if the entity is not a `T`. Edits to an unchanged or
    /// modified entity are picked up by the detection pass that follows the
    /// pre-commit hooks.
    pub fn with_entity_mut<T: Entity, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut guard = self.entry.entity().write();
        let entity: &mut dyn Entity = &mut *guard;
        entity.as_any_mut().downcast_mut::<T>().map(f)
    }
}
