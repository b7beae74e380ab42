//! Hookable entity classification.

use crate::entity::{EntityEntry, EntityKind};
use parking_lot::RwLock;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::trace;

/// Decides whether entries of a runtime type are passed to hooks.
///
/// The answer comes from the inheritable opt-out marker on
/// [`EntityKind`] and defaults to hookable. It is computed once per
/// distinct runtime type and cached; later lookups only take a read lock.
/// Concurrent first lookups of the same type may both compute the value,
/// but only the first insert is kept and both computations agree.
#[derive(Debug, Default)]
pub struct HookableEntityFilter {
    cache: RwLock<HashMap<TypeId, bool>>,
}

static GLOBAL: OnceLock<HookableEntityFilter> = OnceLock::new();

impl HookableEntityFilter {
    /// Creates a filter with an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process-wide filter shared by all contexts.
    pub fn global() -> &'static HookableEntityFilter {
        GLOBAL.get_or_init(HookableEntityFilter::new)
    }

    /// Returns true if entities of the runtime type `type_id`, declared as
    /// `kind`, are hookable.
    pub fn is_hookable(&self, type_id: TypeId, kind: &EntityKind) -> bool {
        if let Some(&hookable) = self.cache.read().get(&type_id) {
            return hookable;
        }
        let computed = kind.resolve_hookable();
        trace!(kind = kind.name(), hookable = computed, "classified entity type");
        *self.cache.write().entry(type_id).or_insert(computed)
    }

    /// Classifies a tracked entry.
    pub fn is_entry_hookable(&self, entry: &EntityEntry) -> bool {
        self.is_hookable(entry.type_id(), entry.kind())
    }

    /// Returns the number of classified types.
    #[must_use]
    pub fn cached_types(&self) -> usize {
        self.cache.read().len()
    }
}
