//! Entity trait and static per-type metadata.

use crate::entity::EntityId;
use crate::error::DbResult;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// Static description of an entity type.
///
/// Kinds form a single-inheritance chain through [`EntityKind::base`]. The
/// hookable marker is inheritable: a kind without an explicit marker takes
/// the marker of its nearest marked ancestor, and a chain without any marker
/// is hookable.
///
/// Declare kinds as `static` items so every instance of a type shares one
/// descriptor:
///
/// ```
/// use cartdb_core::EntityKind;
///
/// static BASE_LOG: EntityKind = EntityKind::new("LogBase").not_hookable();
/// static ACTIVITY_LOG: EntityKind = EntityKind::new("ActivityLog").derived_from(&BASE_LOG);
///
/// assert!(!ACTIVITY_LOG.resolve_hookable());
/// ```
#[derive(Debug)]
pub struct EntityKind {
    name: &'static str,
    base: Option<&'static EntityKind>,
    hookable: Option<bool>,
}

impl EntityKind {
    /// Creates a root kind with no marker.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            base: None,
            hookable: None,
        }
    }

    /// Sets the base kind this kind derives from.
    #[must_use]
    pub const fn derived_from(mut self, base: &'static EntityKind) -> Self {
        self.base = Some(base);
        self
    }

    /// Marks the kind (and unmarked descendants) as excluded from hooks.
    #[must_use]
    pub const fn not_hookable(mut self) -> Self {
        self.hookable = Some(false);
        self
    }

    /// Marks the kind as hookable, overriding an inherited opt-out.
    #[must_use]
    pub const fn hookable(mut self) -> Self {
        self.hookable = Some(true);
        self
    }

    /// Returns the kind name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the base kind, if any.
    #[must_use]
    pub const fn base(&self) -> Option<&'static EntityKind> {
        self.base
    }

    /// Returns the marker declared directly on this kind.
    #[must_use]
    pub const fn marker(&self) -> Option<bool> {
        self.hookable
    }

    /// Walks the kind chain and resolves the effective hookable flag.
    ///
    /// This walk is what [`HookableEntityFilter`](crate::HookableEntityFilter)
    /// caches per runtime type.
    #[must_use]
    pub fn resolve_hookable(&self) -> bool {
        let mut current = Some(self);
        while let Some(kind) = current {
            if let Some(marker) = kind.hookable {
                return marker;
            }
            current = kind.base;
        }
        true
    }

    /// Returns true if this kind is `other` or derives from it.
    #[must_use]
    pub fn is_a(&self, other: &EntityKind) -> bool {
        let mut current = Some(self);
        while let Some(kind) = current {
            if kind.name == other.name {
                return true;
            }
            current = kind.base;
        }
        false
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Capability of entities with virtualized (merged) property values.
///
/// While `merged_data_ignore` is false an entity reports merged values,
/// for example the price of a selected variant combination. The commit
/// pipeline switches it on while detecting changes so merged values never
/// look like edits.
pub trait MergedData {
    /// Returns whether merged values are currently ignored.
    fn merged_data_ignore(&self) -> bool;

    /// Switches merged values off (`true`) or on (`false`).
    fn set_merged_data_ignore(&mut self, ignore: bool);
}

/// Upcast helper implemented for every `'static` type.
pub trait AsAny: Any {
    /// Returns `self` as `&dyn Any`.
    fn as_any(&self) -> &dyn Any;

    /// Returns `self` as `&mut dyn Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A persisted domain object.
///
/// # Example
///
/// ```
/// use cartdb_core::{codec, DbResult, Entity, EntityId, EntityKind};
/// use serde::Serialize;
///
/// static PRODUCT: EntityKind = EntityKind::new("Product");
///
/// #[derive(Debug, Serialize)]
/// struct Product {
///     id: EntityId,
///     name: String,
/// }
///
/// impl Entity for Product {
///     fn entity_id(&self) -> EntityId {
///         self.id
///     }
///
///     fn kind(&self) -> &'static EntityKind {
///         &PRODUCT
///     }
///
///     fn encode(&self) -> DbResult<Vec<u8>> {
///         codec::to_cbor(self)
///     }
/// }
/// ```
pub trait Entity: AsAny + Send + Sync + fmt::Debug {
    /// Returns the entity's stable identifier.
    fn entity_id(&self) -> EntityId;

    /// Returns the static kind descriptor.
    fn kind(&self) -> &'static EntityKind;

    /// Encodes the current values.
    ///
    /// Must be deterministic. Merged-data entities encode merged values
    /// only while `merged_data_ignore` is false.
    fn encode(&self) -> DbResult<Vec<u8>>;

    /// Returns the merged-data capability, if the type has one.
    fn as_merged_data(&self) -> Option<&dyn MergedData> {
        None
    }

    /// Returns the mutable merged-data capability, if the type has one.
    fn as_merged_data_mut(&mut self) -> Option<&mut dyn MergedData> {
        None
    }
}

/// Shared handle to a tracked entity.
pub type EntityRef = Arc<RwLock<dyn Entity>>;

/// Returns the exact runtime type of an entity.
pub(crate) fn runtime_type_id(entity: &dyn Entity) -> TypeId {
    Any::type_id(entity.as_any())
}

#[cfg(test)]
mod tests {
    use super::*;

    static ROOT: EntityKind = EntityKind::new("Root");
    static OPTED_OUT: EntityKind = EntityKind::new("OptedOut")
        .derived_from(&ROOT)
        .not_hookable();
    static INHERITS_OPT_OUT: EntityKind = EntityKind::new("InheritsOptOut").derived_from(&OPTED_OUT);
    static OPTED_BACK_IN: EntityKind = EntityKind::new("OptedBackIn")
        .derived_from(&INHERITS_OPT_OUT)
        .hookable();

    #[test]
    fn unmarked_chain_is_hookable() {
        assert!(ROOT.resolve_hookable());
        assert_eq!(ROOT.marker(), None);
    }

    #[test]
    fn opt_out_is_inherited() {
        assert!(!OPTED_OUT.resolve_hookable());
        assert!(!INHERITS_OPT_OUT.resolve_hookable());
    }

    #[test]
    fn explicit_marker_overrides_ancestor() {
        assert!(OPTED_BACK_IN.resolve_hookable());
    }

    #[test]
    fn is_a_walks_bases() {
        assert!(OPTED_BACK_IN.is_a(&ROOT));
        assert!(INHERITS_OPT_OUT.is_a(&OPTED_OUT));
        assert!(!ROOT.is_a(&OPTED_OUT));
    }
}
