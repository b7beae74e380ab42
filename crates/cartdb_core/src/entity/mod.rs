//! Entity types and tracked entries.

mod entry;
mod id;
mod kind;

pub use entry::{EntityEntry, EntryKey};
pub use id::EntityId;
pub use kind::{AsAny, Entity, EntityKind, EntityRef, MergedData};
