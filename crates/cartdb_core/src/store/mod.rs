//! Backing stores for committed entities.
//!
//! A store is the hook-free write primitive underneath a commit. It
//! receives the pending entries, applies them, and reports how many rows
//! were affected. Stores never change entry states; the context accepts
//! changes after a successful write.

mod memory;

pub use memory::InMemoryEntityStore;

use crate::cancel::CancelToken;
use crate::entity::EntityEntry;
use crate::error::DbResult;
use crate::types::EntityState;
use async_trait::async_trait;

/// A write derived from a pending entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingWrite {
    /// Insert or update an entity.
    Put {
        /// Entity payload (CBOR bytes).
        payload: Vec<u8>,
    },
    /// Delete an entity.
    Delete,
}

impl PendingWrite {
    /// Builds the write for an entry, or `None` if the entry has nothing
    /// to write.
    pub fn for_entry(entry: &EntityEntry) -> DbResult<Option<Self>> {
        Ok(match entry.state() {
            EntityState::Added | EntityState::Modified => Some(Self::Put {
                payload: entry.encode()?,
            }),
            EntityState::Deleted => Some(Self::Delete),
            EntityState::Unchanged | EntityState::Detached => None,
        })
    }
}

/// Hook-free persistence of pending entries.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Writes the pending entries and returns the number of affected rows.
    fn save_changes(&self, entries: &[EntityEntry]) -> DbResult<usize>;

    /// Async variant of [`EntityStore::save_changes`].
    ///
    /// The default checks the token once and delegates to the sync write.
    async fn save_changes_async(
        &self,
        entries: &[EntityEntry],
        cancel: &CancelToken,
    ) -> DbResult<usize> {
        cancel.check()?;
        self.save_changes(entries)
    }
}
