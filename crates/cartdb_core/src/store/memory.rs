//! In-memory entity store for testing.

use crate::entity::{EntityEntry, EntityId, EntryKey};
use crate::error::{DbError, DbResult};
use crate::store::{EntityStore, PendingWrite};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// An in-memory entity store.
///
/// Rows are keyed by entity kind name and entity ID and hold the CBOR
/// payload of the last write. The store counts write calls and can be
/// told to fail the next write, which makes it suitable for:
/// - Unit tests
/// - Integration tests of the commit pipeline
///
/// # Example
///
/// ```rust
/// use cartdb_core::{EntityStore, InMemoryEntityStore};
///
/// let store = InMemoryEntityStore::new();
/// assert_eq!(store.save_changes(&[]).unwrap(), 0);
/// assert_eq!(store.write_calls(), 1);
/// assert!(store.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct InMemoryEntityStore {
    rows: RwLock<HashMap<EntryKey, Vec<u8>>>,
    write_calls: AtomicU64,
    fail_next: Mutex<Option<String>>,
}

impl InMemoryEntityStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored payload of an entity.
    #[must_use]
    pub fn get(&self, kind: &str, id: EntityId) -> Option<Vec<u8>> {
        self.rows
            .read()
            .iter()
            .find(|((k, i), _)| *k == kind && *i == id)
            .map(|(_, payload)| payload.clone())
    }

    /// Returns true if a row exists for the entity.
    #[must_use]
    pub fn contains(&self, kind: &str, id: EntityId) -> bool {
        self.get(kind, id).is_some()
    }

    /// Returns the number of stored rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Returns true if no rows are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Returns how many times `save_changes` was called.
    #[must_use]
    pub fn write_calls(&self) -> u64 {
        self.write_calls.load(Ordering::SeqCst)
    }

    /// Makes the next write fail with a store error.
    pub fn fail_next_write(&self, message: impl Into<String>) {
        *self.fail_next.lock() = Some(message.into());
    }
}

impl EntityStore for InMemoryEntityStore {
    fn save_changes(&self, entries: &[EntityEntry]) -> DbResult<usize> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.fail_next.lock().take() {
            return Err(DbError::store(message));
        }

        // Encode all writes before applying any.
        let mut writes = Vec::with_capacity(entries.len());
        for entry in entries {
            if let Some(write) = PendingWrite::for_entry(entry)? {
                writes.push((entry.key(), write));
            }
        }

        let mut rows = self.rows.write();
        for (key, write) in &writes {
            trace!(kind = key.0, id = %key.1, "applying write");
            match write {
                PendingWrite::Put { payload } => {
                    rows.insert(*key, payload.clone());
                }
                PendingWrite::Delete => {
                    rows.remove(key);
                }
            }
        }
        Ok(writes.len())
    }
}
