//! Property-based test generators using proptest.

use crate::fixtures::{ActivityLog, Product, Shared};
use cartdb_core::{DbContext, DbResult, EntityId, EntityState};
use proptest::prelude::*;

/// Strategy for generating entity IDs.
pub fn entity_id_strategy() -> impl Strategy<Value = EntityId> {
    prop::array::uniform16(any::<u8>()).prop_map(EntityId::from_bytes)
}

/// Strategy for generating product names.
pub fn product_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9 ]{0,23}").expect("Invalid regex")
}

/// What happens to one product before a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// Tracked as new.
    Add,
    /// Stored, then edited.
    Modify,
    /// Stored, then removed.
    Delete,
    /// Stored and left alone.
    Keep,
    /// Stored, then edited and changed back.
    Revert,
}

impl Change {
    /// Returns the state the change leaves the entry in after detection.
    pub fn expected_state(self) -> EntityState {
        match self {
            Self::Add => EntityState::Added,
            Self::Modify => EntityState::Modified,
            Self::Delete => EntityState::Deleted,
            Self::Keep | Self::Revert => EntityState::Unchanged,
        }
    }
}

/// Strategy for a single change.
pub fn change_strategy() -> impl Strategy<Value = Change> {
    prop_oneof![
        Just(Change::Add),
        Just(Change::Modify),
        Just(Change::Delete),
        Just(Change::Keep),
        Just(Change::Revert),
    ]
}

/// Strategy for a change set of up to `max` products, each optionally
/// paired with a non-hookable log record.
pub fn change_set_strategy(max: usize) -> impl Strategy<Value = Vec<(Change, bool)>> {
    prop::collection::vec((change_strategy(), any::<bool>()), 0..=max)
}

/// Products and log records staged on a context.
#[derive(Debug, Default)]
pub struct StagedChanges {
    /// Staged products with their changes.
    pub products: Vec<(Change, Shared<Product>)>,
    /// Added log records.
    pub logs: Vec<Shared<ActivityLog>>,
}

impl StagedChanges {
    /// Returns the number of products with a pending change.
    pub fn pending_products(&self) -> usize {
        self.products
            .iter()
            .filter(|(c, _)| c.expected_state() > EntityState::Unchanged)
            .count()
    }

    /// Returns the number of rows the next commit should affect.
    pub fn expected_rows(&self) -> usize {
        self.pending_products() + self.logs.len()
    }
}

/// Applies a generated change set to `ctx`.
///
/// Stored products are committed first, then edited as described.
pub fn stage(ctx: &DbContext, changes: &[(Change, bool)]) -> DbResult<StagedChanges> {
    let mut staged = StagedChanges::default();
    for (i, (change, _)) in changes.iter().enumerate() {
        let product = Product::shared(&format!("product {i}"), 100 + i as u64);
        if *change != Change::Add {
            ctx.add(&product)?;
        }
        staged.products.push((*change, product));
    }
    ctx.commit()?;

    for (change, product) in &staged.products {
        match change {
            Change::Add => {
                ctx.add(product)?;
            }
            Change::Modify => product.write().stock += 1,
            Change::Delete => {
                ctx.remove(product)?;
            }
            Change::Revert => {
                product.write().stock += 1;
                product.write().stock -= 1;
            }
            Change::Keep => {}
        }
    }
    for (i, (_, log)) in changes.iter().enumerate() {
        if *log {
            let record = ActivityLog::shared(&format!("change {i}"));
            ctx.add(&record)?;
            staged.logs.push(record);
        }
    }
    Ok(staged)
}
