//! Test entities and context helpers.
//!
//! The entities model a small shop: products, orders, product variants
//! with merged (virtualized) prices, and activity log records that opt out
//! of hooks through their base kind.

use cartdb_core::{
    codec, DbContext, DbResult, Entity, EntityId, EntityKind, InMemoryEntityStore, MergedData,
    SaveHookHandler,
};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

/// Kind of [`Product`].
pub static PRODUCT: EntityKind = EntityKind::new("Product");
/// Kind of [`Order`].
pub static ORDER: EntityKind = EntityKind::new("Order");
/// Kind of [`ProductVariant`].
pub static PRODUCT_VARIANT: EntityKind = EntityKind::new("ProductVariant").derived_from(&PRODUCT);
/// Base kind of all log records; excluded from hooks.
pub static LOG_ENTRY: EntityKind = EntityKind::new("LogEntry").not_hookable();
/// Kind of [`ActivityLog`]; inherits the opt-out of [`LOG_ENTRY`].
pub static ACTIVITY_LOG: EntityKind = EntityKind::new("ActivityLog").derived_from(&LOG_ENTRY);

/// Shared handle to a test entity.
pub type Shared<T> = Arc<RwLock<T>>;

/// A catalog product.
#[derive(Debug, Clone, Serialize)]
pub struct Product {
    /// Entity ID.
    pub id: EntityId,
    /// Display name.
    pub name: String,
    /// Price in cents.
    pub price: u64,
    /// Units in stock.
    pub stock: u32,
}

impl Product {
    /// Creates a shared product with a fresh ID.
    pub fn shared(name: &str, price: u64) -> Shared<Self> {
        Arc::new(RwLock::new(Self {
            id: EntityId::new(),
            name: name.to_string(),
            price,
            stock: 0,
        }))
    }
}

impl Entity for Product {
    fn entity_id(&self) -> EntityId {
        self.id
    }

    fn kind(&self) -> &'static EntityKind {
        &PRODUCT
    }

    fn encode(&self) -> DbResult<Vec<u8>> {
        codec::to_cbor(self)
    }
}

/// A customer order.
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    /// Entity ID.
    pub id: EntityId,
    /// Ordered product.
    pub product_id: EntityId,
    /// Ordered quantity.
    pub quantity: u32,
    /// Order total in cents, filled in by hooks.
    pub total: u64,
}

impl Order {
    /// Creates a shared order with a fresh ID.
    pub fn shared(product_id: EntityId, quantity: u32) -> Shared<Self> {
        Arc::new(RwLock::new(Self {
            id: EntityId::new(),
            product_id,
            quantity,
            total: 0,
        }))
    }
}

impl Entity for Order {
    fn entity_id(&self) -> EntityId {
        self.id
    }

    fn kind(&self) -> &'static EntityKind {
        &ORDER
    }

    fn encode(&self) -> DbResult<Vec<u8>> {
        codec::to_cbor(self)
    }
}

/// A product variant whose price can be overlaid by an attribute
/// combination.
///
/// While merged data is not ignored, [`ProductVariant::effective_price`]
/// and the encoding report the merged price.
#[derive(Debug, Clone)]
pub struct ProductVariant {
    /// Entity ID.
    pub id: EntityId,
    /// Stored price in cents.
    pub price: u64,
    /// Price of the selected combination, if any.
    pub merged_price: Option<u64>,
    merged_data_ignore: bool,
}

impl ProductVariant {
    /// Creates a shared variant with a fresh ID.
    pub fn shared(price: u64) -> Shared<Self> {
        Arc::new(RwLock::new(Self {
            id: EntityId::new(),
            price,
            merged_price: None,
            merged_data_ignore: false,
        }))
    }

    /// Returns the price currently reported by the entity.
    pub fn effective_price(&self) -> u64 {
        match self.merged_price {
            Some(merged) if !self.merged_data_ignore => merged,
            _ => self.price,
        }
    }
}

impl MergedData for ProductVariant {
    fn merged_data_ignore(&self) -> bool {
        self.merged_data_ignore
    }

    fn set_merged_data_ignore(&mut self, ignore: bool) {
        self.merged_data_ignore = ignore;
    }
}

impl Entity for ProductVariant {
    fn entity_id(&self) -> EntityId {
        self.id
    }

    fn kind(&self) -> &'static EntityKind {
        &PRODUCT_VARIANT
    }

    fn encode(&self) -> DbResult<Vec<u8>> {
        codec::to_cbor(&(self.id, self.effective_price()))
    }

    fn as_merged_data(&self) -> Option<&dyn MergedData> {
        Some(self)
    }

    fn as_merged_data_mut(&mut self) -> Option<&mut dyn MergedData> {
        Some(self)
    }
}

/// An activity log record. Never passed to hooks.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityLog {
    /// Entity ID.
    pub id: EntityId,
    /// Log message.
    pub message: String,
}

impl ActivityLog {
    /// Creates a shared log record with a fresh ID.
    pub fn shared(message: &str) -> Shared<Self> {
        Arc::new(RwLock::new(Self {
            id: EntityId::new(),
            message: message.to_string(),
        }))
    }
}

impl Entity for ActivityLog {
    fn entity_id(&self) -> EntityId {
        self.id
    }

    fn kind(&self) -> &'static EntityKind {
        &ACTIVITY_LOG
    }

    fn encode(&self) -> DbResult<Vec<u8>> {
        codec::to_cbor(self)
    }
}

/// A context over a fresh in-memory store.
pub struct TestContext {
    /// The context.
    pub ctx: DbContext,
    /// The store behind the context.
    pub store: Arc<InMemoryEntityStore>,
}

impl TestContext {
    /// Creates a context with no hooks.
    pub fn new() -> Self {
        let store = Arc::new(InMemoryEntityStore::new());
        Self {
            ctx: DbContext::new(store.clone()),
            store,
        }
    }

    /// Creates a context using `handler`.
    pub fn with_handler(handler: Arc<dyn SaveHookHandler>) -> Self {
        let store = Arc::new(InMemoryEntityStore::new());
        Self {
            ctx: DbContext::new(store.clone()).with_hook_handler(handler),
            store,
        }
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestContext {
    type Target = DbContext;

    fn deref(&self) -> &Self::Target {
        &self.ctx
    }
}

/// Installs a tracing subscriber that honors `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// One added and two modified products, ready to commit.
    pub struct ThreeChanges {
        /// The added product.
        pub added: Shared<Product>,
        /// The modified products.
        pub modified: [Shared<Product>; 2],
    }

    /// Stores two products, edits them and adds a third.
    pub fn three_changes(ctx: &DbContext) -> ThreeChanges {
        let modified = [Product::shared("kettle", 2_500), Product::shared("mug", 900)];
        for product in &modified {
            ctx.add(product).expect("Failed to add product");
        }
        ctx.commit().expect("Failed to store products");

        for product in &modified {
            product.write().price += 100;
        }
        let added = Product::shared("teapot", 3_900);
        ctx.add(&added).expect("Failed to add product");

        ThreeChanges { added, modified }
    }
}
