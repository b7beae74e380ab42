//! # CartDB Core
//!
//! Entity persistence with a two-phase save hook pipeline.
//!
//! This crate provides:
//! - A change tracker with snapshot-based dirty detection
//! - A commit gateway that wraps every write with pre- and post-commit hooks
//! - Deterministic handling of commits issued from inside hooks
//! - An important-only mode that keeps mandatory hooks running while
//!   general hooking is switched off
//! - A hook-free entity store seam with an in-memory implementation
//!
//! ## Commit pipeline
//!
//! [`DbContext::commit`] creates a save operation, which suppresses
//! automatic change detection, detects changes once, runs pre-commit hooks,
//! writes through the [`EntityStore`], runs post-commit hooks and finally
//! restores the suppressed settings. A nested commit from a pre-commit hook
//! returns 0; one from a post-commit hook writes the newly pending entities
//! without hooks.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use cartdb_core::{DbContext, DefaultHookHandler, InMemoryEntityStore, SaveState};
//!
//! let ctx = DbContext::new(Arc::new(InMemoryEntityStore::new()))
//!     .with_hook_handler(Arc::new(DefaultHookHandler::new()));
//!
//! assert_eq!(ctx.save_state(), SaveState::Idle);
//! assert_eq!(ctx.commit().unwrap(), 0);
//! assert!(!ctx.is_in_save_operation());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cancel;
pub mod codec;
mod config;
mod context;
mod entity;
mod error;
mod hooks;
mod pool;
mod save;
mod store;
mod tracker;
mod types;

pub use cancel::CancelToken;
pub use config::ContextConfig;
pub use context::{DbContext, HooksScope};
pub use entity::{AsAny, Entity, EntityEntry, EntityId, EntityKind, EntityRef, EntryKey, MergedData};
pub use error::{DbError, DbResult};
pub use hooks::{
    DefaultHookHandler, HookOutcome, HookableEntityFilter, HookedEntity, NullHookHandler, SaveHook,
    SaveHookHandler, SavedChangesResult, SavingChangesResult,
};
pub use pool::{DbContextPool, PooledContext};
pub use store::{EntityStore, InMemoryEntityStore, PendingWrite};
pub use tracker::{AutoDetectChangesGuard, ChangeTracker, MergedDataIgnoreGuard};
pub use types::{EntityState, SaveState};
