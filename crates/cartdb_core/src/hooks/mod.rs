//! Save hooks and their execution.
//!
//! - [`SaveHookHandler`] is the seam the commit pipeline calls into
//! - [`DefaultHookHandler`] runs registered [`SaveHook`]s
//! - [`HookableEntityFilter`] decides which entries hooks may see

mod filter;
mod handler;
mod hooked;
mod registry;

pub use filter::HookableEntityFilter;
pub use handler::{NullHookHandler, SaveHookHandler, SavedChangesResult, SavingChangesResult};
pub use hooked::HookedEntity;
pub use registry::{DefaultHookHandler, HookOutcome, SaveHook};
