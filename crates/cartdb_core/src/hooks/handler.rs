//! The hook handler seam of the commit pipeline.

use crate::cancel::CancelToken;
use crate::context::DbContext;
use crate::error::DbResult;
use crate::hooks::HookedEntity;
use async_trait::async_trait;

/// Result of the pre-commit hook call.
#[derive(Debug, Clone, Default)]
pub struct SavingChangesResult {
    /// Names of hooks that processed at least one entry.
    pub processed_hooks: Vec<String>,
    /// Entries forwarded to the post-commit phase.
    pub entries: Vec<HookedEntity>,
    /// True if a hook changed the state of any entry.
    pub any_state_changed: bool,
}

impl SavingChangesResult {
    /// Creates a result that forwards `entries` with no processed hooks.
    #[must_use]
    pub fn forward(entries: Vec<HookedEntity>) -> Self {
        Self {
            processed_hooks: Vec::new(),
            entries,
            any_state_changed: false,
        }
    }

    /// Returns true if any hook ran.
    #[must_use]
    pub fn hooks_ran(&self) -> bool {
        !self.processed_hooks.is_empty()
    }
}

/// Result of the post-commit hook call.
#[derive(Debug, Clone, Default)]
pub struct SavedChangesResult {
    /// Names of hooks that processed at least one entry.
    pub processed_hooks: Vec<String>,
}

/// Executes save hooks around a commit.
///
/// The context is passed so that hook code can track further entities and
/// issue reentrant commits. Implementations must not assume they are the
/// only caller on the stack: a post-commit hook may commit again, which
/// writes without calling back into the handler.
///
/// Only the sync methods are required. The async variants default to the
/// sync ones; override them when hooks need to await.
#[async_trait]
pub trait SaveHookHandler: Send + Sync {
    /// Returns true if at least one registered hook is important.
    fn has_important_save_hooks(&self) -> bool;

    /// Runs pre-commit hooks over `entries`.
    fn saving_changes(
        &self,
        ctx: &DbContext,
        entries: Vec<HookedEntity>,
        important_only: bool,
        cancel: &CancelToken,
    ) -> DbResult<SavingChangesResult>;

    /// Runs post-commit hooks over `entries`.
    fn saved_changes(
        &self,
        ctx: &DbContext,
        entries: Vec<HookedEntity>,
        important_only: bool,
        cancel: &CancelToken,
    ) -> DbResult<SavedChangesResult>;

    /// Async variant of [`SaveHookHandler::saving_changes`].
    async fn saving_changes_async(
        &self,
        ctx: &DbContext,
        entries: Vec<HookedEntity>,
        important_only: bool,
        cancel: &CancelToken,
    ) -> DbResult<SavingChangesResult> {
        self.saving_changes(ctx, entries, important_only, cancel)
    }

    /// Async variant of [`SaveHookHandler::saved_changes`].
    async fn saved_changes_async(
        &self,
        ctx: &DbContext,
        entries: Vec<HookedEntity>,
        important_only: bool,
        cancel: &CancelToken,
    ) -> DbResult<SavedChangesResult> {
        self.saved_changes(ctx, entries, important_only, cancel)
    }
}

/// A handler with no hooks.
///
/// Forwards entries unchanged and reports no processed hooks. Contexts use
/// it when no handler is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHookHandler;

impl SaveHookHandler for NullHookHandler {
    fn has_important_save_hooks(&self) -> bool {
        false
    }

    fn saving_changes(
        &self,
        _ctx: &DbContext,
        entries: Vec<HookedEntity>,
        _important_only: bool,
        _cancel: &CancelToken,
    ) -> DbResult<SavingChangesResult> {
        Ok(SavingChangesResult::forward(entries))
    }

    fn saved_changes(
        &self,
        _ctx: &DbContext,
        _entries: Vec<HookedEntity>,
        _important_only: bool,
        _cancel: &CancelToken,
    ) -> DbResult<SavedChangesResult> {
        Ok(SavedChangesResult::default())
    }
}
