//! Commit pipeline integration checks.
//!
//! Each check drives a full commit through a [`DbContext`] and asserts on
//! what the hook handler and the store observed.

use crate::fixtures::{Product, TestContext};
use crate::recording::{Phase, RecordingHookHandler};
use cartdb_core::{DbContext, EntityState, SaveState};
use std::sync::Arc;

/// A context wired to a recording handler.
pub struct PipelineHarness {
    /// The context and its store.
    pub ctx: TestContext,
    /// The handler behind the context.
    pub handler: Arc<RecordingHookHandler>,
}

impl PipelineHarness {
    /// Creates a harness around `handler`.
    pub fn new(handler: RecordingHookHandler) -> Self {
        let handler = Arc::new(handler);
        Self {
            ctx: TestContext::with_handler(handler.clone()),
            handler,
        }
    }

    /// Creates a harness with a plain recording handler.
    pub fn recording() -> Self {
        Self::new(RecordingHookHandler::new())
    }
}

impl Default for PipelineHarness {
    fn default() -> Self {
        Self::recording()
    }
}

impl std::ops::Deref for PipelineHarness {
    type Target = DbContext;

    fn deref(&self) -> &Self::Target {
        &self.ctx.ctx
    }
}

/// Reusable pipeline checks.
pub mod checks {
    use super::*;

    /// Commits once and asserts the save state went back to idle and the
    /// auto-detect setting is unchanged.
    pub fn commit_restores_settings(ctx: &DbContext) {
        let auto_detect = ctx.tracker().auto_detect_changes();
        let _ = ctx.commit();
        assert_eq!(ctx.save_state(), SaveState::Idle);
        assert_eq!(ctx.tracker().auto_detect_changes(), auto_detect);
    }

    /// Asserts nothing is left pending.
    pub fn all_accepted(ctx: &DbContext) {
        assert!(
            ctx.tracker().pending_entries().is_empty(),
            "entries left pending after commit"
        );
    }

    /// Adds a product and returns it, for use inside hook scripts.
    pub fn add_product(ctx: &DbContext, name: &str) -> cartdb_core::DbResult<()> {
        ctx.add(&Product::shared(name, 1))?;
        Ok(())
    }

    /// Asserts every pre-commit call saw only entries that were pending.
    pub fn pre_commit_saw_pending_only(handler: &RecordingHookHandler) {
        for call in handler.calls_of(Phase::Saving) {
            assert!(call
                .entries
                .iter()
                .all(|e| e.initial_state > EntityState::Unchanged));
        }
    }
}
