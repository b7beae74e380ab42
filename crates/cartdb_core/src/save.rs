//! The per-commit save operation.
//!
//! A save operation owns one top-level commit from start to finish:
//!
//! 1. Suppress automatic change detection
//! 2. Detect changes once (merged values ignored) and snapshot pending entries
//! 3. Run pre-commit hooks over the hookable part of the snapshot
//! 4. Issue the hook-free core write
//! 5. Move to `PostSave` and run post-commit hooks
//! 6. Restore auto-detection
//!
//! While the operation is alive the context reports `PreSave` or
//! `PostSave`, which is how reentrant commits from hook code are resolved.
//! Dropping the operation returns the context to `Idle` on every path.

use crate::cancel::CancelToken;
use crate::context::DbContext;
use crate::entity::EntityEntry;
use crate::error::{DbError, DbResult};
use crate::hooks::{HookedEntity, SavingChangesResult};
use crate::tracker::{AutoDetectChangesGuard, MergedDataIgnoreGuard};
use crate::types::{EntityState, SaveState};
use tracing::debug;

pub(crate) struct SaveOperation<'a> {
    ctx: &'a DbContext,
    changed_entries: Vec<EntityEntry>,
}

impl<'a> SaveOperation<'a> {
    /// Marks the context as saving.
    ///
    /// Fails if another operation is already active on the context.
    pub(crate) fn begin(ctx: &'a DbContext) -> DbResult<Self> {
        if !ctx.try_enter_save() {
            return Err(DbError::invalid_operation(
                "a save operation is already active on this context",
            ));
        }
        Ok(Self {
            ctx,
            changed_entries: Vec::new(),
        })
    }

    pub(crate) fn execute(&mut self, accept: bool, cancel: &CancelToken) -> DbResult<usize> {
        let _auto_detect = AutoDetectChangesGuard::suppress(self.ctx.tracker());
        self.snapshot()?;

        let pre = match self.pre_commit_entries()? {
            Some((entries, important_only)) => {
                let result = self.ctx.hook_handler().saving_changes(
                    self.ctx,
                    entries,
                    important_only,
                    cancel,
                )?;
                self.finish_pre_commit(result)?
            }
            None => SavingChangesResult::default(),
        };

        let affected = self.ctx.save_core(accept)?;

        if let Some(important_only) = self.enter_post_commit(&pre.entries) {
            self.ctx.hook_handler().saved_changes(
                self.ctx,
                pre.entries,
                important_only,
                cancel,
            )?;
        }
        Ok(affected)
    }

    pub(crate) async fn execute_async(
        &mut self,
        accept: bool,
        cancel: &CancelToken,
    ) -> DbResult<usize> {
        let _auto_detect = AutoDetectChangesGuard::suppress(self.ctx.tracker());
        self.snapshot()?;

        let pre = match self.pre_commit_entries()? {
            Some((entries, important_only)) => {
                let result = self
                    .ctx
                    .hook_handler()
                    .saving_changes_async(self.ctx, entries, important_only, cancel)
                    .await?;
                self.finish_pre_commit(result)?
            }
            None => SavingChangesResult::default(),
        };

        let affected = self.ctx.save_core_async(accept, cancel).await?;

        if let Some(important_only) = self.enter_post_commit(&pre.entries) {
            self.ctx
                .hook_handler()
                .saved_changes_async(self.ctx, pre.entries, important_only, cancel)
                .await?;
        }
        Ok(affected)
    }

    /// Detects changes once and captures the pending entries.
    fn snapshot(&mut self) -> DbResult<()> {
        let tracker = self.ctx.tracker();
        {
            let _merged = MergedDataIgnoreGuard::engage(&tracker.merged_data_entries());
            tracker.detect_changes()?;
        }
        self.changed_entries = tracker.pending_entries();
        debug!(entries = self.changed_entries.len(), "save operation started");
        Ok(())
    }

    /// Decides whether the pre-commit hooks run and wraps their input.
    ///
    /// Returns `None` when the handler must not be called.
    fn pre_commit_entries(&self) -> DbResult<Option<(Vec<HookedEntity>, bool)>> {
        if self.changed_entries.is_empty() {
            debug!("no pending changes, skipping pre-commit hooks");
            return Ok(None);
        }

        let important_only = self.ctx.important_only();
        if !self.ctx.hooks_enabled() && !important_only {
            debug!("hooks disabled, skipping pre-commit hooks");
            return Ok(None);
        }

        let filter = self.ctx.hookable_filter();
        let hooked: Vec<HookedEntity> = self
            .changed_entries
            .iter()
            .filter(|e| filter.is_entry_hookable(e))
            .cloned()
            .map(HookedEntity::new)
            .collect();
        if hooked.is_empty() {
            debug!("no hookable entries, skipping pre-commit hooks");
            return Ok(None);
        }

        debug!(entries = hooked.len(), important_only, "running pre-commit hooks");
        Ok(Some((hooked, important_only)))
    }

    fn finish_pre_commit(&self, mut result: SavingChangesResult) -> DbResult<SavingChangesResult> {
        // Hooks may have edited scalars of entries that were already modified.
        if result.hooks_ran()
            && self
                .changed_entries
                .iter()
                .any(|e| e.state() == EntityState::Modified)
        {
            self.ctx.tracker().detect_changes()?;
        }

        if result.any_state_changed {
            result
                .entries
                .retain(|e| e.initial_state() > EntityState::Unchanged);
        }
        Ok(result)
    }

    /// Moves to `PostSave` if there is anything to run post-commit hooks
    /// on, and returns the important-only flag for that call.
    fn enter_post_commit(&self, entries: &[HookedEntity]) -> Option<bool> {
        if entries.is_empty() {
            return None;
        }
        self.ctx.set_save_state(SaveState::PostSave);
        let important_only = self.ctx.important_only();
        debug!(entries = entries.len(), important_only, "running post-commit hooks");
        Some(important_only)
    }
}

impl Drop for SaveOperation<'_> {
    fn drop(&mut self) {
        self.changed_entries.clear();
        self.ctx.clear_outer_writes();
        self.ctx.set_save_state(SaveState::Idle);
    }
}
