//! The session object: tracked entities plus the commit gateway.

use crate::cancel::CancelToken;
use crate::config::ContextConfig;
use crate::entity::{Entity, EntityEntry, EntryKey};
use crate::error::DbResult;
use crate::hooks::{HookableEntityFilter, NullHookHandler, SaveHookHandler};
use crate::save::SaveOperation;
use crate::store::EntityStore;
use crate::tracker::{ChangeTracker, MergedDataIgnoreGuard};
use crate::types::{EntityState, SaveState};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// A unit of work over an entity store.
///
/// The context tracks entities and commits their pending changes through a
/// two-phase hook pipeline. Hooks receive the context and may commit again
/// from inside a hook:
///
/// - During pre-commit hooks a nested commit returns 0 and writes nothing.
///   Entities tracked by the hook are written by the outer commit.
/// - During post-commit hooks a nested commit detects changes and writes
///   them directly, without running hooks again.
///
/// A context is meant for one logical operation at a time. It is `Sync` so
/// hook code can reach it, not so that independent callers can share it.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use cartdb_core::{codec, DbContext, DbResult, Entity, EntityId, EntityKind, InMemoryEntityStore};
/// use parking_lot::RwLock;
///
/// static TAG: EntityKind = EntityKind::new("Tag");
///
/// #[derive(Debug, serde::Serialize)]
/// struct Tag {
///     id: EntityId,
///     name: String,
/// }
///
/// impl Entity for Tag {
///     fn entity_id(&self) -> EntityId {
///         self.id
///     }
///
///     fn kind(&self) -> &'static EntityKind {
///         &TAG
///     }
///
///     fn encode(&self) -> DbResult<Vec<u8>> {
///         codec::to_cbor(self)
///     }
/// }
///
/// let store = Arc::new(InMemoryEntityStore::new());
/// let ctx = DbContext::new(store.clone());
///
/// let tag = Arc::new(RwLock::new(Tag { id: EntityId::new(), name: "sale".into() }));
/// ctx.add(&tag).unwrap();
/// assert_eq!(ctx.commit().unwrap(), 1);
///
/// tag.write().name = "clearance".into();
/// assert_eq!(ctx.commit().unwrap(), 1);
/// assert_eq!(ctx.commit().unwrap(), 0);
/// ```
pub struct DbContext {
    config: ContextConfig,
    tracker: ChangeTracker,
    store: Arc<dyn EntityStore>,
    hook_handler: Arc<dyn SaveHookHandler>,
    filter: &'static HookableEntityFilter,
    save_state: Mutex<SaveState>,
    /// Keys written but not accepted by the running save operation.
    outer_writes: Mutex<HashSet<EntryKey>>,
    hooks_enabled: AtomicBool,
}

impl DbContext {
    /// Creates a context with default configuration and no hooks.
    #[must_use]
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self::with_config(store, ContextConfig::default())
    }

    /// Creates a context with custom configuration and no hooks.
    #[must_use]
    pub fn with_config(store: Arc<dyn EntityStore>, config: ContextConfig) -> Self {
        Self {
            tracker: ChangeTracker::new(config.auto_detect_changes),
            hooks_enabled: AtomicBool::new(config.hooks_enabled),
            config,
            store,
            hook_handler: Arc::new(NullHookHandler),
            filter: HookableEntityFilter::global(),
            save_state: Mutex::new(SaveState::Idle),
            outer_writes: Mutex::new(HashSet::new()),
        }
    }

    /// Replaces the hook handler.
    #[must_use]
    pub fn with_hook_handler(mut self, handler: Arc<dyn SaveHookHandler>) -> Self {
        self.hook_handler = handler;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Returns the change tracker.
    #[must_use]
    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    /// Returns the backing store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    /// Returns the hook handler.
    #[must_use]
    pub fn hook_handler(&self) -> &Arc<dyn SaveHookHandler> {
        &self.hook_handler
    }

    pub(crate) fn hookable_filter(&self) -> &'static HookableEntityFilter {
        self.filter
    }

    // === Entities ===

    /// Tracks an already stored entity as unchanged.
    pub fn attach<T: Entity>(&self, entity: &Arc<RwLock<T>>) -> DbResult<EntityEntry> {
        self.tracker.attach(entity.clone())
    }

    /// Tracks a new entity as added.
    pub fn add<T: Entity>(&self, entity: &Arc<RwLock<T>>) -> DbResult<EntityEntry> {
        self.tracker.add(entity.clone())
    }

    /// Schedules a tracked entity for deletion.
    pub fn remove<T: Entity>(&self, entity: &Arc<RwLock<T>>) -> DbResult<EntityEntry> {
        self.tracker.remove(key_of(entity))
    }

    /// Returns the entry of a tracked entity.
    #[must_use]
    pub fn entry<T: Entity>(&self, entity: &Arc<RwLock<T>>) -> Option<EntityEntry> {
        self.tracker.entry(key_of(entity))
    }

    /// Returns the state of an entity, `Detached` if it is not tracked.
    #[must_use]
    pub fn state_of<T: Entity>(&self, entity: &Arc<RwLock<T>>) -> EntityState {
        self.tracker
            .state_of(key_of(entity))
            .unwrap_or(EntityState::Detached)
    }

    // === Hooks ===

    /// Returns true if save hooks run on commit.
    #[must_use]
    pub fn hooks_enabled(&self) -> bool {
        self.hooks_enabled.load(Ordering::SeqCst)
    }

    /// Enables or disables save hooks. Important hooks run regardless.
    pub fn set_hooks_enabled(&self, enabled: bool) {
        self.hooks_enabled.store(enabled, Ordering::SeqCst);
    }

    /// Overrides [`DbContext::hooks_enabled`] until the returned guard is
    /// dropped.
    pub fn hooks_scope(&self, enabled: bool) -> HooksScope<'_> {
        let prior = self.hooks_enabled();
        self.set_hooks_enabled(enabled);
        HooksScope { ctx: self, prior }
    }

    /// True iff hooks are disabled and the handler has important hooks.
    pub(crate) fn important_only(&self) -> bool {
        !self.hooks_enabled() && self.hook_handler.has_important_save_hooks()
    }

    // === Save state ===

    /// Returns the current save state.
    #[must_use]
    pub fn save_state(&self) -> SaveState {
        *self.save_state.lock()
    }

    /// Returns true while a commit is in progress.
    #[must_use]
    pub fn is_in_save_operation(&self) -> bool {
        self.save_state().is_active()
    }

    pub(crate) fn set_save_state(&self, state: SaveState) {
        *self.save_state.lock() = state;
    }

    /// Moves from `Idle` to `PreSave`. Returns false if not idle.
    pub(crate) fn try_enter_save(&self) -> bool {
        let mut state = self.save_state.lock();
        if *state != SaveState::Idle {
            return false;
        }
        *state = SaveState::PreSave;
        true
    }

    // === Commit ===

    /// Commits all pending changes and returns the number of affected rows.
    ///
    /// Accepts changes on success as configured.
    pub fn commit(&self) -> DbResult<usize> {
        self.commit_with(self.config.accept_changes_on_success)
    }

    /// Commits all pending changes.
    ///
    /// With `accept_changes_on_success` the written entries become
    /// unchanged (deleted ones detached); otherwise they stay pending.
    pub fn commit_with(&self, accept_changes_on_success: bool) -> DbResult<usize> {
        let result = match self.save_state() {
            SaveState::Idle => {
                let cancel = CancelToken::new();
                SaveOperation::begin(self)
                    .and_then(|mut op| op.execute(accept_changes_on_success, &cancel))
            }
            SaveState::PreSave => {
                debug!("commit requested during pre-commit hooks, deferring to outer write");
                Ok(0)
            }
            SaveState::PostSave => self.commit_inline(accept_changes_on_success),
        };
        if let Err(err) = &result {
            warn!(error = %err, "commit failed");
        }
        result
    }

    /// Async variant of [`DbContext::commit`].
    pub async fn commit_async(&self, cancel: &CancelToken) -> DbResult<usize> {
        self.commit_async_with(cancel, self.config.accept_changes_on_success)
            .await
    }

    /// Async variant of [`DbContext::commit_with`].
    ///
    /// The token is passed to the hook handler and the store. Hook edits
    /// made before cancellation are kept in memory.
    pub async fn commit_async_with(
        &self,
        cancel: &CancelToken,
        accept_changes_on_success: bool,
    ) -> DbResult<usize> {
        let result = match self.save_state() {
            SaveState::Idle => match SaveOperation::begin(self) {
                Ok(mut op) => op.execute_async(accept_changes_on_success, cancel).await,
                Err(err) => Err(err),
            },
            SaveState::PreSave => {
                debug!("commit requested during pre-commit hooks, deferring to outer write");
                Ok(0)
            }
            SaveState::PostSave => {
                self.commit_inline_async(accept_changes_on_success, cancel)
                    .await
            }
        };
        if let Err(err) = &result {
            warn!(error = %err, "commit failed");
        }
        result
    }

    /// Hook-free commit used from post-commit hooks.
    ///
    /// Entries handed to the outer core write are skipped, even when the
    /// outer commit left them pending.
    fn commit_inline(&self, accept: bool) -> DbResult<usize> {
        self.tracker.detect_changes()?;
        let pending = self.inline_entries();
        let affected = self.write_entries(&pending, accept)?;
        debug!(affected, "inline commit during post-commit hooks");
        Ok(affected)
    }

    async fn commit_inline_async(&self, accept: bool, cancel: &CancelToken) -> DbResult<usize> {
        self.tracker.detect_changes()?;
        let pending = self.inline_entries();
        let affected = self.write_entries_async(&pending, accept, cancel).await?;
        debug!(affected, "inline commit during post-commit hooks");
        Ok(affected)
    }

    fn inline_entries(&self) -> Vec<EntityEntry> {
        let pending = self.tracker.pending_entries();
        let written = self.outer_writes.lock();
        pending
            .into_iter()
            .filter(|e| !written.contains(&e.key()))
            .collect()
    }

    /// Writes all pending entries to the store without running hooks.
    ///
    /// Entries left pending by the write are remembered so that inline
    /// commits from post-commit hooks do not write them again.
    pub(crate) fn save_core(&self, accept: bool) -> DbResult<usize> {
        let pending = self.tracker.pending_entries();
        let affected = self.write_entries(&pending, accept)?;
        if !accept {
            self.record_outer_writes(&pending);
        }
        Ok(affected)
    }

    pub(crate) async fn save_core_async(
        &self,
        accept: bool,
        cancel: &CancelToken,
    ) -> DbResult<usize> {
        let pending = self.tracker.pending_entries();
        let affected = self.write_entries_async(&pending, accept, cancel).await?;
        if !accept {
            self.record_outer_writes(&pending);
        }
        Ok(affected)
    }

    fn write_entries(&self, pending: &[EntityEntry], accept: bool) -> DbResult<usize> {
        let affected = {
            let _merged = MergedDataIgnoreGuard::engage(pending);
            self.store.save_changes(pending)?
        };
        self.finish_core(pending, affected, accept)
    }

    async fn write_entries_async(
        &self,
        pending: &[EntityEntry],
        accept: bool,
        cancel: &CancelToken,
    ) -> DbResult<usize> {
        let affected = {
            let _merged = MergedDataIgnoreGuard::engage(pending);
            self.store.save_changes_async(pending, cancel).await?
        };
        self.finish_core(pending, affected, accept)
    }

    fn finish_core(&self, pending: &[EntityEntry], affected: usize, accept: bool) -> DbResult<usize> {
        if accept {
            self.tracker.accept_changes(pending)?;
        }
        debug!(affected, "core write finished");
        Ok(affected)
    }

    fn record_outer_writes(&self, written: &[EntityEntry]) {
        *self.outer_writes.lock() = written.iter().map(EntityEntry::key).collect();
    }

    pub(crate) fn clear_outer_writes(&self) {
        self.outer_writes.lock().clear();
    }

    // === Pooling ===

    /// Restores the context to its configured defaults.
    ///
    /// Clears the save state, the hook override, the auto-detect setting
    /// and all tracked entities.
    pub fn reset_for_reuse(&self) {
        self.set_save_state(SaveState::Idle);
        self.clear_outer_writes();
        self.set_hooks_enabled(self.config.hooks_enabled);
        self.tracker
            .set_auto_detect_changes(self.config.auto_detect_changes);
        self.tracker.clear();
    }
}

fn key_of<T: Entity>(entity: &Arc<RwLock<T>>) -> EntryKey {
    let guard = entity.read();
    (guard.kind().name(), guard.entity_id())
}

impl fmt::Debug for DbContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbContext")
            .field("save_state", &self.save_state())
            .field("hooks_enabled", &self.hooks_enabled())
            .field("tracked", &self.tracker.len())
            .finish_non_exhaustive()
    }
}

/// Restores the hook setting of a context when dropped.
pub struct HooksScope<'a> {
    ctx: &'a DbContext,
    prior: bool,
}

impl Drop for HooksScope<'_> {
    fn drop(&mut self) {
        self.ctx.set_hooks_enabled(self.prior);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::entity::{EntityId, EntityKind};
    use crate::error::DbError;
    use crate::hooks::{
        DefaultHookHandler, HookOutcome, HookedEntity, SaveHook, SavedChangesResult,
        SavingChangesResult,
    };
    use crate::store::InMemoryEntityStore;
    use proptest::prelude::*;
    use serde::Serialize;

    static ITEM: EntityKind = EntityKind::new("Item");
    static JOURNAL: EntityKind = EntityKind::new("Journal").not_hookable();

    #[derive(Debug, Serialize)]
    struct Item {
        id: EntityId,
        qty: u32,
    }

    impl Entity for Item {
        fn entity_id(&self) -> EntityId {
            self.id
        }

        fn kind(&self) -> &'static EntityKind {
            &ITEM
        }

        fn encode(&self) -> DbResult<Vec<u8>> {
            codec::to_cbor(self)
        }
    }

    #[derive(Debug, Serialize)]
    struct Journal {
        id: EntityId,
    }

    impl Entity for Journal {
        fn entity_id(&self) -> EntityId {
            self.id
        }

        fn kind(&self) -> &'static EntityKind {
            &JOURNAL
        }

        fn encode(&self) -> DbResult<Vec<u8>> {
            codec::to_cbor(self)
        }
    }

    fn item(qty: u32) -> Arc<RwLock<Item>> {
        Arc::new(RwLock::new(Item {
            id: EntityId::new(),
            qty,
        }))
    }

    /// Records every handler call as (phase, entry count, important_only).
    #[derive(Default)]
    struct Recorder {
        important: bool,
        calls: Mutex<Vec<(&'static str, usize, bool)>>,
    }

    impl SaveHookHandler for Recorder {
        fn has_important_save_hooks(&self) -> bool {
            self.important
        }

        fn saving_changes(
            &self,
            _ctx: &DbContext,
            entries: Vec<HookedEntity>,
            important_only: bool,
            _cancel: &CancelToken,
        ) -> DbResult<SavingChangesResult> {
            self.calls.lock().push(("saving", entries.len(), important_only));
            Ok(SavingChangesResult::forward(entries))
        }

        fn saved_changes(
            &self,
            _ctx: &DbContext,
            entries: Vec<HookedEntity>,
            important_only: bool,
            _cancel: &CancelToken,
        ) -> DbResult<SavedChangesResult> {
            self.calls.lock().push(("saved", entries.len(), important_only));
            Ok(SavedChangesResult::default())
        }
    }

    fn recorded(important: bool) -> (DbContext, Arc<Recorder>, Arc<InMemoryEntityStore>) {
        let store = Arc::new(InMemoryEntityStore::new());
        let recorder = Arc::new(Recorder {
            important,
            ..Recorder::default()
        });
        let ctx = DbContext::new(store.clone()).with_hook_handler(recorder.clone());
        (ctx, recorder, store)
    }

    #[test]
    fn commit_writes_and_accepts() {
        let store = Arc::new(InMemoryEntityStore::new());
        let ctx = DbContext::new(store.clone());
        let a = item(1);
        let b = item(2);
        ctx.add(&a).unwrap();
        ctx.add(&b).unwrap();
        assert_eq!(ctx.commit().unwrap(), 2);
        assert_eq!(ctx.state_of(&a), EntityState::Unchanged);

        a.write().qty = 10;
        ctx.remove(&b).unwrap();
        assert_eq!(ctx.commit().unwrap(), 2);
        assert_eq!(ctx.state_of(&b), EntityState::Detached);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn commit_without_accept_keeps_changes_pending() {
        let ctx = DbContext::new(Arc::new(InMemoryEntityStore::new()));
        let a = item(1);
        ctx.add(&a).unwrap();
        assert_eq!(ctx.commit_with(false).unwrap(), 1);
        assert_eq!(ctx.state_of(&a), EntityState::Added);
        assert_eq!(ctx.commit().unwrap(), 1);
        assert_eq!(ctx.state_of(&a), EntityState::Unchanged);
    }

    #[test]
    fn empty_snapshot_skips_handler() {
        let (ctx, recorder, store) = recorded(false);
        assert_eq!(ctx.commit().unwrap(), 0);
        assert!(recorder.calls.lock().is_empty());
        assert_eq!(store.write_calls(), 1);
    }

    #[test]
    fn both_phases_see_hookable_entries() {
        let (ctx, recorder, _store) = recorded(false);
        ctx.add(&item(1)).unwrap();
        ctx.add(&item(2)).unwrap();
        ctx.add(&Arc::new(RwLock::new(Journal { id: EntityId::new() })))
            .unwrap();

        assert_eq!(ctx.commit().unwrap(), 3);
        assert_eq!(
            *recorder.calls.lock(),
            vec![("saving", 2, false), ("saved", 2, false)]
        );
    }

    #[test]
    fn disabled_hooks_without_important_hooks_skip_handler() {
        let (ctx, recorder, _store) = recorded(false);
        ctx.set_hooks_enabled(false);
        ctx.add(&item(1)).unwrap();
        assert_eq!(ctx.commit().unwrap(), 1);
        assert!(recorder.calls.lock().is_empty());
    }

    #[test]
    fn disabled_hooks_with_important_hooks_run_important_only() {
        let (ctx, recorder, _store) = recorded(true);
        let _scope = ctx.hooks_scope(false);
        ctx.add(&item(1)).unwrap();
        ctx.commit().unwrap();
        assert_eq!(
            *recorder.calls.lock(),
            vec![("saving", 1, true), ("saved", 1, true)]
        );
    }

    #[test]
    fn hooks_scope_restores_setting() {
        let (ctx, _recorder, _store) = recorded(false);
        {
            let _scope = ctx.hooks_scope(false);
            assert!(!ctx.hooks_enabled());
        }
        assert!(ctx.hooks_enabled());
    }

    /// Adds one item and commits from inside the hook, recording the result.
    #[derive(Default)]
    struct NestedCommit {
        post: bool,
        fired: AtomicBool,
        nested: Mutex<Vec<(SaveState, usize)>>,
    }

    impl NestedCommit {
        fn run(&self, ctx: &DbContext) -> DbResult<HookOutcome> {
            if !self.fired.swap(true, Ordering::SeqCst) {
                ctx.add(&item(99))?;
                let state = ctx.save_state();
                let affected = ctx.commit()?;
                self.nested.lock().push((state, affected));
            }
            Ok(HookOutcome::Ok)
        }
    }

    impl SaveHook for Arc<NestedCommit> {
        fn name(&self) -> &str {
            "nested-commit"
        }

        fn on_saving(&self, ctx: &DbContext, _entry: &HookedEntity) -> DbResult<HookOutcome> {
            if self.post {
                return Ok(HookOutcome::Ok);
            }
            self.run(ctx)
        }

        fn on_saved(&self, ctx: &DbContext, _entry: &HookedEntity) -> DbResult<HookOutcome> {
            if !self.post {
                return Ok(HookOutcome::Ok);
            }
            self.run(ctx)
        }
    }

    fn nested_context(post: bool) -> (DbContext, Arc<NestedCommit>, Arc<InMemoryEntityStore>) {
        let store = Arc::new(InMemoryEntityStore::new());
        let hook = Arc::new(NestedCommit {
            post,
            ..NestedCommit::default()
        });
        let handler = DefaultHookHandler::new().register(hook.clone());
        let ctx = DbContext::new(store.clone()).with_hook_handler(Arc::new(handler));
        (ctx, hook, store)
    }

    #[test]
    fn nested_commit_in_pre_save_defers_to_outer_write() {
        let (ctx, hook, store) = nested_context(false);
        ctx.add(&item(1)).unwrap();

        assert_eq!(ctx.commit().unwrap(), 2);
        assert_eq!(*hook.nested.lock(), vec![(SaveState::PreSave, 0)]);
        assert_eq!(store.write_calls(), 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn nested_commit_in_post_save_writes_inline() {
        let (ctx, hook, store) = nested_context(true);
        ctx.add(&item(1)).unwrap();

        assert_eq!(ctx.commit().unwrap(), 1);
        assert_eq!(*hook.nested.lock(), vec![(SaveState::PostSave, 1)]);
        assert_eq!(store.write_calls(), 2);
        assert_eq!(store.len(), 2);
        assert!(ctx.tracker().pending_entries().is_empty());
    }

    #[test]
    fn nested_commit_in_post_save_skips_unaccepted_outer_entries() {
        let (ctx, hook, store) = nested_context(true);
        let outer: Vec<_> = (0..3).map(item).collect();
        for entity in &outer {
            ctx.add(entity).unwrap();
        }

        assert_eq!(ctx.commit_with(false).unwrap(), 3);
        assert_eq!(*hook.nested.lock(), vec![(SaveState::PostSave, 1)]);
        assert_eq!(store.len(), 4);
        for entity in &outer {
            assert_eq!(ctx.state_of(entity), EntityState::Added);
        }
        assert_eq!(ctx.tracker().pending_entries().len(), 3);

        // The next commit writes the entries left pending.
        assert_eq!(ctx.commit().unwrap(), 3);
        assert!(ctx.tracker().pending_entries().is_empty());
    }

    #[tokio::test]
    async fn async_nested_commit_in_post_save_skips_unaccepted_outer_entries() {
        let (ctx, hook, store) = nested_context(true);
        let outer: Vec<_> = (0..3).map(item).collect();
        for entity in &outer {
            ctx.add(entity).unwrap();
        }

        let affected = ctx
            .commit_async_with(&CancelToken::new(), false)
            .await
            .unwrap();
        assert_eq!(affected, 3);
        assert_eq!(*hook.nested.lock(), vec![(SaveState::PostSave, 1)]);
        assert_eq!(store.write_calls(), 2);
        for entity in &outer {
            assert_eq!(ctx.state_of(entity), EntityState::Added);
        }
    }

    struct Failing;

    impl SaveHook for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn on_saving(&self, _ctx: &DbContext, _entry: &HookedEntity) -> DbResult<HookOutcome> {
            Err(DbError::hook_failed("failing", "rejected"))
        }
    }

    #[test]
    fn hook_error_propagates_and_resets_state() {
        let store = Arc::new(InMemoryEntityStore::new());
        let ctx = DbContext::new(store.clone())
            .with_hook_handler(Arc::new(DefaultHookHandler::new().register(Failing)));
        ctx.add(&item(1)).unwrap();

        let err = ctx.commit().unwrap_err();
        assert!(matches!(err, DbError::HookFailed { ref hook, .. } if hook == "failing"));
        assert_eq!(ctx.save_state(), SaveState::Idle);
        assert!(ctx.tracker().auto_detect_changes());
        assert_eq!(store.write_calls(), 0);
    }

    #[test]
    fn store_error_propagates_and_keeps_changes() {
        let store = Arc::new(InMemoryEntityStore::new());
        let ctx = DbContext::new(store.clone());
        let a = item(1);
        ctx.add(&a).unwrap();
        store.fail_next_write("offline");

        assert!(matches!(ctx.commit(), Err(DbError::Store { .. })));
        assert_eq!(ctx.state_of(&a), EntityState::Added);
        assert!(!ctx.is_in_save_operation());
        assert_eq!(ctx.commit().unwrap(), 1);
    }

    #[test]
    fn begin_rejects_second_operation() {
        let ctx = DbContext::new(Arc::new(InMemoryEntityStore::new()));
        let _first = SaveOperation::begin(&ctx).unwrap();
        assert!(matches!(
            SaveOperation::begin(&ctx),
            Err(DbError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn reset_for_reuse_restores_defaults() {
        let ctx = DbContext::new(Arc::new(InMemoryEntityStore::new()));
        ctx.add(&item(1)).unwrap();
        ctx.set_hooks_enabled(false);
        ctx.set_save_state(SaveState::PreSave);

        ctx.reset_for_reuse();

        assert!(ctx.hooks_enabled());
        assert!(!ctx.is_in_save_operation());
        assert!(ctx.tracker().is_empty());
    }

    #[tokio::test]
    async fn async_commit_runs_both_phases() {
        let (ctx, recorder, store) = recorded(false);
        ctx.add(&item(1)).unwrap();
        let affected = ctx.commit_async(&CancelToken::new()).await.unwrap();
        assert_eq!(affected, 1);
        assert_eq!(recorder.calls.lock().len(), 2);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn cancelled_async_commit_writes_nothing() {
        let store = Arc::new(InMemoryEntityStore::new());
        let ctx = DbContext::new(store.clone());
        let a = item(1);
        ctx.add(&a).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = ctx.commit_async(&cancel).await;
        assert!(matches!(result, Err(DbError::Cancelled)));
        assert!(store.is_empty());
        assert_eq!(ctx.state_of(&a), EntityState::Added);
        assert_eq!(ctx.save_state(), SaveState::Idle);
    }

    proptest! {
        #[test]
        fn auto_detect_survives_commit(initial in any::<bool>(), fail in any::<bool>()) {
            let store = Arc::new(InMemoryEntityStore::new());
            let ctx = DbContext::with_config(
                store.clone(),
                ContextConfig::default().auto_detect_changes(initial),
            );
            ctx.add(&item(1)).unwrap();
            if fail {
                store.fail_next_write("forced");
            }
            let result = ctx.commit();
            prop_assert_eq!(result.is_err(), fail);
            prop_assert_eq!(ctx.tracker().auto_detect_changes(), initial);
        }
    }
}
