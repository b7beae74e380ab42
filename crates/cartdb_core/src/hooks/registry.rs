//! Registry-based hook handler.

use crate::cancel::CancelToken;
use crate::context::DbContext;
use crate::error::DbResult;
use crate::hooks::{HookedEntity, SaveHookHandler, SavedChangesResult, SavingChangesResult};
use crate::types::{EntityState, SaveState};
use parking_lot::RwLock;
use std::any::TypeId;
use std::collections::HashSet;
use std::fmt;
use tracing::trace;

/// What a hook did with an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOutcome {
    /// The hook processed the entry.
    Ok,
    /// The hook has nothing to do for entries of this type and state.
    ///
    /// The handler remembers the combination and stops offering it.
    Void,
}

/// Business logic run before and after a commit.
///
/// Every callback defaults to doing nothing, so a hook implements only the
/// phases it cares about.
pub trait SaveHook: Send + Sync {
    /// Returns the name reported in processed hook lists.
    fn name(&self) -> &str;

    /// Returns true if the hook must run even when hooking is disabled.
    fn is_important(&self) -> bool {
        false
    }

    /// Returns true if the hook wants to see `entry`.
    fn applies_to(&self, _entry: &HookedEntity) -> bool {
        true
    }

    /// Called for each applicable entry before the write.
    fn on_saving(&self, _ctx: &DbContext, _entry: &HookedEntity) -> DbResult<HookOutcome> {
        Ok(HookOutcome::Void)
    }

    /// Called for each applicable entry after the write.
    fn on_saved(&self, _ctx: &DbContext, _entry: &HookedEntity) -> DbResult<HookOutcome> {
        Ok(HookOutcome::Void)
    }

    /// Called once after `on_saving` processed at least one entry.
    fn on_saving_completed(&self, _ctx: &DbContext, _entries: &[HookedEntity]) -> DbResult<()> {
        Ok(())
    }

    /// Called once after `on_saved` processed at least one entry.
    fn on_saved_completed(&self, _ctx: &DbContext, _entries: &[HookedEntity]) -> DbResult<()> {
        Ok(())
    }
}

/// (hook index, entity type, initial state, stage)
type VoidKey = (usize, TypeId, EntityState, SaveState);

/// A hook handler that runs registered [`SaveHook`]s in registration order.
///
/// # Example
///
/// ```rust
/// use cartdb_core::{DefaultHookHandler, SaveHook, SaveHookHandler};
///
/// struct Audit;
///
/// impl SaveHook for Audit {
///     fn name(&self) -> &str {
///         "audit"
///     }
///
///     fn is_important(&self) -> bool {
///         true
///     }
/// }
///
/// let handler = DefaultHookHandler::new().register(Audit);
/// assert!(handler.has_important_save_hooks());
/// assert_eq!(handler.hook_names(), vec!["audit"]);
/// ```
#[derive(Default)]
pub struct DefaultHookHandler {
    hooks: Vec<Box<dyn SaveHook>>,
    has_important: bool,
    voids: RwLock<HashSet<VoidKey>>,
}

impl DefaultHookHandler {
    /// Creates a handler with no hooks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a hook.
    #[must_use]
    pub fn register(mut self, hook: impl SaveHook + 'static) -> Self {
        self.has_important |= hook.is_important();
        self.hooks.push(Box::new(hook));
        self
    }

    /// Returns the registered hook names in registration order.
    #[must_use]
    pub fn hook_names(&self) -> Vec<&str> {
        self.hooks.iter().map(|h| h.name()).collect()
    }

    /// Returns the number of cached void combinations.
    #[must_use]
    pub fn void_count(&self) -> usize {
        self.voids.read().len()
    }

    /// Runs one phase and returns processed hook names.
    fn run_phase(
        &self,
        ctx: &DbContext,
        entries: &[HookedEntity],
        important_only: bool,
        stage: SaveState,
        cancel: &CancelToken,
    ) -> DbResult<Vec<String>> {
        let mut processed = Vec::new();
        for (index, hook) in self.hooks.iter().enumerate() {
            if important_only && !hook.is_important() {
                continue;
            }
            let mut handled = Vec::new();
            for entry in entries {
                let key = (index, entry.type_id(), entry.initial_state(), stage);
                if self.voids.read().contains(&key) || !hook.applies_to(entry) {
                    continue;
                }
                cancel.check()?;
                let outcome = match stage {
                    SaveState::PostSave => hook.on_saved(ctx, entry)?,
                    _ => hook.on_saving(ctx, entry)?,
                };
                match outcome {
                    HookOutcome::Ok => handled.push(entry.clone()),
                    HookOutcome::Void => {
                        trace!(hook = hook.name(), kind = entry.kind().name(), %stage, "caching void hook");
                        self.voids.write().insert(key);
                    }
                }
            }
            if handled.is_empty() {
                continue;
            }
            match stage {
                SaveState::PostSave => hook.on_saved_completed(ctx, &handled)?,
                _ => hook.on_saving_completed(ctx, &handled)?,
            }
            processed.push(hook.name().to_string());
        }
        Ok(processed)
    }
}

impl fmt::Debug for DefaultHookHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultHookHandler")
            .field("hooks", &self.hook_names())
            .field("has_important", &self.has_important)
            .finish()
    }
}

impl SaveHookHandler for DefaultHookHandler {
    fn has_important_save_hooks(&self) -> bool {
        self.has_important
    }

    fn saving_changes(
        &self,
        ctx: &DbContext,
        entries: Vec<HookedEntity>,
        important_only: bool,
        cancel: &CancelToken,
    ) -> DbResult<SavingChangesResult> {
        let processed_hooks =
            self.run_phase(ctx, &entries, important_only, SaveState::PreSave, cancel)?;
        let any_state_changed = entries.iter().any(HookedEntity::has_state_changed);
        Ok(SavingChangesResult {
            processed_hooks,
            entries,
            any_state_changed,
        })
    }

    fn saved_changes(
        &self,
        ctx: &DbContext,
        entries: Vec<HookedEntity>,
        important_only: bool,
        cancel: &CancelToken,
    ) -> DbResult<SavedChangesResult> {
        let processed_hooks =
            self.run_phase(ctx, &entries, important_only, SaveState::PostSave, cancel)?;
        Ok(SavedChangesResult { processed_hooks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::entity::{Entity, EntityEntry, EntityId, EntityKind, EntityRef};
    use crate::error::DbError;
    use crate::store::InMemoryEntityStore;
    use parking_lot::{Mutex, RwLock as EntityLock};
    use serde::Serialize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    static PAGE: EntityKind = EntityKind::new("Page");

    #[derive(Debug, Serialize)]
    struct Page {
        id: EntityId,
        title: String,
    }

    impl Entity for Page {
        fn entity_id(&self) -> EntityId {
            self.id
        }

        fn kind(&self) -> &'static EntityKind {
            &PAGE
        }

        fn encode(&self) -> DbResult<Vec<u8>> {
            codec::to_cbor(self)
        }
    }

    fn hooked(state: EntityState) -> HookedEntity {
        let entity: EntityRef = Arc::new(EntityLock::new(Page {
            id: EntityId::new(),
            title: "home".into(),
        }));
        HookedEntity::new(EntityEntry::new(entity, state, None))
    }

    fn ctx() -> DbContext {
        DbContext::new(Arc::new(InMemoryEntityStore::new()))
    }

    /// Counts calls and answers with a fixed outcome.
    struct Counting {
        name: &'static str,
        important: bool,
        outcome: HookOutcome,
        saving: Arc<AtomicUsize>,
        completed: Arc<AtomicUsize>,
    }

    impl Counting {
        fn new(name: &'static str, outcome: HookOutcome) -> Self {
            Self {
                name,
                important: false,
                outcome,
                saving: Arc::default(),
                completed: Arc::default(),
            }
        }
    }

    impl SaveHook for Counting {
        fn name(&self) -> &str {
            self.name
        }

        fn is_important(&self) -> bool {
            self.important
        }

        fn on_saving(&self, _ctx: &DbContext, _entry: &HookedEntity) -> DbResult<HookOutcome> {
            self.saving.fetch_add(1, Ordering::SeqCst);
            Ok(self.outcome)
        }

        fn on_saving_completed(&self, _ctx: &DbContext, _entries: &[HookedEntity]) -> DbResult<()> {
            self.completed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn processed_hooks_follow_registration_order() {
        let handler = DefaultHookHandler::new()
            .register(Counting::new("second", HookOutcome::Ok))
            .register(Counting::new("void", HookOutcome::Void))
            .register(Counting::new("first", HookOutcome::Ok));
        let result = handler
            .saving_changes(&ctx(), vec![hooked(EntityState::Added)], false, &CancelToken::new())
            .unwrap();
        assert_eq!(result.processed_hooks, vec!["second", "first"]);
        assert!(!result.any_state_changed);
    }

    #[test]
    fn void_combinations_are_skipped_later() {
        let hook = Counting::new("void", HookOutcome::Void);
        let calls = hook.saving.clone();
        let handler = DefaultHookHandler::new().register(hook);
        let ctx = ctx();
        let cancel = CancelToken::new();

        for _ in 0..3 {
            handler
                .saving_changes(&ctx, vec![hooked(EntityState::Added)], false, &cancel)
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(handler.void_count(), 1);

        // A different initial state is a different combination.
        handler
            .saving_changes(&ctx, vec![hooked(EntityState::Modified)], false, &cancel)
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn important_only_skips_optional_hooks() {
        let optional = Counting::new("optional", HookOutcome::Ok);
        let mut important = Counting::new("important", HookOutcome::Ok);
        important.important = true;
        let optional_calls = optional.saving.clone();
        let handler = DefaultHookHandler::new().register(optional).register(important);

        assert!(handler.has_important_save_hooks());
        let result = handler
            .saving_changes(&ctx(), vec![hooked(EntityState::Added)], true, &CancelToken::new())
            .unwrap();
        assert_eq!(result.processed_hooks, vec!["important"]);
        assert_eq!(optional_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn completed_runs_once_per_phase() {
        let hook = Counting::new("batch", HookOutcome::Ok);
        let saving = hook.saving.clone();
        let completed = hook.completed.clone();
        let handler = DefaultHookHandler::new().register(hook);
        let entries = vec![hooked(EntityState::Added), hooked(EntityState::Added)];

        handler
            .saving_changes(&ctx(), entries, false, &CancelToken::new())
            .unwrap();
        assert_eq!(saving.load(Ordering::SeqCst), 2);
        assert_eq!(completed.load(Ordering::SeqCst), 1);
    }

    struct Veto;

    impl SaveHook for Veto {
        fn name(&self) -> &str {
            "veto"
        }

        fn applies_to(&self, entry: &HookedEntity) -> bool {
            entry.kind().is_a(&PAGE)
        }

        fn on_saving(&self, _ctx: &DbContext, entry: &HookedEntity) -> DbResult<HookOutcome> {
            entry.set_state(EntityState::Unchanged);
            Ok(HookOutcome::Ok)
        }
    }

    #[test]
    fn state_changes_are_reported() {
        let handler = DefaultHookHandler::new().register(Veto);
        let result = handler
            .saving_changes(&ctx(), vec![hooked(EntityState::Modified)], false, &CancelToken::new())
            .unwrap();
        assert!(result.any_state_changed);
        assert_eq!(result.entries[0].initial_state(), EntityState::Modified);
    }

    #[test]
    fn cancellation_stops_hooks() {
        let hook = Counting::new("never", HookOutcome::Ok);
        let calls = hook.saving.clone();
        let handler = DefaultHookHandler::new().register(hook);
        let cancel = CancelToken::new();
        cancel.cancel();

        let result =
            handler.saving_changes(&ctx(), vec![hooked(EntityState::Added)], false, &cancel);
        assert!(matches!(result, Err(DbError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    /// Records titles seen after the write.
    struct Published(Arc<Mutex<Vec<String>>>);

    impl SaveHook for Published {
        fn name(&self) -> &str {
            "published"
        }

        fn on_saved(&self, _ctx: &DbContext, entry: &HookedEntity) -> DbResult<HookOutcome> {
            if let Some(title) = entry.with_entity(|page: &Page| page.title.clone()) {
                self.0.lock().push(title);
            }
            Ok(HookOutcome::Ok)
        }
    }

    #[test]
    fn post_phase_uses_saved_callbacks() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handler = DefaultHookHandler::new().register(Published(seen.clone()));
        let cancel = CancelToken::new();
        let ctx = ctx();

        let pre = handler
            .saving_changes(&ctx, vec![hooked(EntityState::Added)], false, &cancel)
            .unwrap();
        assert!(pre.processed_hooks.is_empty());

        let post = handler
            .saved_changes(&ctx, pre.entries, false, &cancel)
            .unwrap();
        assert_eq!(post.processed_hooks, vec!["published"]);
        assert_eq!(*seen.lock(), vec!["home".to_string()]);
    }
}
