//! Recording hook handler and closure-based hooks.

use cartdb_core::{
    CancelToken, DbContext, DbResult, EntityId, EntityState, HookOutcome, HookedEntity, SaveHook,
    SaveHookHandler, SaveState, SavedChangesResult, SavingChangesResult,
};
use parking_lot::Mutex;

/// Phase of a recorded handler call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Pre-commit call.
    Saving,
    /// Post-commit call.
    Saved,
}

/// A recorded entry: kind name, ID and state captured before hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEntry {
    /// Kind name.
    pub kind: &'static str,
    /// Entity ID.
    pub id: EntityId,
    /// Initial state.
    pub initial_state: EntityState,
}

/// One recorded handler call.
#[derive(Debug, Clone)]
pub struct HandlerCall {
    /// Which phase was called.
    pub phase: Phase,
    /// Entries passed in.
    pub entries: Vec<RecordedEntry>,
    /// The important-only flag passed in.
    pub important_only: bool,
    /// Context save state observed during the call.
    pub save_state: SaveState,
}

type Script = Box<dyn Fn(&DbContext, &[HookedEntity]) -> DbResult<()> + Send + Sync>;

/// A hook handler that records every call and optionally runs a script.
///
/// Scripts stand in for hook bodies: they may mutate entries, track new
/// entities, or commit reentrantly. Every entry is forwarded, and the
/// handler reports itself as processed whenever it was called with
/// entries.
#[derive(Default)]
pub struct RecordingHookHandler {
    important: bool,
    calls: Mutex<Vec<HandlerCall>>,
    on_saving: Option<Script>,
    on_saved: Option<Script>,
}

impl RecordingHookHandler {
    /// Creates a handler without important hooks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the handler report important hooks.
    #[must_use]
    pub fn important(mut self) -> Self {
        self.important = true;
        self
    }

    /// Runs `script` during the pre-commit call.
    #[must_use]
    pub fn on_saving(
        mut self,
        script: impl Fn(&DbContext, &[HookedEntity]) -> DbResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.on_saving = Some(Box::new(script));
        self
    }

    /// Runs `script` during the post-commit call.
    #[must_use]
    pub fn on_saved(
        mut self,
        script: impl Fn(&DbContext, &[HookedEntity]) -> DbResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.on_saved = Some(Box::new(script));
        self
    }

    /// Returns a copy of all recorded calls.
    pub fn calls(&self) -> Vec<HandlerCall> {
        self.calls.lock().clone()
    }

    /// Returns recorded calls of one phase.
    pub fn calls_of(&self, phase: Phase) -> Vec<HandlerCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.phase == phase)
            .cloned()
            .collect()
    }

    /// Forgets all recorded calls.
    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, ctx: &DbContext, phase: Phase, entries: &[HookedEntity], important_only: bool) {
        let entries = entries
            .iter()
            .map(|e| RecordedEntry {
                kind: e.kind().name(),
                id: e.entity_id(),
                initial_state: e.initial_state(),
            })
            .collect();
        self.calls.lock().push(HandlerCall {
            phase,
            entries,
            important_only,
            save_state: ctx.save_state(),
        });
    }
}

impl SaveHookHandler for RecordingHookHandler {
    fn has_important_save_hooks(&self) -> bool {
        self.important
    }

    fn saving_changes(
        &self,
        ctx: &DbContext,
        entries: Vec<HookedEntity>,
        important_only: bool,
        cancel: &CancelToken,
    ) -> DbResult<SavingChangesResult> {
        self.record(ctx, Phase::Saving, &entries, important_only);
        cancel.check()?;
        if let Some(script) = &self.on_saving {
            script(ctx, &entries)?;
        }
        let any_state_changed = entries.iter().any(HookedEntity::has_state_changed);
        Ok(SavingChangesResult {
            processed_hooks: processed(&entries),
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
        self.record(ctx, Phase::Saved, &entries, important_only);
        cancel.check()?;
        if let Some(script) = &self.on_saved {
            script(ctx, &entries)?;
        }
        Ok(SavedChangesResult {
            processed_hooks: processed(&entries),
        })
    }
}

fn processed(entries: &[HookedEntity]) -> Vec<String> {
    if entries.is_empty() {
        Vec::new()
    } else {
        vec!["recording".to_string()]
    }
}

type EntryFn = Box<dyn Fn(&DbContext, &HookedEntity) -> DbResult<HookOutcome> + Send + Sync>;

/// A [`SaveHook`] built from closures.
pub struct FnHook {
    name: String,
    important: bool,
    saving: Option<EntryFn>,
    saved: Option<EntryFn>,
}

impl FnHook {
    /// Creates a hook that does nothing.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            important: false,
            saving: None,
            saved: None,
        }
    }

    /// Marks the hook as important.
    #[must_use]
    pub fn important(mut self) -> Self {
        self.important = true;
        self
    }

    /// Sets the pre-commit callback.
    #[must_use]
    pub fn saving(
        mut self,
        f: impl Fn(&DbContext, &HookedEntity) -> DbResult<HookOutcome> + Send + Sync + 'static,
    ) -> Self {
        self.saving = Some(Box::new(f));
        self
    }

    /// Sets the post-commit callback.
    #[must_use]
    pub fn saved(
        mut self,
        f: impl Fn(&DbContext, &HookedEntity) -> DbResult<HookOutcome> + Send + Sync + 'static,
    ) -> Self {
        self.saved = Some(Box::new(f));
        self
    }
}

impl SaveHook for FnHook {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_important(&self) -> bool {
        self.important
    }

    fn on_saving(&self, ctx: &DbContext, entry: &HookedEntity) -> DbResult<HookOutcome> {
        match &self.saving {
            Some(f) => f(ctx, entry),
            None => Ok(HookOutcome::Void),
        }
    }

    fn on_saved(&self, ctx: &DbContext, entry: &HookedEntity) -> DbResult<HookOutcome> {
        match &self.saved {
            Some(f) => f(ctx, entry),
            None => Ok(HookOutcome::Void),
        }
    }
}
