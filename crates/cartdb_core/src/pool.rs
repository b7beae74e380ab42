//! Reuse of contexts across units of work.

use crate::config::ContextConfig;
use crate::context::DbContext;
use crate::hooks::SaveHookHandler;
use crate::store::EntityStore;
use parking_lot::Mutex;
use std::ops::Deref;
use std::sync::Arc;
use tracing::trace;

/// A pool of contexts sharing one store and one hook handler.
///
/// Rented contexts are reset when returned, so the next renter never sees
/// tracked entities, a save state or a hook override left behind by the
/// previous one.
pub struct DbContextPool {
    config: ContextConfig,
    store: Arc<dyn EntityStore>,
    hook_handler: Arc<dyn SaveHookHandler>,
    idle: Mutex<Vec<DbContext>>,
}

impl DbContextPool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new(
        config: ContextConfig,
        store: Arc<dyn EntityStore>,
        hook_handler: Arc<dyn SaveHookHandler>,
    ) -> Self {
        Self {
            config,
            store,
            hook_handler,
            idle: Mutex::new(Vec::new()),
        }
    }

    /// Takes an idle context or creates a new one.
    pub fn rent(&self) -> PooledContext<'_> {
        let reused = self.idle.lock().pop();
        let ctx = reused.unwrap_or_else(|| {
            trace!("creating pooled context");
            DbContext::with_config(Arc::clone(&self.store), self.config.clone())
                .with_hook_handler(Arc::clone(&self.hook_handler))
        });
        PooledContext {
            ctx: Some(ctx),
            pool: self,
        }
    }

    /// Returns the number of idle contexts.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    fn give_back(&self, ctx: DbContext) {
        ctx.reset_for_reuse();
        let mut idle = self.idle.lock();
        if idle.len() < self.config.pool_capacity {
            idle.push(ctx);
        }
    }
}

/// A rented context. Returns to its pool when dropped.
pub struct PooledContext<'a> {
    ctx: Option<DbContext>,
    pool: &'a DbContextPool,
}

impl Deref for PooledContext<'_> {
    type Target = DbContext;

    fn deref(&self) -> &DbContext {
        match &self.ctx {
            Some(ctx) => ctx,
            None => unreachable!("context is only taken on drop"),
        }
    }
}

impl Drop for PooledContext<'_> {
    fn drop(&mut self) {
        if let Some(ctx) = self.ctx.take() {
            self.pool.give_back(ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::NullHookHandler;
    use crate::store::InMemoryEntityStore;
    use crate::types::SaveState;

    fn pool(capacity: usize) -> DbContextPool {
        DbContextPool::new(
            ContextConfig::default().pool_capacity(capacity),
            Arc::new(InMemoryEntityStore::new()),
            Arc::new(NullHookHandler),
        )
    }

    #[test]
    fn returned_context_is_reused() {
        let pool = pool(4);
        drop(pool.rent());
        assert_eq!(pool.idle_count(), 1);
        let _ctx = pool.rent();
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn returned_context_is_reset() {
        let pool = pool(4);
        {
            let ctx = pool.rent();
            ctx.set_hooks_enabled(false);
            ctx.tracker().set_auto_detect_changes(false);
            ctx.set_save_state(SaveState::PostSave);
        }
        let ctx = pool.rent();
        assert!(ctx.hooks_enabled());
        assert!(ctx.tracker().auto_detect_changes());
        assert_eq!(ctx.save_state(), SaveState::Idle);
    }

    #[test]
    fn capacity_bounds_idle_contexts() {
        let pool = pool(1);
        let first = pool.rent();
        let second = pool.rent();
        drop(first);
        drop(second);
        assert_eq!(pool.idle_count(), 1);
    }
}
