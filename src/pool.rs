//! Free-list pooling of request contexts.
//!
//! Every request borrows a [`Context`] from the pool and gives it back when
//! the chain is done. Acquisition never waits: an empty free-list means a
//! fresh context (and a fresh set of application globals) is built on the
//! spot. Release clears the context and keeps it only while the free-list is
//! below capacity, so a burst of traffic doesn't pin its peak memory forever.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::context::Context;

/// Idle contexts kept by default.
pub const DEFAULT_POOL_CAPACITY: usize = 1024;

/// Produces application globals for newly allocated contexts.
pub(crate) type Factory<G> = Arc<dyn Fn() -> G + Send + Sync>;

pub(crate) struct ContextPool<G> {
    free: Mutex<Vec<Box<Context<G>>>>,
    capacity: usize,
    factory: Factory<G>,
}

impl<G> ContextPool<G> {
    pub(crate) fn new(factory: Factory<G>, capacity: usize) -> Self {
        Self { free: Mutex::new(Vec::new()), capacity, factory }
    }

    pub(crate) fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.free.get_mut().truncate(capacity);
    }

    /// Pops an idle context, or allocates one if none is idle.
    pub(crate) fn acquire(&self) -> Box<Context<G>> {
        // Pop under the lock, build outside it.
        let recycled = self.free.lock().pop();
        recycled.unwrap_or_else(|| Box::new(Context::new((self.factory)())))
    }

    /// Clears `ctx` and returns it to the free-list.
    pub(crate) fn release(&self, mut ctx: Box<Context<G>>) {
        ctx.recycle();
        let mut free = self.free.lock();
        if free.len() < self.capacity {
            free.push(ctx);
        }
    }

    #[cfg(test)]
    pub(crate) fn idle(&self) -> usize {
        self.free.lock().len()
    }
}
