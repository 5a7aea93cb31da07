//! Bounded reuse pool for per-route adapters.
//!
//! Each route owns one [`AdapterPool`]. [`allocate`](AdapterPool::allocate)
//! hands out a [`PooledAdapter`] that returns its adapter to the pool when it
//! is released or dropped. The pool never blocks its callers. Idle adapters
//! sit in a lock-free bounded queue: an empty queue falls back to
//! constructing a fresh adapter, and a release into a full queue drops the
//! adapter and counts an overflow instead.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_queue::ArrayQueue;
use tracing::trace;

use crate::adapter::Adapter;

/// Default number of idle adapters kept per route.
pub const DEFAULT_POOL_CAPACITY: usize = 8;

type Factory<A> = Box<dyn Fn() -> Option<A> + Send + Sync>;

/// A bounded, non-blocking pool of adapters of one type.
pub struct AdapterPool<A: Adapter> {
    // `None` for a zero-capacity pool.
    queue: Option<ArrayQueue<A>>,
    capacity: usize,
    overflow: AtomicUsize,
    factory: Factory<A>,
}

/// Snapshot of pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Maximum number of idle adapters.
    pub capacity: usize,
    /// Idle adapters currently queued.
    pub available: usize,
    /// Releases that found the queue full.
    pub overflow: usize,
}

impl<A: Adapter + Default> AdapterPool<A> {
    /// Creates a pool that constructs adapters with `Default`.
    pub fn new() -> Arc<Self> {
        Self::with_factory(|| Some(A::default()))
    }
}

impl<A: Adapter> AdapterPool<A> {
    /// Creates a pool with a fallible adapter factory.
    ///
    /// One adapter is constructed eagerly so the first request is served from
    /// the pool.
    pub fn with_factory<F>(factory: F) -> Arc<Self>
    where
        F: Fn() -> Option<A> + Send + Sync + 'static,
    {
        Self::with_factory_and_capacity(factory, DEFAULT_POOL_CAPACITY)
    }

    /// Creates a pool with a fallible factory and an explicit capacity.
    pub fn with_factory_and_capacity<F>(factory: F, capacity: usize) -> Arc<Self>
    where
        F: Fn() -> Option<A> + Send + Sync + 'static,
    {
        let queue = (capacity > 0).then(|| ArrayQueue::new(capacity));
        if let Some(queue) = &queue
            && let Some(adapter) = factory()
        {
            let _ = queue.push(adapter);
        }

        Arc::new(Self {
            queue,
            capacity,
            overflow: AtomicUsize::new(0),
            factory: Box::new(factory),
        })
    }

    /// Takes an adapter from the pool, constructing one if none is idle.
    ///
    /// Returns `None` if the adapter type cannot be constructed.
    pub fn allocate(self: &Arc<Self>) -> Option<PooledAdapter<A>> {
        let idle = self.queue.as_ref().and_then(ArrayQueue::pop);
        let adapter = match idle {
            Some(adapter) => adapter,
            None => (self.factory)()?,
        };

        Some(PooledAdapter {
            adapter: Some(adapter),
            pool: Arc::clone(self),
        })
    }

    fn recycle(&self, mut adapter: A) {
        adapter.clear();

        let returned = match &self.queue {
            Some(queue) => queue.push(adapter).is_ok(),
            None => false,
        };

        if !returned {
            let overflow = self.overflow.fetch_add(1, Ordering::Relaxed) + 1;
            trace!(
                adapter = std::any::type_name::<A>(),
                overflow, "Adapter pool full, dropping released adapter"
            );
        }
    }

    /// Returns the configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of idle adapters.
    pub fn available(&self) -> usize {
        self.queue.as_ref().map_or(0, ArrayQueue::len)
    }

    /// Returns how many releases overflowed the queue.
    pub fn overflow_count(&self) -> usize {
        self.overflow.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of the pool counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.capacity,
            available: self.available(),
            overflow: self.overflow_count(),
        }
    }
}

impl<A: Adapter> fmt::Debug for AdapterPool<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterPool")
            .field("adapter", &std::any::type_name::<A>())
            .field("capacity", &self.capacity)
            .field("overflow", &self.overflow_count())
            .finish_non_exhaustive()
    }
}

/// An adapter on loan from an [`AdapterPool`].
///
/// The adapter is cleared and returned exactly once, either by
/// [`release`](Self::release) or on drop.
pub struct PooledAdapter<A: Adapter> {
    adapter: Option<A>,
    pool: Arc<AdapterPool<A>>,
}

impl<A: Adapter> PooledAdapter<A> {
    /// Returns the adapter, or `None` once released.
    pub fn get(&self) -> Option<&A> {
        self.adapter.as_ref()
    }

    /// Returns the adapter mutably, or `None` once released.
    pub fn get_mut(&mut self) -> Option<&mut A> {
        self.adapter.as_mut()
    }

    /// Returns `true` once the adapter has gone back to the pool.
    pub fn is_released(&self) -> bool {
        self.adapter.is_none()
    }

    /// Clears the adapter and returns it to the pool.
    ///
    /// Returns `false` if it had already been released.
    pub fn release(&mut self) -> bool {
        match self.adapter.take() {
            Some(adapter) => {
                self.pool.recycle(adapter);
                true
            }
            None => false,
        }
    }
}

impl<A: Adapter> Drop for PooledAdapter<A> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<A: Adapter> fmt::Debug for PooledAdapter<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledAdapter")
            .field("adapter", &std::any::type_name::<A>())
            .field("released", &self.is_released())
            .finish()
    }
}
