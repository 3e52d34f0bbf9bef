//! Bounded pool of reusable per-connection resources.
//!
//! [`ResourcePool`] caps how many entries exist at once. Waiting for a free
//! entry parks on a semaphore; entries are created lazily on first use and
//! reset through [`Recycle`] every time they come back.

use std::{
    fmt,
    ops::{Deref, DerefMut},
    sync::{Arc, Mutex, PoisonError},
};

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

/// Types that can be returned to a pool and reused.
pub trait Recycle {
    /// Restore every mutable field to its initial state.
    fn recycle(&mut self);
}

/// Errors raised when acquiring from a pool.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    /// [`ResourcePool::close`] was called.
    #[error("resource pool is closed")]
    Closed,
    /// Every entry is in use.
    #[error("resource pool exhausted")]
    Exhausted,
}

struct PoolInner<T> {
    capacity: usize,
    permits: Arc<Semaphore>,
    free: Mutex<Vec<T>>,
    factory: Box<dyn Fn() -> T + Send + Sync>,
}

/// Fixed-capacity pool handing out [`PoolEntry`] guards.
///
/// Cloning the pool shares the same entries.
///
/// # Examples
///
/// ```
/// use filewire::pool::{Recycle, ResourcePool};
///
/// #[derive(Default)]
/// struct Scratch(Vec<u8>);
///
/// impl Recycle for Scratch {
///     fn recycle(&mut self) { self.0.clear(); }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let pool = ResourcePool::new(1, Scratch::default);
/// let mut entry = pool.acquire().await.expect("pool open");
/// entry.0.push(1);
/// assert!(pool.try_acquire().is_err());
/// drop(entry);
/// assert!(pool.try_acquire().expect("entry returned").0.is_empty());
/// # }
/// ```
pub struct ResourcePool<T> {
    inner: Arc<PoolInner<T>>,
}

impl<T> Clone for ResourcePool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for ResourcePool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourcePool")
            .field("capacity", &self.inner.capacity)
            .field("available", &self.inner.permits.available_permits())
            .finish_non_exhaustive()
    }
}

impl<T: Recycle> ResourcePool<T> {
    /// Create a pool of `capacity` entries built on demand by `factory`.
    ///
    /// A zero capacity is raised to one so acquisition can always progress.
    pub fn new<F>(capacity: usize, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let capacity = capacity.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            inner: Arc::new(PoolInner {
                capacity,
                permits: Arc::new(Semaphore::new(capacity)),
                free: Mutex::new(Vec::with_capacity(capacity)),
                factory: Box::new(factory),
            }),
        }
    }

    /// Wait until an entry is free and take it.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Closed`] once the pool has been closed.
    pub async fn acquire(&self) -> Result<PoolEntry<T>, PoolError> {
        let permit = Arc::clone(&self.inner.permits)
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;
        Ok(self.checkout(permit))
    }

    /// Take an entry without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Exhausted`] when every entry is in use and
    /// [`PoolError::Closed`] once the pool has been closed.
    pub fn try_acquire(&self) -> Result<PoolEntry<T>, PoolError> {
        let permit = Arc::clone(&self.inner.permits)
            .try_acquire_owned()
            .map_err(|e| match e {
                TryAcquireError::Closed => PoolError::Closed,
                TryAcquireError::NoPermits => PoolError::Exhausted,
            })?;
        Ok(self.checkout(permit))
    }

    fn checkout(&self, permit: OwnedSemaphorePermit) -> PoolEntry<T> {
        let reused = self
            .inner
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        let item = reused.unwrap_or_else(|| (self.inner.factory)());
        PoolEntry {
            item: Some(item),
            pool: Arc::clone(&self.inner),
            _permit: permit,
        }
    }

    /// Wake every waiter with [`PoolError::Closed`] and refuse new
    /// acquisitions. Entries already handed out stay valid.
    pub fn close(&self) { self.inner.permits.close(); }

    /// Maximum number of simultaneously held entries.
    #[must_use]
    pub fn capacity(&self) -> usize { self.inner.capacity }

    /// Entries that could be acquired right now.
    #[must_use]
    pub fn available(&self) -> usize { self.inner.permits.available_permits() }

    /// Entries currently held.
    #[must_use]
    pub fn in_use(&self) -> usize { self.capacity().saturating_sub(self.available()) }
}

/// Exclusive handle to a pooled value.
///
/// Dropping the guard recycles the value and returns it to the pool before
/// the slot becomes available to waiters, so release happens exactly once.
pub struct PoolEntry<T: Recycle> {
    item: Option<T>,
    pool: Arc<PoolInner<T>>,
    // Dropped after `Drop::drop` has pushed the item back.
    _permit: OwnedSemaphorePermit,
}

impl<T: Recycle> PoolEntry<T> {
    /// Return the entry to its pool. Equivalent to dropping it.
    pub fn release(self) { drop(self); }
}

impl<T: Recycle> Deref for PoolEntry<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.item {
            Some(item) => item,
            None => unreachable!("pool entry accessed after release"),
        }
    }
}

impl<T: Recycle> DerefMut for PoolEntry<T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.item {
            Some(item) => item,
            None => unreachable!("pool entry accessed after release"),
        }
    }
}

impl<T: Recycle + fmt::Debug> fmt::Debug for PoolEntry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PoolEntry").field(&self.item).finish()
    }
}

impl<T: Recycle> Drop for PoolEntry<T> {
    fn drop(&mut self) {
        if let Some(mut item) = self.item.take() {
            item.recycle();
            self.pool
                .free
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(item);
        }
    }
}
