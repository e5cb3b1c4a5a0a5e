//! Fixed-capacity free-list of reusable resources.
//!
//! A [`Pool`] builds all of its resources up front through a factory and
//! hands them out one caller at a time. Resources come back when the
//! [`Pooled`] guard is dropped (or passed to [`Pool::release`]); callers
//! never close a pooled resource themselves. [`Pool::close`] closes idle
//! resources immediately and checked-out ones as they are returned.
//!
//! # Example
//!
//! ```
//! use perconn::pool::Pool;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> perconn::Result<()> {
//! let mut next = 0;
//! let pool = Pool::new(
//!     2,
//!     || {
//!         next += 1;
//!         Ok(vec![0u8; next])
//!     },
//!     |_buf| Ok(()),
//! )?;
//!
//! let buf = pool.acquire().await?;
//! assert!(!buf.is_empty());
//! pool.release(buf);
//! pool.close()?;
//! # Ok(())
//! # }
//! ```

mod client_pool;

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

use crate::error::{ConfigError, PerconnError, Result};

pub use client_pool::{ClientPool, ClientPoolBuilder};

type Closer<R> = Box<dyn Fn(R) -> Result<()> + Send + Sync>;

struct Slots<R> {
    idle: Vec<R>,
    closed: bool,
}

struct PoolInner<R> {
    slots: Mutex<Slots<R>>,
    /// One permit per idle resource.
    permits: Arc<Semaphore>,
    capacity: usize,
    closer: Closer<R>,
}

impl<R> PoolInner<R> {
    fn lock(&self) -> MutexGuard<'_, Slots<R>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return a resource, or close it if the pool has been closed.
    fn put(&self, resource: R) {
        let mut slots = self.lock();
        if !slots.closed {
            slots.idle.push(resource);
            return;
        }
        drop(slots);
        if let Err(e) = (self.closer)(resource) {
            tracing::warn!("cannot close resource returned to closed pool: {}", e);
        }
    }
}

/// A fixed set of resources shared by acquire/release.
///
/// Cheaply cloneable; clones share the same resources.
pub struct Pool<R> {
    inner: Arc<PoolInner<R>>,
}

impl<R> Clone for Pool<R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<R: Send + 'static> Pool<R> {
    /// Build `capacity` resources with `factory`.
    ///
    /// If the factory fails, resources already built are closed with
    /// `closer` and the factory's error is returned.
    pub fn new<F, C>(capacity: usize, mut factory: F, closer: C) -> Result<Self>
    where
        F: FnMut() -> Result<R>,
        C: Fn(R) -> Result<()> + Send + Sync + 'static,
    {
        if capacity == 0 {
            return Err(ConfigError::ZeroPoolSize.into());
        }

        let mut idle = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            match factory() {
                Ok(resource) => idle.push(resource),
                Err(e) => {
                    for resource in idle {
                        if let Err(close_err) = closer(resource) {
                            tracing::warn!("cannot close resource after failed pool build: {}", close_err);
                        }
                    }
                    return Err(e);
                }
            }
        }

        Ok(Self {
            inner: Arc::new(PoolInner {
                slots: Mutex::new(Slots {
                    idle,
                    closed: false,
                }),
                permits: Arc::new(Semaphore::new(capacity)),
                capacity,
                closer: Box::new(closer),
            }),
        })
    }

    /// Take a resource, waiting until one is free.
    ///
    /// Fails with [`PerconnError::PoolClosed`] once the pool is closed,
    /// including for callers already waiting.
    pub async fn acquire(&self) -> Result<Pooled<R>> {
        let permit = self
            .inner
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PerconnError::PoolClosed)?;
        self.checkout(permit)
    }

    /// Take a resource without waiting.
    ///
    /// Returns `Err(PoolExhausted)` immediately if every resource is in use.
    pub fn try_acquire(&self) -> Result<Pooled<R>> {
        let permit = self
            .inner
            .permits
            .clone()
            .try_acquire_owned()
            .map_err(|e| match e {
                TryAcquireError::Closed => PerconnError::PoolClosed,
                TryAcquireError::NoPermits => PerconnError::PoolExhausted,
            })?;
        self.checkout(permit)
    }

    fn checkout(&self, permit: OwnedSemaphorePermit) -> Result<Pooled<R>> {
        // Empty only if `close` drained the free-list after we got the permit.
        let resource = self.inner.lock().idle.pop().ok_or(PerconnError::PoolClosed)?;
        Ok(Pooled {
            resource: Some(resource),
            pool: self.inner.clone(),
            _permit: permit,
        })
    }

    /// Give a resource back. Equivalent to dropping the guard.
    pub fn release(&self, resource: Pooled<R>) {
        drop(resource);
    }

    /// Close the pool.
    ///
    /// Idle resources are closed now, checked-out resources when they are
    /// returned. Returns the first close error. A second call returns
    /// [`PerconnError::PoolClosed`].
    pub fn close(&self) -> Result<()> {
        let drained = {
            let mut slots = self.inner.lock();
            if slots.closed {
                return Err(PerconnError::PoolClosed);
            }
            slots.closed = true;
            std::mem::take(&mut slots.idle)
        };
        self.inner.permits.close();

        let mut first_error = None;
        for resource in drained {
            if let Err(e) = (self.inner.closer)(resource) {
                tracing::warn!("cannot close pooled resource: {}", e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Total number of resources.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Number of resources free to acquire right now.
    #[inline]
    pub fn available(&self) -> usize {
        self.inner.permits.available_permits()
    }

    /// Returns true once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

/// A resource checked out of a [`Pool`]. Returned to the pool on drop.
pub struct Pooled<R> {
    /// `None` only while being returned in `drop`.
    resource: Option<R>,
    pool: Arc<PoolInner<R>>,
    // Released after `resource` is back on the free-list.
    _permit: OwnedSemaphorePermit,
}

impl<R> Deref for Pooled<R> {
    type Target = R;

    fn deref(&self) -> &R {
        self.resource.as_ref().expect("pooled resource present until drop")
    }
}

impl<R> DerefMut for Pooled<R> {
    fn deref_mut(&mut self) -> &mut R {
        self.resource.as_mut().expect("pooled resource present until drop")
    }
}

impl<R> Drop for Pooled<R> {
    fn drop(&mut self) {
        if let Some(resource) = self.resource.take() {
            self.pool.put(resource);
        }
    }
}
