//! Mutual-exclusion primitives guarding the store.
//!
//! Two flavors are provided:
//!
//! - [`ExclusiveLock`]: non-reentrant. Acquiring it twice from the same thread deadlocks.
//!   It protects a [`Database`](crate::storage::Database) connection handle.
//! - [`ReentrantLock`]: the owning thread may acquire it again; ownership is only handed
//!   to another thread once every nested guard has been released. It protects a
//!   [`Store`](crate::Store), whose operations call other lock-taking operations
//!   (e.g. `hard_reset` calls `close` and `open`).
//!
//! Ownership is represented by a guard. Releasing is dropping the guard, so a lock is
//! released on every exit path, including `?` returns and unwinding panics.
use std::cell::RefCell;

use parking_lot::{Mutex, MutexGuard, ReentrantMutex, ReentrantMutexGuard};

/// Non-reentrant lock owning a value of type `T`.
#[derive(Debug, Default)]
pub struct ExclusiveLock<T> {
    inner: Mutex<T>,
}

impl<T> ExclusiveLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Blocks until the lock is owned by the calling thread.
    pub fn acquire(&self) -> MutexGuard<'_, T> {
        self.inner.lock()
    }

    /// Attempts to take the lock without waiting.
    pub fn try_acquire(&self) -> Option<MutexGuard<'_, T>> {
        self.inner.try_lock()
    }

    /// Runs `body` while holding the lock and returns its outcome. The lock is
    /// released even if `body` returns an error or panics.
    pub fn with_lock<R>(&self, body: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.acquire();
        body(&mut guard)
    }

    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

/// Same-thread reentrant lock owning a value of type `T`.
///
/// Nested acquisitions share the value, so it is handed out behind a [`RefCell`].
/// Callers must not hold a mutable borrow across a nested acquisition.
#[derive(Debug, Default)]
pub struct ReentrantLock<T> {
    inner: ReentrantMutex<RefCell<T>>,
}

impl<T> ReentrantLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: ReentrantMutex::new(RefCell::new(value)),
        }
    }

    /// Blocks until the lock is owned by the calling thread. Succeeds immediately
    /// if the calling thread already owns it.
    pub fn acquire(&self) -> ReentrantMutexGuard<'_, RefCell<T>> {
        self.inner.lock()
    }

    pub fn try_acquire(&self) -> Option<ReentrantMutexGuard<'_, RefCell<T>>> {
        self.inner.try_lock()
    }

    /// Runs `body` while holding the lock and returns its outcome. The lock is
    /// released even if `body` returns an error or panics.
    pub fn with_lock<R>(&self, body: impl FnOnce(&RefCell<T>) -> R) -> R {
        let guard = self.acquire();
        body(&guard)
    }

    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }

    /// Returns `true` when the calling thread holds at least one guard.
    pub fn is_owned_by_current_thread(&self) -> bool {
        self.inner.is_owned_by_current_thread()
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner().into_inner()
    }
}
