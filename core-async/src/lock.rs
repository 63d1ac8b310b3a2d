//! Blocking mutual exclusion with a scoped "synchronized" region.
//!
//! [`Lock`] protects state shared between the control context, background
//! decode tasks and the render callback. Acquiring returns a [`LockGuard`];
//! dropping the guard releases the lock, so every exit path of a protected
//! block (normal return, `?`, panic) releases it.
//!
//! The lock is not reentrant. A context must never try to acquire a lock it
//! already holds.
//!
//! Real-time callers use [`Lock::try_lock`] and fall back to a degraded path
//! (silence) instead of waiting.
//!
//! # Examples
//!
//! ```rust
//! use core_async::lock::Lock;
//!
//! let lock = Lock::new(Vec::new());
//! lock.synchronized(|items| items.push(1));
//!
//! let len = lock.synchronized(|items| items.len());
//! assert_eq!(len, 1);
//! ```

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::time::Duration;

/// Mutual-exclusion primitive guarding a value of type `T`.
pub struct Lock<T> {
    inner: parking_lot::Mutex<T>,
}

impl<T> Lock<T> {
    /// Creates a new unlocked lock around `value`.
    pub fn new(value: T) -> Self {
        Self {
            inner: parking_lot::Mutex::new(value),
        }
    }

    /// Blocks the calling context until exclusive ownership is obtained.
    pub fn lock(&self) -> LockGuard<'_, T> {
        LockGuard {
            inner: self.inner.lock(),
        }
    }

    /// Attempts to acquire the lock without blocking.
    ///
    /// Returns `None` if another context holds the lock.
    pub fn try_lock(&self) -> Option<LockGuard<'_, T>> {
        self.inner.try_lock().map(|inner| LockGuard { inner })
    }

    /// Attempts to acquire the lock, blocking for at most `timeout`.
    pub fn try_lock_for(&self, timeout: Duration) -> Option<LockGuard<'_, T>> {
        self.inner
            .try_lock_for(timeout)
            .map(|inner| LockGuard { inner })
    }

    /// Runs `f` inside the critical section and returns its result.
    ///
    /// The lock is released when `f` returns or unwinds.
    pub fn synchronized<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.lock();
        f(&mut guard)
    }

    /// Returns `true` if the lock is currently held by some context.
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }

    /// Mutable access without locking; requires exclusive ownership.
    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }

    /// Consumes the lock and returns the protected value.
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

impl<T: Default> Default for Lock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Lock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.try_lock() {
            Some(guard) => f.debug_struct("Lock").field("value", &*guard).finish(),
            None => f.debug_struct("Lock").field("value", &"<locked>").finish(),
        }
    }
}

/// Scoped ownership of a [`Lock`]. Releases on drop.
pub struct LockGuard<'a, T> {
    inner: parking_lot::MutexGuard<'a, T>,
}

impl<T> Deref for LockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T> DerefMut for LockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl<T: fmt::Debug> fmt::Debug for LockGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}
