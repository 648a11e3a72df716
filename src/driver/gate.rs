//! Single-writer access gate
//!
//! Contention is rejected immediately instead of queued: a writer that finds
//! the gate held gets `None` back and is expected to retry on its own.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Exclusive, non-blocking access to a value.
///
/// The `held` flag is the access state; the inner mutex only exists so the
/// value can be shared across threads and is never contended, since it is
/// locked only after the flag has been won.
#[derive(Debug, Default)]
pub struct AccessGate<T> {
    held: AtomicBool,
    inner: Mutex<T>,
}

impl<T> AccessGate<T> {
    /// Create a gate in the free state
    pub fn new(value: T) -> Self {
        Self {
            held: AtomicBool::new(false),
            inner: Mutex::new(value),
        }
    }

    /// Try to move the gate from free to held without blocking.
    ///
    /// Returns `None` with no state change if the gate is already held. The
    /// gate is released when the returned guard is dropped, on every exit
    /// path including unwinding.
    pub fn try_acquire(&self) -> Option<AccessGuard<'_, T>> {
        self.held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()?;

        // A panic in a previous holder leaves nothing half-written that the
        // next holder cares about, so poisoning is ignored.
        let guard = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        Some(AccessGuard {
            guard: Some(guard),
            held: &self.held,
        })
    }

    /// Whether a writer currently holds the gate
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    /// Consume the gate and return the guarded value
    pub fn into_inner(self) -> T {
        self.inner
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Proof of holding an [`AccessGate`]; releases it on drop
#[derive(Debug)]
pub struct AccessGuard<'a, T> {
    guard: Option<MutexGuard<'a, T>>,
    held: &'a AtomicBool,
}

impl<T> Deref for AccessGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Only None inside drop()
        self.guard.as_deref().unwrap_or_else(|| unreachable!())
    }
}

impl<T> DerefMut for AccessGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.guard.as_deref_mut().unwrap_or_else(|| unreachable!())
    }
}

impl<T> Drop for AccessGuard<'_, T> {
    fn drop(&mut self) {
        // Unlock before publishing free so the next holder never waits
        self.guard.take();
        self.held.store(false, Ordering::Release);
    }
}
