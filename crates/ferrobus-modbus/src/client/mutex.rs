// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! FIFO async mutex.
//!
//! Callers of [`FifoMutex::acquire`] are granted the lock strictly in the
//! order they called it. The lock protects no data of its own: it serializes
//! access to a shared channel that lives elsewhere. Not reentrant; acquiring
//! twice from the same task without releasing deadlocks.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// A FIFO-fair exclusive lock, cheap to clone. Clones share the lock.
#[derive(Clone, Default)]
pub struct FifoMutex {
    lock: Arc<Mutex<()>>,
    waiters: Arc<AtomicUsize>,
}

/// Release handle returned by [`FifoMutex::acquire`].
///
/// The lock is released by [`MutexGuard::release`] or when the guard is dropped.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct MutexGuard {
    _guard: OwnedMutexGuard<()>,
}

impl MutexGuard {
    /// Releases the lock, handing it to the next waiter.
    pub fn release(self) {}
}

impl fmt::Debug for MutexGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutexGuard").finish_non_exhaustive()
    }
}

/// Decrements the waiter count even if the acquiring future is dropped.
struct WaiterToken<'a>(&'a AtomicUsize);

impl<'a> WaiterToken<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for WaiterToken<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FifoMutex {
    /// Creates an unlocked mutex.
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for the lock.
    pub async fn acquire(&self) -> MutexGuard {
        let _token = WaiterToken::new(&self.waiters);
        let guard = Arc::clone(&self.lock).lock_owned().await;
        MutexGuard { _guard: guard }
    }

    /// Takes the lock if it is free and nobody is queued.
    pub fn try_acquire(&self) -> Option<MutexGuard> {
        Arc::clone(&self.lock)
            .try_lock_owned()
            .ok()
            .map(|guard| MutexGuard { _guard: guard })
    }

    /// Returns `true` while some guard is alive.
    pub fn is_locked(&self) -> bool {
        self.lock.try_lock().is_err()
    }

    /// Number of tasks currently queued in [`acquire`](Self::acquire).
    pub fn waiters(&self) -> usize {
        self.waiters.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for FifoMutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FifoMutex")
            .field("locked", &self.is_locked())
            .field("waiters", &self.waiters())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as SyncMutex;
    use std::time::Duration;

    #[tokio::test]
    async fn test_acquire_and_release() {
        let mutex = FifoMutex::new();
        assert!(!mutex.is_locked());

        let guard = mutex.acquire().await;
        assert!(mutex.is_locked());
        assert!(mutex.try_acquire().is_none());

        guard.release();
        assert!(!mutex.is_locked());
        assert!(mutex.try_acquire().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiters_are_served_in_order() {
        let mutex = FifoMutex::new();
        let order = Arc::new(SyncMutex::new(Vec::new()));
        let first = mutex.acquire().await;

        let mut handles = Vec::new();
        for i in 0..5 {
            let mutex = mutex.clone();
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                let _guard = mutex.acquire().await;
                order.lock().push(i);
            }));
            // Let task i enqueue before task i + 1 is spawned
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        assert_eq!(mutex.waiters(), 5);
        drop(first);

        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
        assert_eq!(mutex.waiters(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_acquire_leaves_queue() {
        let mutex = FifoMutex::new();
        let _held = mutex.acquire().await;

        let pending = tokio::time::timeout(Duration::from_millis(10), mutex.acquire()).await;
        assert!(pending.is_err());
        assert_eq!(mutex.waiters(), 0);
    }
}
