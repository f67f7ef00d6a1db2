//! Async mutual exclusion for connect attempts

use tokio::sync::watch;

/// A lock that callers can wait on without acquiring
///
/// `wait()` resolves once the lock is free; every waiter queued behind a
/// holder is released by the same `unlock()`.
#[derive(Debug)]
pub struct Locker {
    locked: watch::Sender<bool>,
}

impl Default for Locker {
    fn default() -> Self {
        Self::new()
    }
}

impl Locker {
    pub fn new() -> Self {
        let (locked, _rx) = watch::channel(false);
        Self { locked }
    }

    /// Mark the lock as held, whether or not it already was
    pub fn lock(&self) {
        self.locked.send_replace(true);
    }

    /// Acquire the lock if it is free
    pub fn try_lock(&self) -> bool {
        self.locked.send_if_modified(|locked| {
            if *locked {
                false
            } else {
                *locked = true;
                true
            }
        })
    }

    /// Acquire the lock, releasing it when the guard drops
    pub fn try_guard(&self) -> Option<LockGuard<'_>> {
        self.try_lock().then_some(LockGuard { locker: self })
    }

    /// Release the lock. Idempotent.
    pub fn unlock(&self) {
        self.locked.send_if_modified(|locked| std::mem::replace(locked, false));
    }

    pub fn is_locked(&self) -> bool {
        *self.locked.borrow()
    }

    /// Wait until the lock is free
    pub async fn wait(&self) {
        let mut rx = self.locked.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|locked| !*locked).await;
    }
}

/// Releases the [`Locker`] on drop, including when a future is cancelled
#[derive(Debug)]
pub struct LockGuard<'a> {
    locker: &'a Locker,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.locker.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_on_free_lock_returns_immediately() {
        let locker = Locker::new();
        tokio::time::timeout(Duration::from_millis(50), locker.wait())
            .await
            .expect("free lock should not block");
    }

    #[tokio::test]
    async fn test_unlock_releases_all_waiters() {
        let locker = Arc::new(Locker::new());
        locker.lock();

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let locker = locker.clone();
                tokio::spawn(async move { locker.wait().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(waiters.iter().all(|w| !w.is_finished()));

        locker.unlock();
        for waiter in waiters {
            tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .expect("waiter should be released")
                .unwrap();
        }
    }

    #[test]
    fn test_try_lock_and_idempotent_unlock() {
        let locker = Locker::new();
        assert!(locker.try_lock());
        assert!(!locker.try_lock());
        assert!(locker.is_locked());

        locker.unlock();
        locker.unlock();
        assert!(!locker.is_locked());
    }

    #[test]
    fn test_guard_unlocks_on_drop() {
        let locker = Locker::new();
        {
            let guard = locker.try_guard();
            assert!(guard.is_some());
            assert!(locker.try_guard().is_none());
        }
        assert!(!locker.is_locked());
    }

    #[tokio::test]
    async fn test_guard_released_when_future_is_dropped() {
        let locker = Arc::new(Locker::new());
        let holder = {
            let locker = locker.clone();
            tokio::spawn(async move {
                let _guard = locker.try_guard();
                std::future::pending::<()>().await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(locker.is_locked());

        holder.abort();
        let _ = holder.await;
        assert!(!locker.is_locked());
    }
}
