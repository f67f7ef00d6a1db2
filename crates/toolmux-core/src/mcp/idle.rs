//! Debounced idle eviction

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

/// A rescheduleable, cancellable delay
///
/// Each `reset` replaces the pending firing. When the delay elapses the
/// callback is spawned as its own task, so a later `reset` or `cancel` never
/// interrupts a callback that already started.
#[derive(Debug, Default)]
pub struct IdleEvictionTimer {
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl IdleEvictionTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire `on_fire` after `after`, replacing any pending firing
    pub fn reset<F>(&self, after: Duration, on_fire: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let timer = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            tokio::spawn(on_fire);
        });

        if let Some(previous) = self.pending.lock().replace(timer) {
            previous.abort();
        }
    }

    /// Drop the pending firing, if any
    pub fn cancel(&self) {
        if let Some(previous) = self.pending.lock().take() {
            previous.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .map(|timer| !timer.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for IdleEvictionTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::pin::Pin;
    use std::sync::Arc;

    type Callback = Pin<Box<dyn Future<Output = ()> + Send>>;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> Callback) {
        let fired = Arc::new(AtomicUsize::new(0));
        let handle = fired.clone();
        let make = move || {
            let fired = handle.clone();
            Box::pin(async move {
                fired.fetch_add(1, Ordering::SeqCst);
            }) as Callback
        };
        (fired, make)
    }

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        let timer = IdleEvictionTimer::new();
        let (fired, make) = counter();

        timer.reset(Duration::from_secs(10), make());
        assert!(timer.is_pending());

        tokio::time::sleep(Duration::from_secs(9)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_replaces_pending_firing() {
        let timer = IdleEvictionTimer::new();
        let (fired, make) = counter();

        timer.reset(Duration::from_secs(10), make());
        tokio::time::sleep(Duration::from_secs(6)).await;
        timer.reset(Duration::from_secs(10), make());

        tokio::time::sleep(Duration::from_secs(6)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_firing() {
        let timer = IdleEvictionTimer::new();
        let (fired, make) = counter();

        timer.reset(Duration::from_secs(1), make());
        timer.cancel();
        assert!(!timer.is_pending());

        tokio::time::sleep(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
