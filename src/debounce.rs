//! Trailing-edge debouncer.
//!
//! Each [`Debouncer::schedule`] restarts the quiet period; the most
//! recently scheduled action runs once the period elapses with no further
//! calls. Timers run on tokio's clock, so tests drive them with a paused
//! runtime instead of sleeping.
//!
//! Only the waiting phase is cancellable. Once the quiet period has
//! elapsed the action is handed to its own task and always runs to
//! completion.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            timer: Mutex::new(None),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Replaces any pending action with `action` and restarts the quiet period.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F, Fut>(&self, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let window = self.window;
        let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(previous) = timer.take() {
            previous.abort();
        }

        *timer = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            tokio::spawn(action());
        }));
    }

    /// Drops the pending action, if any. Returns whether one was pending.
    pub fn cancel_pending(&self) -> bool {
        let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        match timer.take() {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                true
            }
            _ => false,
        }
    }

    /// True while a scheduled action is still waiting out its quiet period.
    pub fn is_pending(&self) -> bool {
        self.timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const WINDOW: Duration = Duration::from_millis(500);

    fn counting(counter: &Arc<AtomicUsize>) -> impl FnOnce() -> std::future::Ready<()> {
        let counter = counter.clone();
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_schedule_fires_after_window() {
        let debouncer = Debouncer::new(WINDOW);
        let counter = Arc::new(AtomicUsize::new(0));

        debouncer.schedule(counting(&counter));
        assert!(debouncer.is_pending());

        tokio::time::sleep(WINDOW - Duration::from_millis(1)).await;
        settle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        settle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_collapses_to_one_call() {
        let debouncer = Debouncer::new(WINDOW);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..25 {
            debouncer.schedule(counting(&counter));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        tokio::time::sleep(WINDOW * 2).await;
        settle().await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_quiet_periods_fire_separately() {
        let debouncer = Debouncer::new(WINDOW);
        let counter = Arc::new(AtomicUsize::new(0));

        debouncer.schedule(counting(&counter));
        tokio::time::sleep(WINDOW * 2).await;
        settle().await;
        debouncer.schedule(counting(&counter));
        tokio::time::sleep(WINDOW * 2).await;
        settle().await;

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_pending_drops_action() {
        let debouncer = Debouncer::new(WINDOW);
        let counter = Arc::new(AtomicUsize::new(0));

        debouncer.schedule(counting(&counter));
        assert!(debouncer.cancel_pending());
        assert!(!debouncer.cancel_pending());

        tokio::time::sleep(WINDOW * 2).await;
        settle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_pending() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let debouncer = Debouncer::new(WINDOW);
            debouncer.schedule(counting(&counter));
        }
        tokio::time::sleep(WINDOW * 2).await;
        settle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
