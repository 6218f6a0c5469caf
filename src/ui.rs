//! Hand-off queue onto the thread that owns UI state.
//!
//! Background work (the watcher's refresh, mainly) never touches UI state
//! directly. It posts a task through a [`UiSender`]; whoever owns the state
//! drives the matching [`UiExecutor`] from its event loop and runs each
//! task against `&mut S`. Tests drive the executor by hand.

use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use tokio::sync::mpsc;

/// Future produced by a UI task; borrows the state it runs against.
pub type LocalFuture<'a> = Pin<Box<dyn Future<Output = ()> + 'a>>;

type Task<S> = Box<dyn for<'a> FnOnce(&'a mut S) -> LocalFuture<'a> + Send>;

/// UI state reacting to an index that changed underneath it.
#[async_trait(?Send)]
pub trait RefreshTarget {
    async fn index_refreshed(&mut self);
}

/// Creates a connected sender/executor pair.
pub fn channel<S>() -> (UiSender<S>, UiExecutor<S>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (UiSender { tx }, UiExecutor { rx })
}

/// Posting side; cheap to clone and safe to move to other threads.
pub struct UiSender<S> {
    tx: mpsc::UnboundedSender<Task<S>>,
}

impl<S> Clone for UiSender<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<S> std::fmt::Debug for UiSender<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UiSender")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl<S> UiSender<S> {
    /// Queues `task`. Returns `false` if the executor has gone away.
    pub fn post<F>(&self, task: F) -> bool
    where
        F: for<'a> FnOnce(&'a mut S) -> LocalFuture<'a> + Send + 'static,
    {
        self.tx.send(Box::new(task)).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl<S: RefreshTarget + 'static> UiSender<S> {
    /// Queues a [`RefreshTarget::index_refreshed`] call.
    pub fn post_index_refreshed(&self) -> bool {
        self.post(|state: &mut S| state.index_refreshed())
    }
}

/// Running side, owned by the UI loop.
pub struct UiExecutor<S> {
    rx: mpsc::UnboundedReceiver<Task<S>>,
}

impl<S> UiExecutor<S> {
    /// Runs every task queued so far. Returns how many ran.
    pub async fn run_pending(&mut self, state: &mut S) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            task(&mut *state).await;
            ran += 1;
        }
        ran
    }

    /// Waits for the next task and runs it. `false` once every sender is gone.
    pub async fn run_next(&mut self, state: &mut S) -> bool {
        match self.rx.recv().await {
            Some(task) => {
                task(&mut *state).await;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        refreshed: usize,
        log: Vec<&'static str>,
    }

    #[async_trait(?Send)]
    impl RefreshTarget for Counter {
        async fn index_refreshed(&mut self) {
            self.refreshed += 1;
        }
    }

    #[tokio::test]
    async fn test_tasks_run_in_post_order() {
        let (tx, mut exec) = channel::<Counter>();
        let mut state = Counter::default();

        tx.post(|s: &mut Counter| {
            Box::pin(async move {
                s.log.push("first");
            })
        });
        tx.post(|s: &mut Counter| {
            Box::pin(async move {
                s.log.push("second");
            })
        });

        assert_eq!(exec.run_pending(&mut state).await, 2);
        assert_eq!(state.log, vec!["first", "second"]);
        assert_eq!(exec.run_pending(&mut state).await, 0);
    }

    #[tokio::test]
    async fn test_post_from_other_thread() {
        let (tx, mut exec) = channel::<Counter>();
        let mut state = Counter::default();

        std::thread::spawn(move || {
            tx.post_index_refreshed();
        })
        .join()
        .unwrap();

        assert!(exec.run_next(&mut state).await);
        assert_eq!(state.refreshed, 1);
        // sender dropped with the thread
        assert!(!exec.run_next(&mut state).await);
    }

    #[test]
    fn test_post_after_executor_dropped() {
        let (tx, exec) = channel::<Counter>();
        drop(exec);
        assert!(tx.is_closed());
        assert!(!tx.post_index_refreshed());
    }
}
