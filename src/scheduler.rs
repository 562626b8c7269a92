//! Periodic task scheduling
//!
//! Every background loop (sampling, orphan sweep, dashboard broadcast) is
//! started through a [`Scheduler`] so that shutdown can cancel all of them
//! deterministically instead of tracking loose interval handles.

use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Handle to a single scheduled loop.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    name: String,
    token: CancellationToken,
}

impl TaskHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop this loop after its current iteration.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

struct Scheduled {
    handle: TaskHandle,
    join: JoinHandle<()>,
}

/// Owns a group of periodic tasks sharing one cancellation root.
///
/// `shutdown` installs a fresh root, so the same scheduler can be started
/// again after it has been stopped.
pub struct Scheduler {
    root: Mutex<CancellationToken>,
    tasks: Mutex<Vec<Scheduled>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            root: Mutex::new(CancellationToken::new()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Run `task` every `period`, starting immediately.
    ///
    /// Missed ticks are skipped rather than bursted. Must be called from
    /// within a Tokio runtime.
    pub fn every<F, Fut>(&self, name: impl Into<String>, period: Duration, task: F) -> TaskHandle
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let token = self.root.lock().child_token();
        let handle = TaskHandle {
            name: name.clone(),
            token: token.clone(),
        };

        let join = tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => {
                        tracing::debug!(task = %name, "Scheduled task cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        task().await;
                    }
                }
            }
        });

        self.tasks.lock().push(Scheduled {
            handle: handle.clone(),
            join,
        });

        handle
    }

    /// Run a long-lived future until it completes or the scheduler shuts down.
    pub fn spawn<Fut>(&self, name: impl Into<String>, future: Fut) -> TaskHandle
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let token = self.root.lock().child_token();
        let handle = TaskHandle {
            name: name.clone(),
            token: token.clone(),
        };

        let join = tokio::spawn(async move {
            tokio::select! {
                biased;
                () = token.cancelled() => {
                    tracing::debug!(task = %name, "Background task cancelled");
                }
                () = future => {}
            }
        });

        self.tasks.lock().push(Scheduled {
            handle: handle.clone(),
            join,
        });

        handle
    }

    /// Names of tasks that have not been cancelled.
    pub fn active_tasks(&self) -> Vec<String> {
        self.tasks
            .lock()
            .iter()
            .filter(|t| !t.handle.is_cancelled() && !t.join.is_finished())
            .map(|t| t.handle.name.clone())
            .collect()
    }

    /// Cancel every task and wait until all of them have exited.
    pub async fn shutdown(&self) {
        let old = std::mem::replace(&mut *self.root.lock(), CancellationToken::new());
        old.cancel();
        let tasks: Vec<Scheduled> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.join.await {
                tracing::warn!(task = %task.handle.name, error = %e, "Scheduled task ended abnormally");
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.root.get_mut().cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_every_runs_periodically() {
        let scheduler = Scheduler::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = count.clone();
        scheduler.every("counter", Duration::from_secs(1), move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });

        // first tick fires immediately, then one per second
        time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 4);

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_single_task() {
        let scheduler = Scheduler::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = count.clone();
        let handle = scheduler.every("counter", Duration::from_secs(1), move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });

        time::sleep(Duration::from_millis(1500)).await;
        handle.cancel();
        let seen = count.load(Ordering::SeqCst);
        time::sleep(Duration::from_secs(5)).await;

        assert_eq!(count.load(Ordering::SeqCst), seen);
        assert!(scheduler.active_tasks().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_everything() {
        let scheduler = Scheduler::new();
        let count = Arc::new(AtomicUsize::new(0));

        for name in ["a", "b"] {
            let c = count.clone();
            scheduler.every(name, Duration::from_secs(1), move || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
        assert_eq!(scheduler.active_tasks().len(), 2);

        scheduler.shutdown().await;
        let seen = count.load(Ordering::SeqCst);
        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), seen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_shutdown() {
        let scheduler = Scheduler::new();
        scheduler.every("first", Duration::from_secs(1), || async {});
        scheduler.shutdown().await;

        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        scheduler.every("second", Duration::from_secs(1), move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });

        time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.active_tasks(), vec!["second"]);
        scheduler.shutdown().await;
    }
}
