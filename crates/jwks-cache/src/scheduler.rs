//! Background task scheduling for preemptive refreshes.
//!
//! The preemptive cache only needs a fire-and-forget `submit`. Two
//! implementations are provided:
//!
//! - [`DedicatedWorker`]: a single background task that runs submitted
//!   refreshes one at a time. This is the default.
//! - [`SpawnScheduler`]: spawns every submitted refresh as its own tokio task.
//!
//! # Graceful Shutdown
//!
//! `DedicatedWorker` owns a cancellation token. Calling
//! [`DedicatedWorker::shutdown`] or dropping the worker cancels it; the
//! in-flight refresh is abandoned and queued refreshes are discarded.

use futures::future::BoxFuture;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::JwksError;

/// A unit of background work. Failures are handled inside the task.
pub type RefreshTask = BoxFuture<'static, ()>;

/// Runs background refreshes off the caller's task.
pub trait RefreshScheduler: Send + Sync {
    /// Queue `task` for execution. Must not block.
    fn submit(&self, task: RefreshTask);
}

/// Single background task draining a queue of refreshes sequentially.
#[derive(Debug)]
pub struct DedicatedWorker {
    sender: mpsc::UnboundedSender<RefreshTask>,
    cancel_token: CancellationToken,
}

impl DedicatedWorker {
    /// Start a worker on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `JwksError::Configuration` when called outside a tokio runtime.
    pub fn spawn() -> Result<Self, JwksError> {
        let runtime = Handle::try_current().map_err(|e| {
            JwksError::Configuration(format!("background worker requires a tokio runtime: {e}"))
        })?;
        Ok(Self::spawn_on(&runtime))
    }

    /// Start a worker on the given runtime.
    #[must_use]
    pub fn spawn_on(runtime: &Handle) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();
        runtime.spawn(run_worker(receiver, cancel_token.clone()));
        Self {
            sender,
            cancel_token,
        }
    }

    /// Stop the worker. Queued and in-flight refreshes are abandoned.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

impl RefreshScheduler for DedicatedWorker {
    fn submit(&self, task: RefreshTask) {
        if self.cancel_token.is_cancelled() || self.sender.send(task).is_err() {
            warn!(
                target: "jwks.cache.worker",
                "Background worker is stopped, dropping refresh task"
            );
        }
    }
}

impl Drop for DedicatedWorker {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

async fn run_worker(
    mut receiver: mpsc::UnboundedReceiver<RefreshTask>,
    cancel_token: CancellationToken,
) {
    debug!(target: "jwks.cache.worker", "Starting background refresh worker");

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                info!(
                    target: "jwks.cache.worker",
                    "Background refresh worker received shutdown signal, exiting"
                );
                break;
            }
            task = receiver.recv() => {
                let Some(task) = task else {
                    // All senders dropped
                    break;
                };
                tokio::select! {
                    biased;
                    _ = cancel_token.cancelled() => {
                        info!(
                            target: "jwks.cache.worker",
                            "Abandoning in-flight refresh on shutdown"
                        );
                        break;
                    }
                    () = task => {}
                }
            }
        }
    }

    debug!(target: "jwks.cache.worker", "Background refresh worker stopped");
}

/// Spawns each refresh as an independent tokio task.
#[derive(Debug, Clone)]
pub struct SpawnScheduler {
    runtime: Handle,
}

impl SpawnScheduler {
    #[must_use]
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    /// Use the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `JwksError::Configuration` when called outside a tokio runtime.
    pub fn current() -> Result<Self, JwksError> {
        let runtime = Handle::try_current().map_err(|e| {
            JwksError::Configuration(format!("spawn scheduler requires a tokio runtime: {e}"))
        })?;
        Ok(Self::new(runtime))
    }
}

impl RefreshScheduler for SpawnScheduler {
    fn submit(&self, task: RefreshTask) {
        self.runtime.spawn(task);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[test]
    fn test_spawn_outside_runtime_fails() {
        let result = DedicatedWorker::spawn();
        assert!(matches!(result, Err(JwksError::Configuration(_))));

        let result = SpawnScheduler::current();
        assert!(matches!(result, Err(JwksError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_worker_runs_tasks_in_order() {
        let worker = DedicatedWorker::spawn().unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));
        let (done_tx, done_rx) = oneshot::channel();

        for i in 0..3 {
            let order = Arc::clone(&order);
            worker.submit(
                async move {
                    order.lock().unwrap().push(i);
                }
                .boxed(),
            );
        }
        worker.submit(
            async move {
                let _ = done_tx.send(());
            }
            .boxed(),
        );

        tokio::time::timeout(Duration::from_secs(5), done_rx)
            .await
            .expect("worker should drain queue")
            .unwrap();
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_shutdown_discards_new_tasks() {
        let worker = DedicatedWorker::spawn().unwrap();
        worker.shutdown();
        assert!(worker.is_shut_down());

        let (done_tx, done_rx) = oneshot::channel::<()>();
        worker.submit(
            async move {
                let _ = done_tx.send(());
            }
            .boxed(),
        );

        // The task is dropped without running, so the sender is dropped too
        let result = tokio::time::timeout(Duration::from_secs(5), done_rx)
            .await
            .expect("channel should resolve");
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_drop_cancels_worker() {
        let worker = DedicatedWorker::spawn().unwrap();
        let token = worker.cancel_token.clone();
        drop(worker);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_spawn_scheduler_runs_task() {
        let scheduler = SpawnScheduler::current().unwrap();
        let (done_tx, done_rx) = oneshot::channel();
        scheduler.submit(
            async move {
                let _ = done_tx.send(42);
            }
            .boxed(),
        );

        let value = tokio::time::timeout(Duration::from_secs(5), done_rx)
            .await
            .expect("task should run")
            .unwrap();
        assert_eq!(value, 42);
    }
}
