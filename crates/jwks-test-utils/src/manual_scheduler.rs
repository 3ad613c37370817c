//! Scheduler that runs background refreshes only when told to.
//!
//! Lets tests count dispatches exactly and decide when (or whether) a
//! background refresh executes.

use jwks_cache::{RefreshScheduler, RefreshTask};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Default)]
pub struct ManualScheduler {
    pending: Mutex<Vec<RefreshTask>>,
    submitted: AtomicUsize,
}

impl ManualScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of tasks ever submitted.
    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }

    /// Number of submitted tasks not yet run or discarded.
    pub fn pending(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Run every pending task to completion, in submission order.
    /// Returns how many ran.
    pub async fn run_all(&self) -> usize {
        let tasks: Vec<RefreshTask> = std::mem::take(&mut *self.pending.lock().unwrap());
        let count = tasks.len();
        for task in tasks {
            task.await;
        }
        count
    }

    /// Drop pending tasks without running them.
    pub fn discard_all(&self) -> usize {
        let tasks = std::mem::take(&mut *self.pending.lock().unwrap());
        tasks.len()
    }
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("submitted", &self.submitted())
            .field("pending", &self.pending())
            .finish()
    }
}

impl RefreshScheduler for ManualScheduler {
    fn submit(&self, task: RefreshTask) {
        self.submitted.fetch_add(1, Ordering::SeqCst);
        self.pending.lock().unwrap().push(task);
    }
}
