//! Coalescing background reconciliation tasks.
//!
//! A [`ReconcileTask`] wraps an async closure that reconciles some remote
//! state (typically "re-fetch this session's messages"). Callers poke it
//! with [`invalidate`](ReconcileTask::invalidate) as often as they like;
//! the task runs the closure at most once at a time and collapses every
//! invalidation that arrives mid-run into a single follow-up run. The
//! closure therefore observes "something changed since you last looked",
//! never a queue of individual changes.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

struct Shared {
    dirty: AtomicBool,
    wakeup: Notify,
}

/// Handle to a spawned reconciliation worker.
pub struct ReconcileTask {
    shared: Arc<Shared>,
    worker: JoinHandle<()>,
}

impl ReconcileTask {
    /// Spawns a worker driving `run`.
    ///
    /// The worker sleeps until invalidated, then keeps calling `run` until
    /// no invalidation arrived during the previous call.
    pub fn spawn<F, Fut>(mut run: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let shared = Arc::new(Shared {
            dirty: AtomicBool::new(false),
            wakeup: Notify::new(),
        });
        let worker_shared = Arc::clone(&shared);
        let worker = tokio::spawn(async move {
            loop {
                worker_shared.wakeup.notified().await;
                while worker_shared.dirty.swap(false, Ordering::SeqCst) {
                    run().await;
                }
            }
        });
        Self { shared, worker }
    }

    /// Marks the reconciled state dirty and wakes the worker.
    ///
    /// Invalidations arriving while the closure runs coalesce into one
    /// follow-up run.
    pub fn invalidate(&self) {
        self.shared.dirty.store(true, Ordering::SeqCst);
        self.shared.wakeup.notify_one();
    }

    /// Stops the worker. Pending invalidations are dropped.
    pub fn stop(&self) {
        self.worker.abort();
    }
}

impl Drop for ReconcileTask {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
