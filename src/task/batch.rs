//! Batches of fallible tasks with a blocking join point.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::task::pool::{PoolInner, QueuedTask, TaskPool, WorkerContext};

/// Shared per-batch bookkeeping.
pub(crate) struct BatchState {
    /// Tasks submitted and not yet finished (queued or running)
    pub(crate) remaining: AtomicUsize,
    /// Aggregate result; latches false on the first failed task
    pub(crate) success: AtomicBool,
    /// When set, a failure skips every not-yet-started task in the batch
    pub(crate) stop_after_error: bool,
}

/// A batch of tasks fanned out over a [`TaskPool`].
///
/// Tasks are closures returning `bool`; [`sync`](Self::sync) blocks until
/// every task finished (helping execute queued work meanwhile) and
/// reports whether all of them succeeded. A panicking task counts as
/// failed. The batch may be reused for further rounds after `sync`.
///
/// Every submitted task must be joined: dropping an `Async` with tasks
/// still in flight is a bug.
pub struct Async {
    pool: Arc<PoolInner>,
    state: Arc<BatchState>,
}

impl Async {
    /// New batch; all tasks run regardless of earlier failures.
    pub fn new(pool: &TaskPool) -> Self {
        Self::with_stop(pool, false)
    }

    /// New batch that skips not-yet-started tasks once one fails.
    pub fn stop_on_error(pool: &TaskPool) -> Self {
        Self::with_stop(pool, true)
    }

    fn with_stop(pool: &TaskPool, stop_after_error: bool) -> Self {
        Self {
            pool: pool.inner().clone(),
            state: Arc::new(BatchState {
                remaining: AtomicUsize::new(0),
                success: AtomicBool::new(true),
                stop_after_error,
            }),
        }
    }

    /// Queue `func` on the pool.
    pub fn run(&self, func: impl FnOnce(&WorkerContext) -> bool + Send + 'static) {
        self.submit(None, func);
    }

    /// Queue `func` from inside a running task. When `ctx` belongs to the
    /// same pool the task goes straight onto that thread's queue.
    pub fn run_from(
        &self,
        ctx: &WorkerContext,
        func: impl FnOnce(&WorkerContext) -> bool + Send + 'static,
    ) {
        let worker_idx = if Arc::ptr_eq(&self.pool, &ctx.pool) {
            Some(ctx.worker_idx)
        } else {
            None
        };
        self.submit(worker_idx, func);
    }

    fn submit(
        &self,
        worker_idx: Option<usize>,
        func: impl FnOnce(&WorkerContext) -> bool + Send + 'static,
    ) {
        self.state.remaining.fetch_add(1, Ordering::AcqRel);
        self.pool.add_task(
            worker_idx,
            QueuedTask {
                batch: self.state.clone(),
                func: Box::new(func),
            },
        );
    }

    /// Block until every task in this batch finished; the calling thread
    /// executes queued tasks (from any batch) while it waits.
    ///
    /// Returns true when all tasks in the batch returned true.
    pub fn sync(&self) -> bool {
        let ctx = WorkerContext {
            pool: self.pool.clone(),
            worker_idx: 0,
        };

        while self.state.remaining.load(Ordering::Acquire) > 0 {
            self.pool.run_tasks(&ctx);
            if self.state.remaining.load(Ordering::Acquire) == 0 {
                break;
            }

            // Wait for either the batch to drain or new stealable work;
            // both transitions notify sync_cv
            let guard = self.pool.shutdown.lock();
            let _guard = self.pool.sync_cv.wait_while(guard, |_| {
                self.state.remaining.load(Ordering::Acquire) > 0
                    && self.pool.pending_tasks.load(Ordering::Acquire) == 0
            });
        }

        self.state.success.load(Ordering::Relaxed)
    }

    /// Tasks still queued or running.
    pub fn remaining(&self) -> usize {
        self.state.remaining.load(Ordering::Acquire)
    }
}

impl Drop for Async {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            debug_assert_eq!(
                self.state.remaining.load(Ordering::Acquire),
                0,
                "Async dropped with tasks still in flight"
            );
        }
    }
}
