//! Worker pool: per-worker task queues, parked threads, work stealing.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::sync::condvar::Condvar;
use crate::sync::mutex::Mutex;
use crate::task::batch::BatchState;

/// Hard ceiling on pool parallelism.
pub const MAX_THREADS: usize = 2048;

/// Workers re-check for work at least this often even without a wakeup.
const MAX_IDLE_TIME: Duration = Duration::from_millis(10_000);

/// Steal probes per sweep before a worker goes back to sleep, per queue.
const PROBES_PER_QUEUE: usize = 12;

/// Environment override for [`TaskPool::with_default_threads`].
const THREADS_ENV_VAR: &str = "BEDROCK_THREADS";

pub(crate) struct QueuedTask {
    pub(crate) batch: Arc<BatchState>,
    pub(crate) func: Box<dyn FnOnce(&WorkerContext) -> bool + Send>,
}

struct TaskQueue {
    tasks: Mutex<VecDeque<QueuedTask>>,
}

pub(crate) struct PoolInner {
    /// Set once, under this lock, when the pool is dropped
    pub(crate) shutdown: Mutex<bool>,
    /// Wakes parked workers when pending work appears (or on shutdown)
    pub(crate) pending_cv: Condvar,
    /// Wakes batch waiters when a batch drains or new work appears
    pub(crate) sync_cv: Condvar,
    /// Queue 0 belongs to the calling thread, 1.. to workers
    queues: Vec<TaskQueue>,
    /// Best-effort round-robin cursor for external submissions
    next_queue_idx: AtomicUsize,
    /// Tasks sitting in queues, not yet picked up
    pub(crate) pending_tasks: AtomicUsize,
}

/// Identifies the pool thread a task is running on.
///
/// Handed to every task closure; tasks that fan out further pass it to
/// [`Async::run_from`](crate::task::Async::run_from) so nested work lands
/// on the local queue instead of bouncing through the shared cursor.
pub struct WorkerContext {
    pub(crate) pool: Arc<PoolInner>,
    pub(crate) worker_idx: usize,
}

impl WorkerContext {
    /// Index of this thread's queue: 0 for the thread that created the
    /// pool, 1.. for spawned workers.
    pub fn worker_idx(&self) -> usize {
        self.worker_idx
    }
}

/// A fixed-size pool of worker threads executing [`Async`] batches.
///
/// `threads` counts total parallelism including the calling thread, so a
/// pool of 1 spawns no OS threads and runs everything inside
/// [`Async::sync`](crate::task::Async::sync). Dropping the pool finishes
/// queued tasks, then joins all workers.
///
/// # Example
///
/// ```
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use bedrock::{Async, TaskPool};
///
/// let pool = TaskPool::new(4);
/// let counter = std::sync::Arc::new(AtomicU32::new(0));
///
/// let batch = Async::new(&pool);
/// for _ in 0..16 {
///     let counter = counter.clone();
///     batch.run(move |_ctx| {
///         counter.fetch_add(1, Ordering::Relaxed);
///         true
///     });
/// }
/// assert!(batch.sync());
/// assert_eq!(counter.load(Ordering::Relaxed), 16);
/// ```
pub struct TaskPool {
    inner: Arc<PoolInner>,
    handles: Vec<JoinHandle<()>>,
}

impl TaskPool {
    /// Create a pool with exactly `threads` slots (clamped to
    /// 1..=[`MAX_THREADS`]).
    pub fn new(threads: usize) -> Self {
        let mut threads = threads.max(1);
        if threads > MAX_THREADS {
            log::warn!(
                "Limiting task pool to {} threads ({} requested)",
                MAX_THREADS,
                threads
            );
            threads = MAX_THREADS;
        }

        let inner = Arc::new(PoolInner {
            shutdown: Mutex::new(false),
            pending_cv: Condvar::new(),
            sync_cv: Condvar::new(),
            queues: (0..threads)
                .map(|_| TaskQueue {
                    tasks: Mutex::new(VecDeque::new()),
                })
                .collect(),
            next_queue_idx: AtomicUsize::new(0),
            pending_tasks: AtomicUsize::new(0),
        });

        let handles = (1..threads)
            .map(|worker_idx| {
                let inner = inner.clone();
                std::thread::Builder::new()
                    .name(format!("bedrock-worker-{worker_idx}"))
                    .spawn(move || worker_main(inner, worker_idx))
                    .unwrap_or_else(|err| panic!("Failed to spawn worker thread: {err}"))
            })
            .collect();

        Self { inner, handles }
    }

    /// Create a pool sized to the machine's logical CPU count, or to the
    /// `BEDROCK_THREADS` environment variable when set.
    pub fn with_default_threads() -> Self {
        let mut threads = num_cpus::get();

        if let Ok(value) = std::env::var(THREADS_ENV_VAR) {
            match value.parse::<usize>() {
                Ok(count) if count > 0 => threads = count,
                _ => log::error!(
                    "{}='{}' is not a valid thread count, ignoring",
                    THREADS_ENV_VAR,
                    value
                ),
            }
        }

        Self::new(threads)
    }

    /// Total parallelism, calling thread included.
    pub fn thread_count(&self) -> usize {
        self.inner.queues.len()
    }

    pub(crate) fn inner(&self) -> &Arc<PoolInner> {
        &self.inner
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        *self.inner.shutdown.lock() = true;
        self.inner.pending_cv.notify_all();
        self.inner.sync_cv.notify_all();

        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                log::error!("Worker thread panicked during shutdown");
            }
        }
    }
}

impl PoolInner {
    /// Queue a task. `worker_idx` pins it to that thread's queue (used by
    /// nested submissions); external submissions walk the round-robin
    /// cursor until an uncontended queue takes the task.
    pub(crate) fn add_task(&self, worker_idx: Option<usize>, task: QueuedTask) {
        match worker_idx {
            Some(idx) => self.queues[idx].tasks.lock().push_back(task),
            None => {
                let count = self.queues.len();
                let mut idx = self.next_queue_idx.load(Ordering::Relaxed) % count;

                let mut queue = loop {
                    idx = if idx == 0 { count - 1 } else { idx - 1 };
                    if let Some(guard) = self.queues[idx].tasks.try_lock() {
                        break guard;
                    }
                };
                queue.push_back(task);
                drop(queue);

                // Racy updates are fine, the cursor only spreads load
                self.next_queue_idx.store(idx, Ordering::Relaxed);
            }
        }

        if self.pending_tasks.fetch_add(1, Ordering::AcqRel) == 0 {
            let _guard = self.shutdown.lock();
            self.pending_cv.notify_all();
            self.sync_cv.notify_all();
        }
    }

    /// Drain queued tasks, starting from the calling thread's own queue
    /// and stealing from the others. Returns once a bounded sweep finds
    /// no runnable work.
    pub(crate) fn run_tasks(&self, ctx: &WorkerContext) {
        let count = self.queues.len();
        let max_probes = count * PROBES_PER_QUEUE;

        let mut idx = ctx.worker_idx;
        let mut probes = 0;

        while probes < max_probes && self.pending_tasks.load(Ordering::Acquire) > 0 {
            let task = self.queues[idx % count]
                .tasks
                .try_lock()
                .and_then(|mut queue| queue.pop_front());

            match task {
                Some(task) => {
                    self.run_task(ctx, task);
                    idx = ctx.worker_idx;
                    probes = 0;
                }
                None => {
                    idx += 1;
                    probes += 1;
                }
            }
        }
    }

    fn run_task(&self, ctx: &WorkerContext, task: QueuedTask) {
        self.pending_tasks.fetch_sub(1, Ordering::AcqRel);

        let batch = task.batch;
        let run = !batch.stop_after_error || batch.success.load(Ordering::Relaxed);
        if run {
            let success = match catch_unwind(AssertUnwindSafe(|| (task.func)(ctx))) {
                Ok(success) => success,
                Err(_) => {
                    log::error!("Task panicked, counting it as failed");
                    false
                }
            };
            if !success {
                batch.success.store(false, Ordering::Relaxed);
            }
        }

        if batch.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            let _guard = self.shutdown.lock();
            self.sync_cv.notify_all();
        }
    }
}

fn worker_main(inner: Arc<PoolInner>, worker_idx: usize) {
    log::trace!("Worker {} starting", worker_idx);

    let ctx = WorkerContext {
        pool: inner.clone(),
        worker_idx,
    };

    loop {
        inner.run_tasks(&ctx);

        let guard = inner.shutdown.lock();
        if *guard && inner.pending_tasks.load(Ordering::Acquire) == 0 {
            break;
        }

        // Parked until work appears or shutdown; the timeout is a
        // liveness guard against missed wakeups, not a policy
        let _ = inner.pending_cv.wait_timeout_while(guard, MAX_IDLE_TIME, |shutdown| {
            !*shutdown && inner.pending_tasks.load(Ordering::Acquire) == 0
        });
    }

    log::trace!("Worker {} exiting", worker_idx);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_count_clamped() {
        let pool = TaskPool::new(0);
        assert_eq!(pool.thread_count(), 1);
    }

    #[test]
    fn test_shutdown_with_no_tasks() {
        let pool = TaskPool::new(4);
        assert_eq!(pool.thread_count(), 4);
        drop(pool);
    }
}
