//! Batch task scheduler over a work-stealing thread pool.
//!
//! A [`TaskPool`] owns the worker threads; any number of [`Async`]
//! batches fan tasks out over it and join on [`Async::sync`]. The thread
//! that calls `sync` participates in execution, so a pool of one thread
//! still makes progress.

mod batch;
mod pool;

pub use batch::Async;
pub use pool::{TaskPool, WorkerContext, MAX_THREADS};
