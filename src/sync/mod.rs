//! Synchronization primitives.

pub(crate) mod condvar;
pub(crate) mod mutex;
