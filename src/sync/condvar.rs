//! Condvar wrapper - uses parking_lot if available, std otherwise.
//!
//! Both paths expose the std-style consuming API: waits take the guard
//! by value and hand it back, with a `timed_out` flag for the bounded
//! variant.

use crate::sync::mutex::MutexGuard;

#[cfg(feature = "parking_lot")]
mod pl_condvar {
    use std::time::{Duration, Instant};

    use super::MutexGuard;

    /// Thin wrapper over parking_lot::Condvar.
    pub struct Condvar(parking_lot::Condvar);

    impl Condvar {
        /// Create a new condition variable.
        pub const fn new() -> Self {
            Self(parking_lot::Condvar::new())
        }

        /// Block while `condition` holds.
        pub fn wait_while<'a, T, F>(
            &self,
            mut guard: MutexGuard<'a, T>,
            mut condition: F,
        ) -> MutexGuard<'a, T>
        where
            F: FnMut(&mut T) -> bool,
        {
            while condition(&mut *guard) {
                self.0.wait(&mut guard);
            }
            guard
        }

        /// Block while `condition` holds, up to `timeout`. The second
        /// return value is true when the wait gave up with the condition
        /// still holding.
        pub fn wait_timeout_while<'a, T, F>(
            &self,
            mut guard: MutexGuard<'a, T>,
            timeout: Duration,
            mut condition: F,
        ) -> (MutexGuard<'a, T>, bool)
        where
            F: FnMut(&mut T) -> bool,
        {
            let deadline = Instant::now() + timeout;
            while condition(&mut *guard) {
                if self.0.wait_until(&mut guard, deadline).timed_out() {
                    let timed_out = condition(&mut *guard);
                    return (guard, timed_out);
                }
            }
            (guard, false)
        }

        /// Wake all waiters.
        pub fn notify_all(&self) {
            self.0.notify_all();
        }
    }
}

#[cfg(feature = "parking_lot")]
pub use pl_condvar::Condvar;

#[cfg(not(feature = "parking_lot"))]
mod std_condvar {
    use std::sync::Condvar as StdCondvar;
    use std::time::Duration;

    use super::MutexGuard;

    /// Thin wrapper around std::sync::Condvar.
    pub struct Condvar(StdCondvar);

    impl Condvar {
        /// Create a new condition variable.
        pub const fn new() -> Self {
            Self(StdCondvar::new())
        }

        /// Block while `condition` holds.
        pub fn wait_while<'a, T, F>(
            &self,
            guard: MutexGuard<'a, T>,
            condition: F,
        ) -> MutexGuard<'a, T>
        where
            F: FnMut(&mut T) -> bool,
        {
            MutexGuard(
                self.0
                    .wait_while(guard.0, condition)
                    .expect("Mutex poisoned"),
            )
        }

        /// Block while `condition` holds, up to `timeout`. The second
        /// return value is true when the wait gave up with the condition
        /// still holding.
        pub fn wait_timeout_while<'a, T, F>(
            &self,
            guard: MutexGuard<'a, T>,
            timeout: Duration,
            condition: F,
        ) -> (MutexGuard<'a, T>, bool)
        where
            F: FnMut(&mut T) -> bool,
        {
            let (guard, result) = self
                .0
                .wait_timeout_while(guard.0, timeout, condition)
                .expect("Mutex poisoned");
            (MutexGuard(guard), result.timed_out())
        }

        /// Wake all waiters.
        pub fn notify_all(&self) {
            self.0.notify_all();
        }
    }
}

#[cfg(not(feature = "parking_lot"))]
pub use std_condvar::Condvar;

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::mutex::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_wait_timeout_expires() {
        let mutex = Mutex::new(false);
        let cv = Condvar::new();

        let guard = mutex.lock();
        let (_guard, timed_out) =
            cv.wait_timeout_while(guard, Duration::from_millis(10), |ready| !*ready);
        assert!(timed_out);
    }

    #[test]
    fn test_notify_wakes_waiter() {
        let shared = Arc::new((Mutex::new(false), Condvar::new()));

        let worker = {
            let shared = shared.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                *shared.0.lock() = true;
                shared.1.notify_all();
            })
        };

        let guard = shared.0.lock();
        let guard = shared.1.wait_while(guard, |ready| !*ready);
        assert!(*guard);

        worker.join().unwrap();
    }
}
