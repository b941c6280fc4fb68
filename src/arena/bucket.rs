//! One coarse memory block owned by a block arena.

use std::alloc::{alloc, dealloc, handle_alloc_error, Layout};
use std::ptr::NonNull;

use crate::arena::ALIGN;

/// A single bump-allocated block.
///
/// Sizes handed to `bump` must already be rounded up to [`ALIGN`], which
/// keeps the cursor aligned at all times.
pub(crate) struct Bucket {
    base: NonNull<u8>,
    capacity: usize,
    used: usize,
}

impl Bucket {
    /// Allocate a new bucket from the OS. Aborts on OOM.
    pub(crate) fn new(capacity: usize) -> Self {
        let layout = Layout::from_size_align(capacity, ALIGN).expect("Invalid bucket layout");

        // SAFETY: layout has non-zero size and valid alignment
        let ptr = unsafe { alloc(layout) };

        let base = match NonNull::new(ptr) {
            Some(base) => base,
            None => handle_alloc_error(layout),
        };

        Self {
            base,
            capacity,
            used: 0,
        }
    }

    /// Bump the cursor by `aligned_size` bytes.
    ///
    /// Returns None if the bucket lacks room.
    pub(crate) fn bump(&mut self, aligned_size: usize) -> Option<*mut u8> {
        debug_assert_eq!(aligned_size % ALIGN, 0);

        if self.used + aligned_size > self.capacity {
            return None;
        }

        // SAFETY: the cursor stays within the block we allocated in `new()`
        let ptr = unsafe { self.base.as_ptr().add(self.used) };
        self.used += aligned_size;

        Some(ptr)
    }

    /// Move the cursor back by `aligned_size` bytes (releasing the most
    /// recent allocation).
    pub(crate) fn rewind(&mut self, aligned_size: usize) {
        debug_assert!(aligned_size <= self.used, "Cannot rewind past bucket start");
        self.used -= aligned_size;
    }

    /// Grow or shrink the tail allocation in place.
    ///
    /// `delta` is the signed difference between the new and old aligned
    /// sizes. Returns false if growth would overflow the bucket.
    pub(crate) fn adjust_tail(&mut self, delta: isize) -> bool {
        if delta >= 0 {
            if self.used + delta as usize > self.capacity {
                return false;
            }
            self.used += delta as usize;
        } else {
            debug_assert!((-delta) as usize <= self.used);
            self.used -= (-delta) as usize;
        }
        true
    }

    /// Check whether `ptr` falls inside this bucket.
    pub(crate) fn contains(&self, ptr: *const u8) -> bool {
        let base = self.base.as_ptr() as usize;
        let addr = ptr as usize;
        addr >= base && addr < base + self.capacity
    }

    pub(crate) fn remaining(&self) -> usize {
        self.capacity - self.used
    }

    pub(crate) fn used(&self) -> usize {
        self.used
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.used == 0
    }
}

impl Drop for Bucket {
    fn drop(&mut self) {
        #[cfg(feature = "debug")]
        unsafe {
            std::ptr::write_bytes(self.base.as_ptr(), 0xCD, self.capacity);
        }

        let layout = Layout::from_size_align(self.capacity, ALIGN).expect("Invalid bucket layout");

        // SAFETY: `base` was allocated in `new()` with this exact layout
        unsafe {
            dealloc(self.base.as_ptr(), layout);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bump_and_rewind() {
        let mut bucket = Bucket::new(64);

        let p1 = bucket.bump(16).unwrap();
        let p2 = bucket.bump(16).unwrap();
        assert_eq!(p2 as usize, p1 as usize + 16);
        assert_eq!(bucket.remaining(), 32);

        bucket.rewind(16);
        assert_eq!(bucket.remaining(), 48);

        // Reuses the rewound space
        let p3 = bucket.bump(16).unwrap();
        assert_eq!(p3, p2);
    }

    #[test]
    fn test_exhaustion() {
        let mut bucket = Bucket::new(32);

        assert!(bucket.bump(32).is_some());
        assert!(bucket.bump(16).is_none());
    }

    #[test]
    fn test_contains() {
        let mut bucket = Bucket::new(64);
        let p = bucket.bump(16).unwrap();

        assert!(bucket.contains(p));
        assert!(!bucket.contains(std::ptr::null()));
    }
}
