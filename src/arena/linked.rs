//! Fallback allocator for objects too large to bump-allocate.
//!
//! Each allocation is its own OS allocation, tracked in a pointer map so
//! the owning arena can recognize and free them individually or in bulk.

use std::alloc::{alloc, alloc_zeroed, dealloc, handle_alloc_error, realloc, Layout};
use std::collections::HashMap;

use crate::arena::ALIGN;

/// Registry of individually-allocated blocks.
///
/// Used by [`BlockArena`](crate::arena::BlockArena) for requests at or
/// above its separate-allocation threshold, so one huge request does not
/// waste the remainder of the current bucket.
pub struct LinkedAllocator {
    blocks: HashMap<usize, Layout>,
}

impl LinkedAllocator {
    /// Create an empty allocator.
    pub fn new() -> Self {
        Self {
            blocks: HashMap::new(),
        }
    }

    /// Allocate `size` bytes as a standalone block. Aborts on OOM.
    pub fn allocate(&mut self, size: usize, zero: bool) -> *mut u8 {
        let layout = Layout::from_size_align(size, ALIGN).expect("Invalid block layout");

        // SAFETY: layout has non-zero size and valid alignment
        let ptr = unsafe {
            if zero {
                alloc_zeroed(layout)
            } else {
                alloc(layout)
            }
        };
        if ptr.is_null() {
            handle_alloc_error(layout);
        }

        self.blocks.insert(ptr as usize, layout);
        ptr
    }

    /// Resize a block owned by this allocator. Aborts on OOM.
    ///
    /// Returns the (possibly moved) pointer. With `zero`, the grown region
    /// is zero-initialized.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by [`allocate`](Self::allocate) or a
    /// previous `resize` on this allocator and not released since.
    pub unsafe fn resize(&mut self, ptr: *mut u8, new_size: usize, zero: bool) -> *mut u8 {
        let layout = self
            .blocks
            .remove(&(ptr as usize))
            .expect("Resizing unknown block");
        let old_size = layout.size();

        // SAFETY: ptr/layout pair comes from our own map
        let new_ptr = unsafe { realloc(ptr, layout, new_size) };
        if new_ptr.is_null() {
            handle_alloc_error(Layout::from_size_align(new_size, ALIGN).expect("Invalid block layout"));
        }

        if zero && new_size > old_size {
            // SAFETY: the grown tail is within the reallocated block
            unsafe {
                std::ptr::write_bytes(new_ptr.add(old_size), 0, new_size - old_size);
            }
        }

        let new_layout = Layout::from_size_align(new_size, ALIGN).expect("Invalid block layout");
        self.blocks.insert(new_ptr as usize, new_layout);

        new_ptr
    }

    /// Free `ptr` if it belongs to this allocator.
    ///
    /// Returns true when the block was ours (and is now freed).
    pub fn release(&mut self, ptr: *mut u8) -> bool {
        match self.blocks.remove(&(ptr as usize)) {
            Some(layout) => {
                // SAFETY: ptr/layout pair comes from our own map
                unsafe {
                    dealloc(ptr, layout);
                }
                true
            }
            None => false,
        }
    }

    /// Check whether `ptr` belongs to this allocator.
    pub fn owns(&self, ptr: *const u8) -> bool {
        self.blocks.contains_key(&(ptr as usize))
    }

    /// Free every block.
    pub fn release_all(&mut self) {
        for (addr, layout) in self.blocks.drain() {
            // SAFETY: every map entry is a live allocation of ours
            unsafe {
                dealloc(addr as *mut u8, layout);
            }
        }
    }

    /// Number of live blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether the allocator holds no blocks.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl Default for LinkedAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LinkedAllocator {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_release() {
        let mut linked = LinkedAllocator::new();

        let ptr = linked.allocate(4096, false);
        assert!(!ptr.is_null());
        assert!(linked.owns(ptr));
        assert_eq!(linked.len(), 1);

        assert!(linked.release(ptr));
        assert!(linked.is_empty());

        // Releasing a foreign pointer is a no-op
        let mut x = 0u8;
        assert!(!linked.release(&mut x as *mut u8));
    }

    #[test]
    fn test_zeroed() {
        let mut linked = LinkedAllocator::new();

        let ptr = linked.allocate(64, true);
        let bytes = unsafe { std::slice::from_raw_parts(ptr, 64) };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_resize_preserves_content() {
        let mut linked = LinkedAllocator::new();

        let ptr = linked.allocate(32, false);
        unsafe {
            std::ptr::write_bytes(ptr, 0xAB, 32);
        }

        let ptr = unsafe { linked.resize(ptr, 4096, true) };
        let bytes = unsafe { std::slice::from_raw_parts(ptr, 4096) };
        assert!(bytes[..32].iter().all(|&b| b == 0xAB));
        assert!(bytes[32..].iter().all(|&b| b == 0));

        assert!(linked.release(ptr));
    }

    #[test]
    fn test_release_all() {
        let mut linked = LinkedAllocator::new();

        for _ in 0..8 {
            linked.allocate(128, false);
        }
        assert_eq!(linked.len(), 8);

        linked.release_all();
        assert!(linked.is_empty());
    }
}
