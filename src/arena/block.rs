//! Block arena - bump allocator over coarse OS buckets.
//!
//! This is the scratch-memory workhorse: many small, same-lifetime
//! allocations, released en masse with `release_all`. Requests too large
//! to bump-allocate go through the linked fallback allocator instead, so
//! one huge request never wastes the remainder of the current bucket.

use std::ptr;

use crate::arena::bucket::Bucket;
use crate::arena::linked::LinkedAllocator;
use crate::arena::ALIGN;
use crate::util::layout::align_up;
use crate::util::size::kb;

/// Default bucket size for block arenas.
pub const BLOCK_ARENA_DEFAULT_SIZE: usize = kb(4);

/// Configuration for a block arena.
#[derive(Debug, Clone)]
pub struct ArenaConfig {
    /// Size of each bucket in bytes (default: 4 KiB)
    pub block_size: usize,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            block_size: BLOCK_ARENA_DEFAULT_SIZE,
        }
    }
}

impl ArenaConfig {
    /// Builder pattern: set bucket size.
    pub fn with_block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }
}

/// Sentinel pointer returned for zero-sized allocations.
#[inline]
fn dangling() -> *mut u8 {
    ALIGN as *mut u8
}

/// Bump allocator over a list of coarse buckets, with a separate-allocation
/// fallback for large objects.
///
/// Pointers returned by [`alloc`](Self::alloc) stay valid until
/// [`release_all`](Self::release_all) or drop. Individual
/// [`release`](Self::release) calls only truly free memory for the most
/// recent allocation or for separately-allocated blocks; everything else is
/// abandoned in place and reclaimed in bulk.
///
/// Not thread-safe: one arena per owner (typically one per request or per
/// worker).
///
/// # Example
///
/// ```
/// use bedrock::BlockArena;
///
/// let mut arena = BlockArena::new();
/// let p1 = arena.alloc(16);
/// let p2 = arena.alloc(16);
/// assert_eq!(p2 as usize, p1 as usize + 16);
/// arena.release_all();
/// ```
pub struct BlockArena {
    block_size: usize,
    buckets: Vec<Bucket>,
    separate: LinkedAllocator,

    /// Most recent allocation, for the zero-copy growth fast path.
    last_alloc: *mut u8,
}

impl BlockArena {
    /// Create an arena with the default bucket size.
    pub fn new() -> Self {
        Self::with_config(ArenaConfig::default())
    }

    /// Create an arena with the given configuration.
    pub fn with_config(config: ArenaConfig) -> Self {
        assert!(config.block_size > 0, "Bucket size must be positive");

        Self {
            block_size: config.block_size,
            buckets: Vec::new(),
            separate: LinkedAllocator::new(),
            last_alloc: ptr::null_mut(),
        }
    }

    /// Requests at or past this limit bypass bump allocation.
    #[inline]
    fn allocate_separately(&self, aligned_size: usize) -> bool {
        aligned_size >= self.block_size / 2
    }

    /// Allocate `size` bytes, aligned to 16.
    ///
    /// The returned memory is uninitialized. Zero-sized requests return a
    /// dangling (non-null, unusable) pointer. Aborts on OOM.
    pub fn alloc(&mut self, size: usize) -> *mut u8 {
        self.alloc_impl(size, false)
    }

    /// Allocate `size` zero-initialized bytes.
    pub fn alloc_zeroed(&mut self, size: usize) -> *mut u8 {
        self.alloc_impl(size, true)
    }

    fn alloc_impl(&mut self, size: usize, zero: bool) -> *mut u8 {
        if size == 0 {
            return dangling();
        }

        let aligned = align_up(size, ALIGN);

        let ptr = if self.allocate_separately(aligned) {
            self.separate.allocate(aligned, zero)
        } else {
            let need_new = self
                .buckets
                .last()
                .map_or(true, |bucket| bucket.remaining() < aligned);
            if need_new {
                self.buckets.push(Bucket::new(self.block_size));
            }

            // A fresh bucket always fits: aligned < block_size / 2
            let bucket = self.buckets.last_mut().expect("No bucket after push");
            let ptr = bucket.bump(aligned).expect("Bump failed in fresh bucket");

            if zero {
                // SAFETY: the bucket just handed us `aligned` writable bytes
                unsafe {
                    ptr::write_bytes(ptr, 0, aligned);
                }
            }
            ptr
        };

        self.last_alloc = ptr;
        ptr
    }

    /// Resize an allocation to `new_size` bytes.
    ///
    /// Growing the most recent allocation stays in place (same pointer,
    /// no copy) as long as it fits the current bucket and stays under the
    /// separate-allocation threshold; otherwise the content is copied into
    /// a fresh block. `new_size == 0` behaves as [`release`](Self::release).
    ///
    /// # Safety
    ///
    /// `ptr` must come from this arena with `old_size` matching the original
    /// request, and must not have been released.
    pub unsafe fn resize(&mut self, ptr: *mut u8, old_size: usize, new_size: usize) -> *mut u8 {
        unsafe { self.resize_impl(ptr, old_size, new_size, false) }
    }

    /// Like [`resize`](Self::resize), zero-initializing any grown region.
    ///
    /// # Safety
    ///
    /// Same contract as [`resize`](Self::resize).
    pub unsafe fn resize_zeroed(
        &mut self,
        ptr: *mut u8,
        old_size: usize,
        new_size: usize,
    ) -> *mut u8 {
        unsafe { self.resize_impl(ptr, old_size, new_size, true) }
    }

    unsafe fn resize_impl(
        &mut self,
        ptr: *mut u8,
        old_size: usize,
        new_size: usize,
        zero: bool,
    ) -> *mut u8 {
        if new_size == 0 {
            // SAFETY: forwarded caller contract
            unsafe {
                self.release(ptr, old_size);
            }
            return dangling();
        }
        if ptr.is_null() || old_size == 0 {
            return self.alloc_impl(new_size, zero);
        }

        let aligned_old = align_up(old_size, ALIGN);
        let aligned_new = align_up(new_size, ALIGN);

        // Separately-allocated block staying past the threshold: realloc
        if self.separate.owns(ptr) && self.allocate_separately(aligned_new) {
            let was_last = ptr == self.last_alloc;

            // SAFETY: ownership just verified
            let new_ptr = unsafe { self.separate.resize(ptr, aligned_new, zero) };
            if was_last {
                self.last_alloc = new_ptr;
            }
            return new_ptr;
        }

        // Zero-copy fast path: adjust the tail of the current bucket
        if ptr == self.last_alloc
            && !self.separate.owns(ptr)
            && !self.allocate_separately(aligned_new)
        {
            if let Some(bucket) = self.buckets.last_mut() {
                if bucket.contains(ptr) {
                    let delta = aligned_new as isize - aligned_old as isize;

                    if bucket.adjust_tail(delta) {
                        if zero && new_size > old_size {
                            // SAFETY: grown tail is inside the bucket
                            unsafe {
                                ptr::write_bytes(ptr.add(old_size), 0, new_size - old_size);
                            }
                        }
                        return ptr;
                    }
                }
            }
        }

        // Slow path: fresh block, copy, drop the old one if it was separate.
        // Bump-allocated blocks that are not the tail are abandoned in place.
        let new_ptr = self.alloc_impl(new_size, false);
        let copy_len = old_size.min(new_size);

        // SAFETY: both regions are live and at least `copy_len` bytes
        unsafe {
            ptr::copy_nonoverlapping(ptr, new_ptr, copy_len);
            if zero && new_size > copy_len {
                ptr::write_bytes(new_ptr.add(copy_len), 0, new_size - copy_len);
            }
        }

        self.separate.release(ptr);
        new_ptr
    }

    /// Release one allocation.
    ///
    /// Only a true free when `ptr` is the arena's most recent allocation
    /// (the bucket cursor rewinds, and an emptied bucket is returned to the
    /// OS) or was separately allocated. Anything else is a no-op; the space
    /// is reclaimed at [`release_all`](Self::release_all).
    ///
    /// # Safety
    ///
    /// `ptr` must come from this arena with `size` matching the original
    /// request, and must not have been released before.
    pub unsafe fn release(&mut self, ptr: *mut u8, size: usize) {
        if ptr.is_null() || size == 0 {
            return;
        }

        if self.separate.release(ptr) {
            if ptr == self.last_alloc {
                self.last_alloc = ptr::null_mut();
            }
            return;
        }

        if ptr == self.last_alloc {
            if let Some(bucket) = self.buckets.last_mut() {
                if bucket.contains(ptr) {
                    bucket.rewind(align_up(size, ALIGN));
                    if bucket.is_empty() {
                        self.buckets.pop();
                    }
                }
            }
            self.last_alloc = ptr::null_mut();
        }
    }

    /// Free every bucket and separately-allocated block.
    ///
    /// This is the normal teardown path; it invalidates every pointer the
    /// arena ever returned.
    pub fn release_all(&mut self) {
        self.buckets.clear();
        self.separate.release_all();
        self.last_alloc = ptr::null_mut();
    }

    /// Number of buckets currently owned.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Number of live separately-allocated blocks.
    pub fn separate_count(&self) -> usize {
        self.separate.len()
    }

    /// Bytes consumed across all buckets (cursor positions, not capacity).
    pub fn used_bytes(&self) -> usize {
        self.buckets.iter().map(|bucket| bucket.used()).sum()
    }
}

impl Default for BlockArena {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tight_packing() {
        let mut arena = BlockArena::new();

        let p1 = arena.alloc(16);
        let p2 = arena.alloc(16);
        assert_eq!(p2 as usize, p1 as usize + 16);

        // Sub-alignment sizes round up to the next aligned slot
        let p3 = arena.alloc(1);
        assert_eq!(p3 as usize, p2 as usize + 16);
    }

    #[test]
    fn test_in_place_growth() {
        let mut arena = BlockArena::new();

        let ptr = arena.alloc(64);
        unsafe {
            std::ptr::write_bytes(ptr, 0x5A, 64);
        }

        // Growing the tail allocation never moves it
        let grown = unsafe { arena.resize(ptr, 64, 256) };
        assert_eq!(grown, ptr);
        assert_eq!(arena.bucket_count(), 1);

        let bytes = unsafe { std::slice::from_raw_parts(grown, 64) };
        assert!(bytes.iter().all(|&b| b == 0x5A));
    }

    #[test]
    fn test_growth_past_threshold_copies() {
        let mut arena = BlockArena::new();

        let ptr = arena.alloc(64);
        unsafe {
            std::ptr::write_bytes(ptr, 0x5A, 64);
        }

        // 4 KiB buckets: growing to 2 KiB crosses the separate threshold
        let grown = unsafe { arena.resize(ptr, 64, 2048) };
        assert_ne!(grown, ptr);
        assert_eq!(arena.separate_count(), 1);

        let bytes = unsafe { std::slice::from_raw_parts(grown, 64) };
        assert!(bytes.iter().all(|&b| b == 0x5A));
    }

    #[test]
    fn test_release_last_rewinds() {
        let mut arena = BlockArena::new();

        let _p1 = arena.alloc(16);
        let p2 = arena.alloc(16);

        unsafe {
            arena.release(p2, 16);
        }

        // The rewound space is handed out again
        let p3 = arena.alloc(16);
        assert_eq!(p3, p2);
    }

    #[test]
    fn test_release_empty_bucket() {
        let mut arena = BlockArena::new();

        let ptr = arena.alloc(16);
        assert_eq!(arena.bucket_count(), 1);

        unsafe {
            arena.release(ptr, 16);
        }
        assert_eq!(arena.bucket_count(), 0);
    }

    #[test]
    fn test_release_non_last_is_noop() {
        let mut arena = BlockArena::new();

        let p1 = arena.alloc(16);
        let p2 = arena.alloc(16);
        unsafe {
            std::ptr::write_bytes(p2, 0x77, 16);
            arena.release(p1, 16);
        }

        // p2 content survives, nothing was rewound
        let bytes = unsafe { std::slice::from_raw_parts(p2, 16) };
        assert!(bytes.iter().all(|&b| b == 0x77));
        assert_eq!(arena.used_bytes(), 32);
    }

    #[test]
    fn test_separate_allocation() {
        let mut arena = BlockArena::new();

        // At block_size / 2 the request goes to the fallback allocator
        let ptr = arena.alloc(2048);
        assert_eq!(arena.bucket_count(), 0);
        assert_eq!(arena.separate_count(), 1);

        unsafe {
            arena.release(ptr, 2048);
        }
        assert_eq!(arena.separate_count(), 0);
    }

    #[test]
    fn test_zeroed() {
        let mut arena = BlockArena::new();

        // Dirty a bucket, rewind, then ask for zeroed memory over the
        // same bytes
        let ptr = arena.alloc(64);
        unsafe {
            std::ptr::write_bytes(ptr, 0xFF, 64);
            arena.release(ptr, 64);
        }

        let ptr = arena.alloc_zeroed(64);
        let bytes = unsafe { std::slice::from_raw_parts(ptr, 64) };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_release_all() {
        let mut arena = BlockArena::new();

        for _ in 0..100 {
            arena.alloc(128);
        }
        arena.alloc(8192);
        assert!(arena.bucket_count() > 1);
        assert_eq!(arena.separate_count(), 1);

        arena.release_all();
        assert_eq!(arena.bucket_count(), 0);
        assert_eq!(arena.separate_count(), 0);
        assert_eq!(arena.used_bytes(), 0);
    }

    #[test]
    fn test_zero_size() {
        let mut arena = BlockArena::new();

        let ptr = arena.alloc(0);
        assert!(!ptr.is_null());
        assert_eq!(arena.bucket_count(), 0);

        unsafe {
            arena.release(ptr, 0);
        }
    }

    #[test]
    fn test_resize_to_zero_releases() {
        let mut arena = BlockArena::new();

        let ptr = arena.alloc(16);
        let ptr = unsafe { arena.resize(ptr, 16, 0) };
        assert_eq!(arena.bucket_count(), 0);

        unsafe {
            arena.release(ptr, 0);
        }
    }

    #[test]
    fn test_repeated_append_growth() {
        let mut arena = BlockArena::with_config(ArenaConfig::default().with_block_size(kb(64)));

        // Build a buffer by repeated appends: the classic growable-array
        // pattern the fast path exists for
        let mut ptr = arena.alloc(16);
        let mut size = 16;
        let first = ptr;

        while size < kb(16) {
            ptr = unsafe { arena.resize(ptr, size, size * 2) };
            size *= 2;
            assert_eq!(ptr, first);
        }
    }
}
