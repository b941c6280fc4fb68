//! Arena allocation: bump allocators over coarse OS buckets.
//!
//! The [`BlockArena`] amortizes teardown to O(#buckets) instead of
//! O(#allocations), which is what call sites building up short-lived
//! scratch data actually want. See the module types for the release rules.

mod block;
mod bucket;
mod linked;

pub use block::{ArenaConfig, BlockArena, BLOCK_ARENA_DEFAULT_SIZE};
pub use linked::LinkedAllocator;

/// Alignment of every pointer returned by the arena family.
pub const ALIGN: usize = 16;
