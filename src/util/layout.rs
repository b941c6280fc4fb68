//! Alignment utilities.

/// Align a size up to the given (power-of-two) alignment.
#[inline]
pub const fn align_up(size: usize, align: usize) -> usize {
    (size + align - 1) & !(align - 1)
}
