//! Power-of-two alignment arithmetic.
//!
//! Every address and size the allocator touches is rounded with these
//! helpers. They operate on `usize`, which is as wide as an address on every
//! supported target, and assume `align` is a power of two.

/// Align `value` downwards to `align` (must be a power of two).
#[inline]
#[must_use]
pub const fn align_down(value: usize, align: usize) -> usize {
    value & !(align - 1)
}

/// Align `value` upwards to `align` (must be a power of two).
#[inline]
#[must_use]
pub const fn align_up(value: usize, align: usize) -> usize {
    (value + (align - 1)) & !(align - 1)
}

/// The increment that rounds `value` up to the next `align` boundary.
#[inline]
#[must_use]
pub const fn pad_up(value: usize, align: usize) -> usize {
    align_up(value, align) - value
}
