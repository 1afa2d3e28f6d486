//! The process-wide default arena.
//!
//! A single arena in the data segment, targeted by the free functions in
//! this module so simple firmware can use the allocator without threading
//! an arena handle around. It follows the same lifecycle as any other
//! arena: inert until [`define_region`] succeeds, then active for the rest
//! of the process.

use crate::arena::{Arena, DefineRegionError};

/// The default arena. Spin-locked, default alignment.
static DEFAULT: Arena = Arena::new();

/// The default arena itself, for callers that want the full [`Arena`] API.
#[must_use]
pub fn default_arena() -> &'static Arena {
    &DEFAULT
}

/// [`Arena::define_region`] on the default arena.
///
/// # Errors
///
/// See [`Arena::define_region`].
///
/// # Safety
///
/// See [`Arena::define_region`].
pub unsafe fn define_region(start: *mut u8, size: usize) -> Result<(), DefineRegionError> {
    unsafe { DEFAULT.define_region(start, size) }
}

/// [`Arena::allocate`] on the default arena.
///
/// Fails safely (returns null) while no region has been defined.
#[must_use]
pub fn allocate(size: usize) -> *mut u8 {
    DEFAULT.allocate(size)
}

/// [`Arena::release`] on the default arena.
///
/// A no-op while no region has been defined.
///
/// # Safety
///
/// See [`Arena::release`].
pub unsafe fn release(ptr: *mut u8) {
    unsafe { DEFAULT.release(ptr) }
}
