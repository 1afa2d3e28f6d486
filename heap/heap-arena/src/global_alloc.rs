//! Using an [`Arena`] as the Rust global allocator.
//!
//! Lets a `no_std` binary point `#[global_allocator]` at a static arena
//! over a reserved region and use the `alloc` collections on top of it.

use crate::arena::Arena;
use core::alloc::{GlobalAlloc, Layout};
use core::ptr::{self, null_mut};
use heap_sync::RawMutex;

unsafe impl<R: RawMutex, const A: usize> GlobalAlloc for Arena<R, A> {
    /// Allocate a block for `layout`.
    ///
    /// Blocks are `A`-aligned; layouts demanding more cannot be served and
    /// yield null, like any other allocation failure.
    ///
    /// # Safety
    ///
    /// The `GlobalAlloc` contract applies.
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > A {
            return null_mut();
        }
        self.allocate(layout.size())
    }

    /// Return a block previously obtained from `alloc`/`alloc_zeroed`.
    ///
    /// # Safety
    ///
    /// The `GlobalAlloc` contract applies.
    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        unsafe { self.release(ptr) }
    }

    /// Allocate and zero a block.
    ///
    /// # Safety
    ///
    /// The `GlobalAlloc` contract applies.
    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let p = unsafe { self.alloc(layout) };
        if !p.is_null() {
            unsafe { ptr::write_bytes(p, 0, layout.size()) };
        }
        p
    }
}
