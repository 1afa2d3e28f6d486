//! # Region heap allocator
//!
//! A lightweight dynamic allocator over caller-supplied fixed-size byte
//! regions, for targets where the standard heap is unavailable or
//! unwanted: microcontrollers, hard-real-time cores, early boot
//! environments. Hand an [`Arena`] an address range — a reserved static
//! buffer, a device memory window — and it serves variable-sized
//! allocations out of it.
//!
//! ## Design outline
//!
//! - **Embedded free list**: free blocks carry their bookkeeping header
//!   in-region and are threaded into a singly linked list kept in
//!   **address order**, bounded by a head sentinel in the arena and a tail
//!   sentinel at the high end of the region.
//! - **First fit with splitting**: allocation walks the list for the first
//!   block large enough and splits off the remainder when it can stand as
//!   a block of its own.
//! - **Coalescing on release**: a freed block is inserted at its sorted
//!   slot and merged immediately with address-adjacent free neighbors, so
//!   fragmentation never outlives a release.
//! - **Bit-packed state**: the header's size word doubles as the
//!   allocated flag in its top bit; per-block overhead is exactly one
//!   aligned header.
//! - **Pluggable locking**: public operations serialize through a
//!   [`heap_sync::RawMutex`] chosen by type parameter, from a full
//!   platform mutex down to a no-op for single-threaded use.
//!
//! ## Usage
//!
//! ```
//! use heap_arena::Arena;
//!
//! #[repr(align(8))]
//! struct Backing([u8; 4096]);
//!
//! let mut backing = Backing([0; 4096]);
//! let arena: Arena = Arena::new();
//! unsafe { arena.define_region(backing.0.as_mut_ptr(), 4096) }.unwrap();
//!
//! let p = arena.allocate(100);
//! assert!(!p.is_null());
//! assert_eq!(p as usize % heap_arena::DEFAULT_ALIGN, 0);
//! unsafe { arena.release(p) };
//! ```
//!
//! A process-wide default arena is available through the free functions in
//! [`global`] for callers that do not want to thread a handle around, and
//! any arena whose lock is `Sync` can serve as `#[global_allocator]` for
//! layouts no stricter than its alignment.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod align;
mod arena;
mod block;
pub mod global;
mod global_alloc;

pub use align::{align_down, align_up, pad_up};
pub use arena::{Arena, DEFAULT_ALIGN, DefineRegionError};
pub use global::{allocate, default_arena, define_region, release};
