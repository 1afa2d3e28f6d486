//! # Host lock primitives for the heap crates
//!
//! Arenas serialize their public operations through a single coarse lock.
//! The lock itself is platform business: an RTOS mutex, a bare-metal
//! spinlock, or nothing at all on a single-threaded core. This crate defines
//! the [`RawMutex`] adapter those arenas lock through, a busy-waiting
//! [`SpinMutex`] for hosts without an OS, and the no-op [`RawUnsync`] for
//! single-threaded use. Hosts with a real mutex primitive implement
//! [`RawMutex`] over their own handle type instead.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod raw_unsync;
mod spin;

pub use raw_unsync::RawUnsync;
pub use spin::SpinMutex;

/// Host mutex adapter.
///
/// A `RawMutex` is a lock *handle* with an explicit creation step, so a
/// consumer embedding one in a `static` can defer platform setup until the
/// moment it is first configured. The lifecycle is:
///
/// 1. The handle starts in the not-created state ([`INIT`](Self::INIT)).
/// 2. [`create`](Self::create) performs one-time platform setup.
/// 3. [`acquire`](Self::acquire) / [`release`](Self::release) bracket each
///    critical section. `acquire` waits unboundedly; there is no timeout or
///    cancellation surface.
///
/// [`is_created`](Self::is_created) exists so consumers can detect a
/// double-initialization attempt before calling `create` a second time.
pub trait RawMutex {
    /// A handle in the not-created state, usable in `const` contexts.
    const INIT: Self;

    /// Perform one-time setup of the handle.
    ///
    /// Returns `true` on success. Returns `false` if the platform could not
    /// set the handle up, or if the handle was already created.
    fn create(&self) -> bool;

    /// Whether [`create`](Self::create) has already succeeded on this handle.
    fn is_created(&self) -> bool;

    /// Block until the calling thread owns the lock.
    ///
    /// Returns `false` only if the platform reports a failure to take the
    /// lock, such as a handle that was never created.
    fn acquire(&self) -> bool;

    /// Release ownership of the lock.
    ///
    /// # Safety
    ///
    /// The calling thread must own the lock via a prior successful
    /// [`acquire`](Self::acquire).
    unsafe fn release(&self);
}
