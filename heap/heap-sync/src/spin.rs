use crate::RawMutex;
use core::hint::spin_loop;
use core::sync::atomic::{AtomicU8, Ordering};

/// Busy-waiting host mutex.
///
/// The whole adapter lifecycle lives in a single atomic byte:
/// [`create`](RawMutex::create) arms the handle, [`acquire`](RawMutex::acquire)
/// spins until it can move the word from unlocked to locked, and
/// [`release`](RawMutex::release) moves it back. Taking a handle that was
/// never created fails instead of blocking, the way an RTOS rejects an
/// uninitialized mutex handle.
///
/// Spinning burns cycles while contended. Consumers keep their critical
/// sections short; an arena's are bounded by one free-list walk.
///
/// # Examples
///
/// ```
/// use heap_sync::{RawMutex, SpinMutex};
///
/// let m = SpinMutex::new();
/// assert!(!m.acquire()); // not created yet
///
/// assert!(m.create());
/// assert!(m.acquire());
/// unsafe { m.release() };
/// ```
pub struct SpinMutex {
    /// Lifecycle and lock state in one word.
    state: AtomicU8,
}

impl SpinMutex {
    const UNCREATED: u8 = 0;
    const UNLOCKED: u8 = 1;
    const LOCKED: u8 = 2;

    /// A handle in the not-created state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(Self::UNCREATED),
        }
    }
}

impl Default for SpinMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl RawMutex for SpinMutex {
    const INIT: Self = Self::new();

    #[inline]
    fn create(&self) -> bool {
        self.state
            .compare_exchange(
                Self::UNCREATED,
                Self::UNLOCKED,
                Ordering::AcqRel,
                Ordering::Relaxed,
            )
            .is_ok()
    }

    #[inline]
    fn is_created(&self) -> bool {
        self.state.load(Ordering::Acquire) != Self::UNCREATED
    }

    #[inline]
    fn acquire(&self) -> bool {
        loop {
            match self.state.compare_exchange_weak(
                Self::UNLOCKED,
                Self::LOCKED,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(Self::UNCREATED) => return false,
                Err(_) => spin_loop(),
            }
        }
    }

    #[inline]
    unsafe fn release(&self) {
        self.state.store(Self::UNLOCKED, Ordering::Release);
    }
}
