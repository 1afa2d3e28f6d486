use crate::RawMutex;
use core::cell::Cell;

/// A no-op lock for single-threaded use.
///
/// `RawUnsync` satisfies the [`RawMutex`] lifecycle without providing any
/// exclusion: [`acquire`](RawMutex::acquire) always succeeds immediately and
/// [`release`](RawMutex::release) does nothing. Pick it when the consumer
/// runs on a single thread and the locking overhead is unwanted.
///
/// The `created` flag lives in a [`Cell`], which makes the type `!Sync`:
/// a value guarded by `RawUnsync` cannot be shared across threads, so the
/// missing exclusion cannot be misused.
///
/// # Examples
///
/// ```
/// use heap_sync::{RawMutex, RawUnsync};
///
/// let lock = RawUnsync::new();
/// assert!(lock.create());
/// assert!(lock.acquire());
/// unsafe { lock.release(); }
/// ```
pub struct RawUnsync {
    /// Indicates whether [`RawMutex::create`] has run on this handle.
    created: Cell<bool>,
}

impl Default for RawUnsync {
    fn default() -> Self {
        Self::new()
    }
}

impl RawUnsync {
    /// Creates a new handle in the not-created state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            created: Cell::new(false),
        }
    }
}

impl RawMutex for RawUnsync {
    const INIT: Self = Self::new();

    #[inline]
    fn create(&self) -> bool {
        !self.created.replace(true)
    }

    #[inline]
    fn is_created(&self) -> bool {
        self.created.get()
    }

    #[inline]
    fn acquire(&self) -> bool {
        true
    }

    #[inline]
    unsafe fn release(&self) {}
}
