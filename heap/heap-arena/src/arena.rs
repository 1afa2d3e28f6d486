use crate::align::align_down;
use crate::block::{ALLOC_BIT, BlockHeader};
use core::cell::UnsafeCell;
use core::ptr::{self, null_mut};
use core::sync::atomic::{AtomicBool, Ordering};
use heap_sync::{RawMutex, SpinMutex};
use log::trace;
#[cfg(feature = "verify-region")]
use log::warn;

/// Default block alignment.
///
/// The classic embedded default of 4 bytes, widened on targets where a
/// [`BlockHeader`] needs stricter alignment (8 on 64-bit pointers): block
/// addresses double as header addresses, so the configured alignment can
/// never drop below what the header type demands.
pub const DEFAULT_ALIGN: usize = {
    let header = align_of::<BlockHeader>();
    if header > 4 { header } else { 4 }
};

/// Failure modes of [`Arena::define_region`].
///
/// Any failure leaves the arena inactive; a later `define_region` call with
/// a usable region may still succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DefineRegionError {
    #[error("arena already has a region defined")]
    AlreadyDefined,
    #[error("arena mutex was already created")]
    MutexAlreadyCreated,
    #[error("aligned base lies outside the region")]
    RegionOutOfRange,
    #[error("region cannot hold a block and the end sentinel")]
    RegionTooSmall,
    #[error("region size collides with the allocated flag")]
    SizeOverflowsWord,
    #[error("mutex creation failed")]
    MutexCreateFailed,
}

/// Free-list state of an arena. All mutation happens behind the arena lock.
///
/// The list is kept in **address order** so that neighbors can be detected
/// and coalesced on insertion: `head → b₁ → … → tail`, strictly increasing
/// by address, free blocks only.
struct ArenaInner<const A: usize> {
    /// Sentinel header; `head.next` is the lowest free block. It lives in
    /// the arena itself, outside the region, and keeps `size == 0` so the
    /// downward-merge adjacency test can never match it.
    head: BlockHeader,
    /// End sentinel placed at the high end of the region; null while no
    /// region is defined. Its size stays zero and it is never merged away.
    tail: *mut BlockHeader,
    /// Lowest block address of the region, kept for release bounds checks.
    #[cfg(feature = "verify-region")]
    start: *mut BlockHeader,
}

impl<const A: usize> ArenaInner<A> {
    /// Offset from a block header to its payload.
    const PAYLOAD_OFFSET: usize = crate::align::align_up(size_of::<BlockHeader>(), A);

    /// Smallest length a free block may be split down to.
    const MIN_BLOCK: usize = 2 * Self::PAYLOAD_OFFSET;

    const fn new() -> Self {
        Self {
            head: BlockHeader::new(0),
            tail: null_mut(),
            #[cfg(feature = "verify-region")]
            start: null_mut(),
        }
    }

    /// First-fit allocation walk over the free list.
    ///
    /// Returns the payload pointer, or null when the request is zero, not
    /// representable as a block length, or no free block is large enough.
    ///
    /// # Safety
    ///
    /// A region must be defined and the arena lock must be held.
    unsafe fn alloc(&mut self, size: usize) -> *mut u8 {
        if size == 0 {
            return null_mut();
        }

        // Pad the request to the alignment, add room for the header, and
        // reject any length that overflows or reaches the allocated flag.
        let Some(padded) = size.checked_add(A - 1) else {
            return null_mut();
        };
        let Some(want) = (padded & !(A - 1)).checked_add(Self::PAYLOAD_OFFSET) else {
            return null_mut();
        };
        if want & ALLOC_BIT != 0 {
            return null_mut();
        }

        // First fit: the lowest free block that can hold the request wins.
        let mut prev: *mut BlockHeader = &raw mut self.head;
        let mut curr = unsafe { (*prev).next };
        while unsafe { (*curr).size } < want && curr != self.tail {
            prev = curr;
            curr = unsafe { (*curr).next };
        }
        if curr == self.tail {
            return null_mut();
        }

        let payload = (curr as usize + Self::PAYLOAD_OFFSET) as *mut u8;

        // Unlink before splitting so the remainder insert cannot walk over
        // the chosen block.
        unsafe { (*prev).next = (*curr).next };

        // Split when the leftover can stand as a block of its own;
        // otherwise the whole block is handed out and the overshoot is
        // absorbed as internal fragmentation.
        let spare = unsafe { (*curr).size } - want;
        if spare >= Self::MIN_BLOCK {
            let rest = (curr as usize + want) as *mut BlockHeader;
            unsafe {
                ptr::write(rest, BlockHeader::new(spare));
                (*curr).size = want;
                self.insert(rest);
            }
        }

        unsafe { (*curr).mark_allocated() };
        payload
    }

    /// Give a payload pointer back to the free pool.
    ///
    /// # Safety
    ///
    /// A region must be defined and the arena lock must be held. `ptr` must
    /// come from [`alloc`](Self::alloc) on this arena unless the
    /// `verify-region` bounds check is enabled to reject strays.
    unsafe fn release(&mut self, ptr: *mut u8) {
        let block = (ptr as usize).wrapping_sub(Self::PAYLOAD_OFFSET) as *mut BlockHeader;

        #[cfg(feature = "verify-region")]
        if (block as usize) < (self.start as usize) || (block as usize) >= (self.tail as usize) {
            warn!("ignoring release of {ptr:p}: block outside the region");
            return;
        }

        // Cheap double-free net: the block must currently be allocated.
        if !unsafe { (*block).is_allocated() } {
            return;
        }
        unsafe {
            (*block).mark_free();
            self.insert(block);
        }
    }

    /// Insert a free block at its address-sorted slot, folding it into
    /// adjacent free neighbors.
    ///
    /// # Safety
    ///
    /// `block` must be a detached free block inside the region and the
    /// arena lock must be held.
    unsafe fn insert(&mut self, block: *mut BlockHeader) {
        let mut block = block;

        // Find the last list node below the block. The walk starts at the
        // head sentinel and the tail bounds it from above.
        let mut prev: *mut BlockHeader = &raw mut self.head;
        while (unsafe { (*prev).next } as usize) < block as usize {
            prev = unsafe { (*prev).next };
        }

        // Merge downwards. The head sentinel never matches: its size is
        // zero and it lives outside the region.
        if prev as usize + unsafe { (*prev).size } == block as usize {
            unsafe { (*prev).size += (*block).size };
            block = prev;
        }

        // Merge upwards. The tail sentinel is only pointed at, never
        // absorbed; its size stays zero.
        let next = unsafe { (*prev).next };
        if block as usize + unsafe { (*block).size } == next as usize && next != self.tail {
            unsafe {
                (*block).size += (*next).size;
                (*block).next = (*next).next;
            }
        } else {
            unsafe { (*block).next = next };
        }

        // Skip the link exactly when the downward merge folded the block
        // into its predecessor.
        if prev != block {
            unsafe { (*prev).next = block };
        }
    }
}

/// A single allocator instance governing one caller-supplied byte region.
///
/// An arena starts empty; [`define_region`](Self::define_region) attaches
/// the region, and [`allocate`](Self::allocate) /
/// [`release`](Self::release) then carve variable-sized blocks out of it
/// with a first-fit free list and immediate neighbor coalescing.
///
/// `R` is the [`RawMutex`] the public operations lock through — pick
/// [`SpinMutex`], a platform adapter of your own, or
/// [`RawUnsync`](heap_sync::RawUnsync) for single-threaded use. `A` is the
/// block alignment, a power of two no smaller than the header's own
/// alignment.
///
/// # Examples
///
/// ```
/// use heap_arena::Arena;
///
/// #[repr(align(8))]
/// struct Backing([u8; 1024]);
///
/// let mut backing = Backing([0; 1024]);
/// let arena: Arena = Arena::new();
/// unsafe { arena.define_region(backing.0.as_mut_ptr(), 1024) }.unwrap();
///
/// let p = arena.allocate(64);
/// assert!(!p.is_null());
/// unsafe { arena.release(p) };
/// ```
pub struct Arena<R = SpinMutex, const A: usize = DEFAULT_ALIGN> {
    /// Free-list state, accessed behind `mutex` once `active` is observed.
    inner: UnsafeCell<ArenaInner<A>>,
    /// Flips once a region is fully defined. The release store in
    /// `define_region` pairs with acquire loads at the public entry points,
    /// so an active arena implies an initialized region and mutex.
    active: AtomicBool,
    /// Host lock handle; created on the first successful `define_region`.
    mutex: R,
}

// Safety: the inner raw pointers are only dereferenced behind the mutex by
// whoever holds a reference to the arena; moving or sharing the arena
// itself is as safe as moving or sharing its lock handle.
unsafe impl<R: Send, const A: usize> Send for Arena<R, A> {}
unsafe impl<R: Sync, const A: usize> Sync for Arena<R, A> {}

impl<R: RawMutex, const A: usize> Arena<R, A> {
    /// Offset from a block header to its payload: the header size rounded
    /// up to `A`. Every allocation costs this many bytes on top of the
    /// (padded) request.
    pub const PAYLOAD_OFFSET: usize = ArenaInner::<A>::PAYLOAD_OFFSET;

    /// Smallest length a free block may be split down to.
    pub const MIN_BLOCK: usize = ArenaInner::<A>::MIN_BLOCK;

    /// Construct an arena with no region attached.
    #[must_use]
    pub const fn new() -> Self {
        const {
            assert!(A.is_power_of_two(), "alignment must be a power of two");
            assert!(
                A >= align_of::<BlockHeader>(),
                "alignment must be able to place a block header"
            );
        }
        Self {
            inner: UnsafeCell::new(ArenaInner::new()),
            active: AtomicBool::new(false),
            mutex: R::INIT,
        }
    }

    /// Whether a region has been defined on this arena.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Attach the byte region `[start, start + size)` to this arena.
    ///
    /// The window is trimmed to the alignment on both ends, an end sentinel
    /// is carved off the high end, and one free block spans the rest. The
    /// call succeeds at most once per arena; every failure leaves the arena
    /// inactive and the region untouched.
    ///
    /// # Errors
    ///
    /// [`DefineRegionError`] for a second definition, a window that cannot
    /// hold a minimal block plus the sentinel, a block length colliding
    /// with the allocated flag, or a failing mutex setup.
    ///
    /// # Safety
    ///
    /// - The range must be valid, writable, and handed to this arena
    ///   exclusively for as long as the arena is used.
    /// - No other operation on this arena may run concurrently with this
    ///   call (the lock it would take is only created here).
    pub unsafe fn define_region(
        &self,
        start: *mut u8,
        size: usize,
    ) -> Result<(), DefineRegionError> {
        if self.is_active() {
            return Err(DefineRegionError::AlreadyDefined);
        }
        if self.mutex.is_created() {
            return Err(DefineRegionError::MutexAlreadyCreated);
        }

        let b = Self::PAYLOAD_OFFSET;

        // Trim the window to the alignment on both ends.
        let start_addr = start as usize;
        let base = match start_addr.checked_add(A - 1) {
            Some(bumped) => bumped & !(A - 1),
            None => return Err(DefineRegionError::RegionOutOfRange),
        };
        let Some(end) = start_addr.checked_add(size) else {
            return Err(DefineRegionError::RegionOutOfRange);
        };
        if base > end {
            return Err(DefineRegionError::RegionOutOfRange);
        }

        // The trimmed window must hold one minimal block plus the sentinel.
        let window = end - base;
        if align_down(window, A) < 2 * b {
            return Err(DefineRegionError::RegionTooSmall);
        }

        // Carve the end sentinel off the high end; the first free block
        // spans everything up to it.
        let tail_addr = align_down(end - b, A);
        let first_size = tail_addr - base;
        if first_size & ALLOC_BIT != 0 {
            return Err(DefineRegionError::SizeOverflowsWord);
        }

        let tail = tail_addr as *mut BlockHeader;
        let first = base as *mut BlockHeader;
        unsafe {
            ptr::write(tail, BlockHeader::new(0));
            ptr::write(first, BlockHeader::new(first_size));
            (*first).next = tail;
        }

        // Safety: the arena is inactive and, per the call contract, nothing
        // else runs against it concurrently.
        let inner = unsafe { &mut *self.inner.get() };
        inner.head.next = first;
        inner.tail = tail;
        #[cfg(feature = "verify-region")]
        {
            inner.start = first;
        }

        if !self.mutex.create() {
            inner.head.next = null_mut();
            inner.tail = null_mut();
            return Err(DefineRegionError::MutexCreateFailed);
        }

        trace!("region defined: base {base:#x}, tail {tail_addr:#x}, first block {first_size} bytes");

        self.active.store(true, Ordering::Release);
        Ok(())
    }

    /// Allocate at least `size` contiguous, `A`-aligned bytes.
    ///
    /// Returns null when `size` is zero, the arena has no region, the
    /// padded request is not representable as a block length, no free block
    /// is large enough, or the lock could not be taken. The bytes are owned
    /// by the caller until handed back to [`release`](Self::release).
    #[must_use]
    pub fn allocate(&self, size: usize) -> *mut u8 {
        if !self.is_active() {
            return null_mut();
        }
        if !self.mutex.acquire() {
            return null_mut();
        }
        // Safety: the arena is active and the lock is held.
        let payload = unsafe { (*self.inner.get()).alloc(size) };
        // Safety: acquired right above.
        unsafe { self.mutex.release() };
        payload
    }

    /// Return the block whose payload is `ptr` to the free pool.
    ///
    /// The block is merged with the immediately preceding and following
    /// free blocks if they are adjacent. Null `ptr` is a no-op, as is a
    /// release on an inactive arena, a release of a block that is not
    /// currently allocated, and — with the `verify-region` feature — a
    /// pointer whose reconstructed header lies outside the region.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a pointer obtained from
    /// [`allocate`](Self::allocate) on this arena that has not been
    /// released since (the nets above catch common misuse, but they are
    /// nets, not a contract).
    pub unsafe fn release(&self, ptr: *mut u8) {
        if ptr.is_null() || !self.is_active() {
            return;
        }
        if !self.mutex.acquire() {
            return;
        }
        // Safety: the arena is active, the lock is held, and `ptr` is
        // vouched for by the caller.
        unsafe {
            (*self.inner.get()).release(ptr);
            self.mutex.release();
        }
    }
}

impl<R: RawMutex, const A: usize> Default for Arena<R, A> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heap_sync::RawUnsync;

    const ALIGN: usize = DEFAULT_ALIGN;
    type TestArena = Arena<RawUnsync>;
    const B: usize = TestArena::PAYLOAD_OFFSET;
    const MIN_BLOCK: usize = TestArena::MIN_BLOCK;

    #[repr(align(64))]
    struct Region([u8; 1024]);

    impl Region {
        fn new() -> Self {
            Self([0; 1024])
        }

        fn base(&self) -> usize {
            self.0.as_ptr() as usize
        }

        /// Length of the single free block spanning the fresh region.
        const SPAN: usize = 1024 - B;
    }

    fn define(mem: &mut Region) -> TestArena {
        let arena = TestArena::new();
        unsafe { arena.define_region(mem.0.as_mut_ptr(), mem.0.len()) }.unwrap();
        arena
    }

    /// Walk the free list, asserting the structural invariants, and return
    /// each node as `(address, size)`.
    fn free_blocks(arena: &TestArena) -> Vec<(usize, usize)> {
        let inner = unsafe { &*arena.inner.get() };
        assert_eq!(inner.head.size, 0, "head sentinel size must stay zero");
        assert_eq!(
            unsafe { (*inner.tail).size },
            0,
            "tail sentinel size must stay zero"
        );

        let mut out: Vec<(usize, usize)> = Vec::new();
        let mut curr = inner.head.next;
        while curr != inner.tail {
            let addr = curr as usize;
            let size = unsafe { (*curr).size };
            assert_eq!(size & ALLOC_BIT, 0, "allocated block on the free list");
            assert_eq!(size % ALIGN, 0, "free block size not aligned");
            if let Some(&(prev_addr, prev_size)) = out.last() {
                assert!(addr > prev_addr, "free list not address-sorted");
                assert!(
                    prev_addr + prev_size < addr,
                    "adjacent free blocks left unmerged"
                );
            }
            out.push((addr, size));
            curr = unsafe { (*curr).next };
        }
        out
    }

    fn header(payload: *mut u8) -> *const BlockHeader {
        (payload as usize - B) as *const BlockHeader
    }

    #[test]
    fn define_creates_single_spanning_block() {
        let mut mem = Region::new();
        let arena = define(&mut mem);
        assert!(arena.is_active());
        assert_eq!(free_blocks(&arena), vec![(mem.base(), Region::SPAN)]);
    }

    #[test]
    fn define_trims_an_unaligned_base() {
        let mut mem = Region::new();
        let arena = TestArena::new();
        unsafe { arena.define_region(mem.0.as_mut_ptr().add(1), 1023) }.unwrap();

        let blocks = free_blocks(&arena);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].0, mem.base() + ALIGN);
    }

    #[test]
    fn define_rejects_a_second_region() {
        let mut mem = Region::new();
        let arena = define(&mut mem);
        let err = unsafe { arena.define_region(mem.0.as_mut_ptr(), 1024) };
        assert_eq!(err, Err(DefineRegionError::AlreadyDefined));
    }

    #[test]
    fn define_rejects_undersized_windows_but_allows_retry() {
        let mut mem = Region::new();
        let arena = TestArena::new();

        for size in [0, 1, B, 2 * B - 1] {
            let err = unsafe { arena.define_region(mem.0.as_mut_ptr(), size) };
            assert_eq!(err, Err(DefineRegionError::RegionTooSmall));
            assert!(!arena.is_active());
        }

        // a failed attempt must not burn the arena
        unsafe { arena.define_region(mem.0.as_mut_ptr(), 1024) }.unwrap();
        assert!(arena.is_active());
    }

    #[test]
    fn minimal_window_yields_an_inert_block() {
        let mut mem = Region::new();
        let arena = TestArena::new();
        unsafe { arena.define_region(mem.0.as_mut_ptr(), 2 * B) }.unwrap();

        // the single free block is only a header wide and can serve nothing
        assert_eq!(free_blocks(&arena), vec![(mem.base(), B)]);
        assert!(arena.allocate(1).is_null());
    }

    #[test]
    fn allocate_splits_and_requeues_the_remainder() {
        let mut mem = Region::new();
        let arena = define(&mut mem);

        let p = arena.allocate(1);
        assert_eq!(p as usize, mem.base() + B);

        let want = B + ALIGN;
        assert_eq!(
            free_blocks(&arena),
            vec![(mem.base() + want, Region::SPAN - want)]
        );
        let h = header(p);
        assert!(unsafe { (*h).is_allocated() });
        assert_eq!(unsafe { (*h).raw_size() }, want);
    }

    #[test]
    fn allocate_hands_out_whole_block_when_remainder_is_too_small() {
        let mut mem = Region::new();
        let arena = define(&mut mem);

        // leave a remainder one alignment step short of a legal block
        let n = Region::SPAN - B - (MIN_BLOCK - ALIGN);
        let p = arena.allocate(n);
        assert!(!p.is_null());

        assert!(free_blocks(&arena).is_empty());
        assert_eq!(unsafe { (*header(p)).raw_size() }, Region::SPAN);

        // nothing is left to serve even the smallest request
        assert!(arena.allocate(1).is_null());
    }

    #[test]
    fn allocate_splits_when_remainder_is_exactly_min_block() {
        let mut mem = Region::new();
        let arena = define(&mut mem);

        let n = Region::SPAN - B - MIN_BLOCK;
        let p = arena.allocate(n);
        assert!(!p.is_null());
        assert_eq!(unsafe { (*header(p)).raw_size() }, Region::SPAN - MIN_BLOCK);
        assert_eq!(
            free_blocks(&arena),
            vec![(mem.base() + Region::SPAN - MIN_BLOCK, MIN_BLOCK)]
        );
    }

    #[test]
    fn release_merges_with_both_neighbors() {
        let mut mem = Region::new();
        let arena = define(&mut mem);
        let want = B + 32;

        let pa = arena.allocate(32);
        let pb = arena.allocate(32);
        let pc = arena.allocate(32);
        let rest = (mem.base() + 3 * want, Region::SPAN - 3 * want);
        assert_eq!(free_blocks(&arena), vec![rest]);

        // a hole appears between two allocated neighbors
        unsafe { arena.release(pb) };
        assert_eq!(free_blocks(&arena), vec![(mem.base() + want, want), rest]);

        // the lower neighbor folds into the hole
        unsafe { arena.release(pa) };
        assert_eq!(free_blocks(&arena), vec![(mem.base(), 2 * want), rest]);

        // the last release bridges hole and tail remainder into one span
        unsafe { arena.release(pc) };
        assert_eq!(free_blocks(&arena), vec![(mem.base(), Region::SPAN)]);
    }

    #[test]
    fn tail_sentinel_is_pointed_at_but_never_absorbed() {
        let mut mem = Region::new();
        let arena = define(&mut mem);

        // take the whole span so the free list is empty
        let p = arena.allocate(Region::SPAN - B);
        assert!(!p.is_null());
        assert!(free_blocks(&arena).is_empty());

        // the released block ends exactly at the tail sentinel
        unsafe { arena.release(p) };
        assert_eq!(free_blocks(&arena), vec![(mem.base(), Region::SPAN)]);
    }

    #[test]
    fn release_of_unallocated_block_is_ignored() {
        let mut mem = Region::new();
        let arena = define(&mut mem);

        let p = arena.allocate(64);
        let q = arena.allocate(64);
        unsafe { arena.release(p) };
        let snapshot = free_blocks(&arena);

        // double free: the allocated bit is already clear
        unsafe { arena.release(p) };
        assert_eq!(free_blocks(&arena), snapshot);

        unsafe { arena.release(q) };
        assert_eq!(free_blocks(&arena), vec![(mem.base(), Region::SPAN)]);
    }

    #[test]
    fn inactive_arena_fails_safely() {
        let arena = TestArena::new();
        assert!(!arena.is_active());
        assert!(arena.allocate(16).is_null());
        // the inactive check fires before the pointer is ever touched
        unsafe { arena.release(ALIGN as *mut u8) };
    }

    #[test]
    fn zero_and_oversize_requests_fail_without_state_change() {
        let mut mem = Region::new();
        let arena = define(&mut mem);
        let snapshot = free_blocks(&arena);

        assert!(arena.allocate(0).is_null());
        assert!(arena.allocate(usize::MAX).is_null());
        assert!(arena.allocate(usize::MAX - B).is_null());
        assert!(arena.allocate(ALLOC_BIT).is_null());
        assert!(arena.allocate(Region::SPAN).is_null());

        assert_eq!(free_blocks(&arena), snapshot);
    }

    #[cfg(feature = "verify-region")]
    #[test]
    fn release_outside_the_region_is_ignored() {
        let mut mem = Region::new();
        let arena = define(&mut mem);
        let p = arena.allocate(64);
        let snapshot = free_blocks(&arena);

        let tail_addr = mem.base() + Region::SPAN;

        // reconstructed header would be the tail sentinel itself
        unsafe { arena.release((tail_addr + B) as *mut u8) };
        // reconstructed header would sit below the first block
        unsafe { arena.release((mem.base() + B - ALIGN) as *mut u8) };

        assert_eq!(free_blocks(&arena), snapshot);

        // a legal pointer still round-trips
        unsafe { arena.release(p) };
        assert_eq!(free_blocks(&arena), vec![(mem.base(), Region::SPAN)]);
    }
}
