//! A worst-fit, coalescing allocator over a single caller-supplied byte
//! region. All bookkeeping — the address-ordered block list and the
//! size-ordered free list — lives inside the region itself; this module
//! never reaches for the host allocator.
//!
//! # Algorithm
//! Allocation always looks at the largest free block first (the free
//! list's head). If it fits, the request is carved off the *front* of
//! that block and the remainder — if large enough to be useful on its
//! own — is split off as a new, smaller free block. Freeing eagerly
//! coalesces with both address-ordered neighbors, so the free list never
//! contains two adjacent blocks. See [`allocator::Allocator`] for the
//! step-by-step contract.
//!
//! # Singleton state
//! There is exactly one region per process, guarded by [`ALLOCATOR`], a
//! `spin::Mutex`. Calling [`init`] again resets it to a fresh single free
//! block over a (possibly different) region; there is no way to have two
//! independent allocators in one process, by design — the process
//! manager's PCBs and stacks all come from this one region.

mod allocator;
mod block;

use allocator::Allocator;
use spin::Mutex;

pub use allocator::InvariantReport;

static ALLOCATOR: Mutex<Allocator> = Mutex::new(Allocator::uninit());

/// Establishes a single `FREE` block covering `[region, region + size)`.
///
/// Resets all allocator state; safe to call more than once (each call
/// discards every block and free-list entry from the previous region —
/// callers must not still be holding pointers from before a re-init).
///
/// # Safety
/// - `region` must be valid for reads and writes for `size` bytes for as
///   long as any pointer returned by [`alloc`] might still be in use.
/// - `size` must be at least large enough for one header plus the
///   minimum free payload (the free-list link pair); smaller is
///   undefined behavior, per the public contract.
pub unsafe fn init(region: *mut u8, size: usize) {
    unsafe {
        ALLOCATOR.lock().init(region, size);
    }
}

/// Allocates at least `size` bytes, aligned to the platform's pointer
/// alignment. `size` is first raised to the minimum allocatable payload
/// and rounded up to that alignment. Returns a null pointer if no free
/// block is large enough.
pub fn alloc(size: usize) -> *mut u8 {
    ALLOCATOR.lock().alloc(size)
}

/// Releases a payload previously returned by [`alloc`] on this allocator.
///
/// A null pointer is a no-op. A pointer whose header does not carry the
/// `USED` magic — a double free, or a foreign pointer — is rejected
/// silently; it is the caller's job to avoid these, but the allocator
/// will not corrupt its own state in response to one.
///
/// # Safety
/// If non-null, `ptr` must be a payload pointer previously returned by
/// `alloc` on this same allocator, not already freed, and not aliased by
/// any other live reference.
pub unsafe fn free(ptr: *mut u8) {
    unsafe {
        ALLOCATOR.lock().free(ptr);
    }
}

/// Walks the block list and free list and checks every invariant in the
/// data model, returning a snapshot of block/byte counts on success.
///
/// This is a diagnostic, not part of the stable alloc/free contract — it
/// exists so tests (and callers built with extra paranoia) can assert the
/// allocator's internal consistency directly instead of re-deriving it
/// from `alloc`/`free` behavior alone.
#[doc(hidden)]
pub fn check_invariants() -> Result<InvariantReport, &'static str> {
    ALLOCATOR.lock().check_invariants()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // `ALLOCATOR` is one process-wide static; cargo runs tests in this
    // file on separate threads by default, so every test must hold this
    // for its whole body or they will stomp on each other's region.
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    fn region(size: usize) -> Box<[u8]> {
        vec![0u8; size].into_boxed_slice()
    }

    #[test]
    fn single_allocation_then_free_restores_one_block() {
        let _guard = TEST_LOCK.lock().unwrap();
        let mut r = region(4096);
        unsafe { init(r.as_mut_ptr(), r.len()) };

        let p = alloc(64);
        assert!(!p.is_null());
        let report = check_invariants().unwrap();
        assert_eq!(report.used_blocks, 1);

        unsafe { free(p) };
        let report = check_invariants().unwrap();
        assert_eq!(report.used_blocks, 0);
        assert_eq!(report.free_blocks, 1);
    }

    #[test]
    fn zero_size_allocation_succeeds_and_is_freeable() {
        let _guard = TEST_LOCK.lock().unwrap();
        let mut r = region(4096);
        unsafe { init(r.as_mut_ptr(), r.len()) };
        let p = alloc(0);
        assert!(!p.is_null());
        unsafe { free(p) };
    }

    #[test]
    fn free_of_null_is_a_no_op() {
        let _guard = TEST_LOCK.lock().unwrap();
        let mut r = region(4096);
        unsafe { init(r.as_mut_ptr(), r.len()) };
        let before = check_invariants().unwrap();
        unsafe { free(core::ptr::null_mut()) };
        let after = check_invariants().unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn double_free_is_rejected_silently() {
        let _guard = TEST_LOCK.lock().unwrap();
        let mut r = region(4096);
        unsafe { init(r.as_mut_ptr(), r.len()) };
        let p = alloc(32);
        unsafe { free(p) };
        let after_first = check_invariants().unwrap();
        unsafe { free(p) };
        let after_second = check_invariants().unwrap();
        assert_eq!(after_first, after_second);
    }

    #[test]
    fn non_adjacent_frees_stay_as_separate_free_blocks() {
        let _guard = TEST_LOCK.lock().unwrap();
        // Two allocations separated by a spacer that stays USED must not
        // coalesce when both are freed.
        let mut r = region(8192);
        unsafe { init(r.as_mut_ptr(), r.len()) };

        let a = alloc(500);
        let _spacer = alloc(16);
        let b = alloc(200);
        unsafe { free(a) };
        unsafe { free(b) };

        let report = check_invariants().unwrap();
        // a, b, and the undisturbed tail: three disjoint free blocks.
        assert_eq!(report.free_blocks, 3);
    }
}
