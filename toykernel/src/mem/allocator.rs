//! The worst-fit, coalescing allocator over a single caller-owned region.

use super::block::{BlockHeader, HEADER_SIZE, MIN_FREE_BLOCK, MIN_FREE_PAYLOAD};
use crate::config::{align_up, ALIGN, FREE_MAGIC, USED_MAGIC};
use core::ptr;

/// All mutable allocator state. Lives behind [`super::ALLOCATOR`], a single
/// module-level `spin::Mutex` — the allocator is a singleton over one
/// region, never multiple independent instances.
pub(crate) struct Allocator {
    /// First block in address order (the "mcb" of the source design).
    mcb: *mut BlockHeader,
    /// Largest free block, or null if nothing is free.
    freelist: *mut BlockHeader,
    region_start: usize,
    region_end: usize,
}

// SAFETY: `Allocator` is only ever reached through `ALLOCATOR`'s spin::Mutex,
// which serializes access the same way the rest of this single-threaded
// cooperative core serializes access to the scheduler.
unsafe impl Send for Allocator {}

impl Allocator {
    pub(crate) const fn uninit() -> Self {
        Self {
            mcb: ptr::null_mut(),
            freelist: ptr::null_mut(),
            region_start: 0,
            region_end: 0,
        }
    }

    /// Establishes a single `FREE` block spanning `[region, region+size)`.
    ///
    /// # Safety
    /// `region` must be valid for reads and writes for `size` bytes and
    /// must outlive every allocation made from it (the lifetime of the
    /// process, in practice — there is no teardown API). `size` must be at
    /// least [`MIN_FREE_BLOCK`]; smaller is undefined behavior per the
    /// public contract, caught by `debug_assert!` in debug builds.
    pub(crate) unsafe fn init(&mut self, region: *mut u8, size: usize) {
        debug_assert!(
            size >= MIN_FREE_BLOCK,
            "mem::init: region of {size} bytes cannot hold even one free block"
        );
        debug_assert!(
            region as usize % ALIGN == 0,
            "mem::init: region must be aligned to {ALIGN}"
        );

        let start = region as usize;
        self.region_start = start;
        self.region_end = start + size;

        let block = region as *mut BlockHeader;
        unsafe {
            (*block).magic = FREE_MAGIC;
            (*block).prev = ptr::null_mut();
            (*block).size = size - HEADER_SIZE;
            let links = BlockHeader::free_links(block);
            (*links).larger = ptr::null_mut();
            (*links).smaller = ptr::null_mut();
        }
        self.mcb = block;
        self.freelist = block;

        log::info!(
            "mem: region of {size} bytes initialized ({} byte payload)",
            size - HEADER_SIZE
        );
    }

    /// Raises `size` to the minimum allocatable payload and rounds it up
    /// to [`ALIGN`].
    fn normalize(size: usize) -> usize {
        align_up(size.max(MIN_FREE_PAYLOAD), ALIGN)
    }

    /// Worst-fit allocation with splitting. See module docs for the
    /// algorithm; this mirrors the five-step contract verbatim.
    pub(crate) fn alloc(&mut self, size: usize) -> *mut u8 {
        let requested = Self::normalize(size);

        let head = self.freelist;
        if head.is_null() {
            log::debug!("mem: alloc({size}) failed — free list empty");
            return ptr::null_mut();
        }
        let head_size = unsafe { (*head).size };
        if head_size < requested {
            log::debug!(
                "mem: alloc({size}) failed — largest free block ({head_size}) too small"
            );
            return ptr::null_mut();
        }

        let balance = head_size - requested;
        let old_successor = unsafe { BlockHeader::successor(head, self.region_end) };
        self.freelist_remove(head);

        if balance > MIN_FREE_BLOCK {
            unsafe {
                let new_addr = head as usize + HEADER_SIZE + requested;
                let new_block = new_addr as *mut BlockHeader;
                (*new_block).magic = FREE_MAGIC;
                (*new_block).prev = head;
                (*new_block).size = balance - HEADER_SIZE;
                if !old_successor.is_null() {
                    (*old_successor).prev = new_block;
                }
                (*head).size = requested;
                self.freelist_insert(new_block);
            }
        }
        // else: balance absorbed into `head`, whose size keeps its
        // original value (internal fragmentation bounded by MIN_FREE_BLOCK).

        unsafe {
            (*head).magic = USED_MAGIC;
        }
        log::debug!("mem: alloc({size}) -> {} bytes at {head:p}", unsafe {
            (*head).size
        });
        BlockHeader::payload_ptr(head)
    }

    /// Coalesce-always free. `ptr` must either be null (no-op) or a
    /// payload pointer previously returned by `alloc` on this allocator.
    ///
    /// # Safety
    /// If non-null, `ptr` must not have already been freed and must not
    /// alias any other live allocation.
    pub(crate) unsafe fn free(&mut self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        let header = BlockHeader::from_payload(ptr);
        if !unsafe { BlockHeader::is_used(header) } {
            log::warn!("mem: free({ptr:p}) rejected — header is not USED");
            return;
        }
        unsafe {
            (*header).magic = FREE_MAGIC;
        }
        let mut work = header;

        // Step 1: merge with the address-ordered predecessor, if free.
        let prev = unsafe { (*work).prev };
        if !prev.is_null() && unsafe { BlockHeader::is_free(prev) } {
            self.freelist_remove(prev);
            let succ_of_work = unsafe { BlockHeader::successor(work, self.region_end) };
            unsafe {
                (*prev).size += HEADER_SIZE + (*work).size;
                if !succ_of_work.is_null() {
                    (*succ_of_work).prev = prev;
                }
            }
            work = prev;
        }

        // Step 2: the (possibly merged) block goes on the free list.
        self.freelist_insert(work);

        // Step 3: merge with the address-ordered successor, if free.
        let succ = unsafe { BlockHeader::successor(work, self.region_end) };
        if !succ.is_null() && unsafe { BlockHeader::is_free(succ) } {
            self.freelist_remove(succ);
            self.freelist_remove(work);
            let succ_of_succ = unsafe { BlockHeader::successor(succ, self.region_end) };
            unsafe {
                (*work).size += HEADER_SIZE + (*succ).size;
                if !succ_of_succ.is_null() {
                    (*succ_of_succ).prev = work;
                }
            }
            self.freelist_insert(work);
        }

        log::debug!("mem: free({ptr:p})");
    }

    /// Splices `block` into the size-sorted free list.
    ///
    /// # Safety
    /// `block` must be a `FREE` header not already linked into the list,
    /// with a valid `size` field.
    fn freelist_insert(&mut self, block: *mut BlockHeader) {
        unsafe {
            let block_size = (*block).size;
            let mut prev: *mut BlockHeader = ptr::null_mut();
            let mut cur = self.freelist;
            while !cur.is_null() && (*cur).size > block_size {
                prev = cur;
                cur = (*BlockHeader::free_links(cur)).smaller;
            }

            let links = BlockHeader::free_links(block);
            (*links).larger = prev;
            (*links).smaller = cur;

            if prev.is_null() {
                self.freelist = block;
            } else {
                (*BlockHeader::free_links(prev)).smaller = block;
            }
            if !cur.is_null() {
                (*BlockHeader::free_links(cur)).larger = block;
            }
        }
    }

    /// Unlinks `block` from the free list. Does not touch its magic or size.
    ///
    /// # Safety
    /// `block` must currently be linked into the free list.
    fn freelist_remove(&mut self, block: *mut BlockHeader) {
        unsafe {
            let links = BlockHeader::free_links(block);
            let larger = (*links).larger;
            let smaller = (*links).smaller;
            if larger.is_null() {
                self.freelist = smaller;
            } else {
                (*BlockHeader::free_links(larger)).smaller = smaller;
            }
            if !smaller.is_null() {
                (*BlockHeader::free_links(smaller)).larger = larger;
            }
        }
    }

    /// Walks the address-ordered block list and the free list, checking
    /// every invariant in the data model. Used only by `debug_assert!`
    /// call sites and by tests — never by the allocation/free fast path.
    pub(crate) fn check_invariants(&self) -> Result<InvariantReport, &'static str> {
        let mut report = InvariantReport::default();
        if self.mcb.is_null() {
            return Ok(report);
        }

        let mut cur = self.mcb;
        let mut prev: *mut BlockHeader = ptr::null_mut();
        let mut prev_was_free = false;
        loop {
            unsafe {
                if (*cur).magic != USED_MAGIC && (*cur).magic != FREE_MAGIC {
                    return Err("block has neither USED nor FREE magic");
                }
                if (*cur).prev != prev {
                    return Err("block list prev pointer inconsistent");
                }
                if (*cur).size % ALIGN != 0 {
                    return Err("block payload size not aligned");
                }

                let is_free = (*cur).magic == FREE_MAGIC;
                if is_free {
                    if (*cur).size < MIN_FREE_PAYLOAD {
                        return Err("free block smaller than free-list link pair");
                    }
                    if prev_was_free {
                        return Err("two adjacent free blocks (coalescing violated)");
                    }
                    report.free_blocks += 1;
                    report.free_bytes += (*cur).size;
                } else {
                    report.used_blocks += 1;
                }
                report.total_blocks += 1;

                prev_was_free = is_free;
                prev = cur;
                let next = BlockHeader::successor(cur, self.region_end);
                if next.is_null() {
                    break;
                }
                cur = next;
            }
        }

        // Free list: walk `smaller` from the head, confirm non-increasing
        // size, confirm membership count matches the block-list scan, and
        // confirm `larger`/`smaller` are mutually consistent.
        let mut cur = self.freelist;
        let mut last_size = usize::MAX;
        let mut prev: *mut BlockHeader = ptr::null_mut();
        let mut counted = 0usize;
        while !cur.is_null() {
            unsafe {
                if (*cur).magic != FREE_MAGIC {
                    return Err("free list contains a non-FREE block");
                }
                if (*cur).size > last_size {
                    return Err("free list not sorted by non-increasing size");
                }
                let links = BlockHeader::free_links(cur);
                if (*links).larger != prev {
                    return Err("free list larger/smaller links inconsistent");
                }
                last_size = (*cur).size;
                prev = cur;
                counted += 1;
                cur = (*links).smaller;
            }
        }
        if counted != report.free_blocks {
            return Err("free list length does not match free block count");
        }

        Ok(report)
    }
}

/// A snapshot produced by [`Allocator::check_invariants`]. Not part of the
/// stable public contract — only used by tests and diagnostics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InvariantReport {
    pub total_blocks: usize,
    pub used_blocks: usize,
    pub free_blocks: usize,
    pub free_bytes: usize,
}
