//! Block header and free-list link layout.
//!
//! Every byte of the managed region belongs to exactly one [`BlockHeader`],
//! followed immediately by that block's payload. Headers are never boxed or
//! referenced with a safe Rust reference across a mutation boundary — the
//! region owns them, and all inter-header links are raw, non-owning
//! pointers into the region, read and written through `unsafe` accessors
//! on this type. This keeps the aliasing story simple: there is exactly
//! one way to reach a header (through the block list or the free list),
//! never a `&mut` competing with a raw pointer that outlives it.

use crate::config::{FREE_MAGIC, USED_MAGIC};
use core::mem::size_of;
use core::ptr;

/// Header placed at the start of every block, `USED` or `FREE` alike.
#[repr(C)]
pub(crate) struct BlockHeader {
    pub magic: u32,
    _reserved: u32,
    pub prev: *mut BlockHeader,
    pub size: usize,
}

/// Size of [`BlockHeader`] in bytes — the per-block bookkeeping overhead.
pub(crate) const HEADER_SIZE: usize = size_of::<BlockHeader>();

/// Free-list links, overlaid on the payload of a `FREE` block only. A
/// `USED` block never reserves space for these; the allocator is free to
/// hand the whole payload to the caller.
#[repr(C)]
pub(crate) struct FreeLinks {
    /// Nearest free block with size >= this one's, or null if this block
    /// is the free-list head.
    pub larger: *mut BlockHeader,
    /// Nearest free block with size <= this one's, or null if this is the
    /// smallest free block.
    pub smaller: *mut BlockHeader,
}

/// Minimum payload a `FREE` block must have: enough room for its own
/// free-list links.
pub(crate) const MIN_FREE_PAYLOAD: usize = size_of::<FreeLinks>();

/// Minimum total size (header + payload) a block must have to be worth
/// splitting off as a standalone free block.
pub(crate) const MIN_FREE_BLOCK: usize = HEADER_SIZE + MIN_FREE_PAYLOAD;

impl BlockHeader {
    /// # Safety
    /// `this` must point to a live, correctly initialized header.
    #[inline]
    pub(crate) unsafe fn is_used(this: *const BlockHeader) -> bool {
        unsafe { (*this).magic == USED_MAGIC }
    }

    /// # Safety
    /// `this` must point to a live, correctly initialized header.
    #[inline]
    pub(crate) unsafe fn is_free(this: *const BlockHeader) -> bool {
        unsafe { (*this).magic == FREE_MAGIC }
    }

    /// Address of the first payload byte following this header.
    #[inline]
    pub(crate) fn payload_ptr(this: *mut BlockHeader) -> *mut u8 {
        (this as *mut u8).wrapping_add(HEADER_SIZE)
    }

    /// Recovers the header preceding a payload pointer previously handed
    /// out by `alloc`.
    #[inline]
    pub(crate) fn from_payload(ptr: *mut u8) -> *mut BlockHeader {
        ptr.wrapping_sub(HEADER_SIZE) as *mut BlockHeader
    }

    /// The address-ordered successor of `this`, or null if `this` is the
    /// last block in the region (its end address equals `region_end`).
    ///
    /// # Safety
    /// `this` must point to a live header whose `size` field is current.
    #[inline]
    pub(crate) unsafe fn successor(
        this: *mut BlockHeader,
        region_end: usize,
    ) -> *mut BlockHeader {
        let end_of_this = this as usize + HEADER_SIZE + unsafe { (*this).size };
        debug_assert!(end_of_this <= region_end, "block overruns managed region");
        if end_of_this == region_end {
            ptr::null_mut()
        } else {
            end_of_this as *mut BlockHeader
        }
    }

    /// View of a `FREE` block's payload as its free-list links.
    ///
    /// # Safety
    /// `this` must point to a `FREE` block whose payload is at least
    /// [`MIN_FREE_PAYLOAD`] bytes (guaranteed by invariant 7).
    #[inline]
    pub(crate) unsafe fn free_links(this: *mut BlockHeader) -> *mut FreeLinks {
        Self::payload_ptr(this) as *mut FreeLinks
    }
}
