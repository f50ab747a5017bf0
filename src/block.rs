use std::mem;
use std::ptr::NonNull;

use crate::list::Link;
use crate::utils::ALIGNMENT;

/// Size in bytes of the metadata prefix of every block, rounded up so the
/// payload that follows it starts on an 8-byte boundary.
pub(crate) const BLOCK_HEADER_SIZE: usize =
    (mem::size_of::<Block>() + ALIGNMENT - 1) & !(ALIGNMENT - 1);

/// Where a block's memory came from and whether it is live.
///
/// `Free` and `Alloc` blocks live inside the arena and sit on exactly one
/// of the two block lists. `Mapped` blocks own a standalone anonymous
/// mapping and belong to no list at all; the only way back to them is the
/// payload pointer the user holds.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum BlockStatus {
    Free,
    Alloc,
    Mapped,
}

/// Metadata prefix of every managed region. The user content is placed
/// right after this header:
///
/// ```text
/// +----------------+        +
/// |      size      |        |
/// +----------------+        |
/// |     status     |        | -> Header (BLOCK_HEADER_SIZE bytes)
/// +----------------+        |
/// |   prev | next  |        |
/// +----------------+        +
/// |     Payload    |
/// |                |
/// +----------------+
/// ```
///
/// `size` counts the payload bytes only, never the header. For arena
/// blocks it includes the trailing padding that keeps the next header
/// aligned, so it is always a multiple of 8. Mapped blocks keep the
/// unpadded request instead; the padding is recomputed from `size` when
/// the mapping is released.
pub(crate) struct Block {
    /// Payload size in bytes.
    pub size: usize,
    /// Current state of the block.
    pub status: BlockStatus,
    /// Previous block of whichever list this block is on.
    pub prev: Link<Block>,
    /// Next block of whichever list this block is on.
    pub next: Link<Block>,
}

impl Block {
    /// Address of the user content that follows the header of `block`.
    ///
    /// **SAFETY**: `block` must point at a live header.
    #[inline]
    pub unsafe fn payload(block: NonNull<Block>) -> *mut u8 {
        unsafe { block.as_ptr().cast::<u8>().add(BLOCK_HEADER_SIZE) }
    }

    /// Recovers the header from a payload pointer previously produced by
    /// [`Block::payload`].
    ///
    /// **SAFETY**: `ptr` must be a payload pointer returned by this
    /// allocator and still backed by a live header.
    #[inline]
    pub unsafe fn from_payload(ptr: *mut u8) -> NonNull<Block> {
        unsafe { NonNull::new_unchecked(ptr.sub(BLOCK_HEADER_SIZE).cast::<Block>()) }
    }

    /// First address past the block: header, payload and padding included.
    /// By the arena contiguity rule this is the header address of the next
    /// arena block, unless `block` is the arena's last one.
    ///
    /// **SAFETY**: `block` must point at a live header.
    #[inline]
    pub unsafe fn end(block: NonNull<Block>) -> usize {
        unsafe { block.as_ptr() as usize + BLOCK_HEADER_SIZE + block.as_ref().size }
    }
}
