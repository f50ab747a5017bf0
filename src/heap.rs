use std::ptr::{self, NonNull};

use crate::block::{Block, BlockStatus, BLOCK_HEADER_SIZE};
use crate::freelist::FreeList;
use crate::kernel::{Kernel, Sys};
use crate::list::BlockList;
use crate::utils::padding;

/// Requests whose total footprint, header included, reaches this many
/// bytes bypass the arena and get a dedicated anonymous mapping.
pub(crate) const MMAP_THRESHOLD: usize = 128 * 1024;

/// A complete heap: one growable arena on the program break for small
/// blocks, dedicated anonymous mappings for large ones.
///
/// ```text
///                        the arena (program break memory)
/// +-------+-----------+-------+------+-------+--------------+
/// | Alloc |   Free    | Alloc | Free | Alloc |     Free     | <- break
/// +-------+-----------+-------+------+-------+--------------+
///
///     +--------------------+        +------------------------+
///     |       Mapped       |        |         Mapped         |
///     +--------------------+        +------------------------+
///                   (standalone anonymous mappings)
/// ```
///
/// Arena blocks are tracked on two address-ordered intrusive lists, one
/// for live blocks and one for free ones. Free blocks are reused with a
/// best-fit search, split when the leftover can hold another block, and
/// merged eagerly whenever freeing makes two of them adjacent. When
/// nothing fits, the arena grows in place at its tail.
///
/// The heap is single-threaded; [`BrkAlloc`](crate::BrkAlloc) wraps one
/// behind a lock for use as the global allocator.
pub struct Heap<K: Kernel = Sys> {
    pub(crate) kernel: K,
    pub(crate) used: BlockList,
    pub(crate) free: FreeList,
}

impl Heap<Sys> {
    /// A heap backed by the real program break and `mmap`.
    pub const fn new() -> Self {
        Self::with_kernel(Sys)
    }
}

impl<K: Kernel> Heap<K> {
    /// A heap backed by the given kernel. Tests use this to run several
    /// independent heaps, each with its own simulated break.
    pub const fn with_kernel(kernel: K) -> Self {
        Self {
            kernel,
            used: BlockList::new(),
            free: FreeList::new(),
        }
    }

    /// Allocates `size` bytes and returns the payload pointer, aligned to
    /// 8 bytes and writable for at least `size` bytes. Returns null only
    /// when `size` is `0`.
    ///
    /// **SAFETY**: The heap must be the unique owner of its arena; the
    /// returned pointer is only valid until it is deallocated.
    pub unsafe fn allocate(&mut self, size: usize) -> *mut u8 {
        unsafe { self.allocate_with(size, MMAP_THRESHOLD) }
    }

    /// The allocation router behind every entry point. Small requests are
    /// carved out of the arena, everything whose footprint reaches
    /// `threshold` gets its own mapping.
    pub(crate) unsafe fn allocate_with(&mut self, size: usize, threshold: usize) -> *mut u8 {
        if size == 0 {
            return ptr::null_mut();
        }

        unsafe {
            if BLOCK_HEADER_SIZE + size < threshold {
                // First arena-bound request ever: reserve the initial arena.
                if self.used.is_empty() && self.free.is_empty() {
                    self.prealloc();
                }

                match self.free.take_best_fit(size) {
                    Some(block) => self.carve(block, size),
                    None => Block::payload(self.grow(size)),
                }
            } else {
                self.allocate_mapped(size)
            }
        }
    }

    /// Turns the free block chosen by the best-fit search into a live one,
    /// splitting off the tail as a new free block when it is big enough to
    /// be one.
    ///
    /// ```text
    ///  +----------+----------------------------+
    ///  |  Header  |         Free Block         |
    ///  +----------+----------------------------+
    ///                    | carve(size)
    ///                    v
    ///  +----------+---------+-----+----------+---------------+
    ///  |  Header  | Payload | pad |  Header  |  Free Block   |
    ///  +----------+---------+-----+----------+---------------+
    ///                             ^
    ///                             padding pushed the new header
    ///                             onto an 8-byte boundary
    /// ```
    ///
    /// When the remainder cannot hold a header plus one byte, the whole
    /// block is kept and its size left untouched; the caller simply gets
    /// more room than it asked for.
    unsafe fn carve(&mut self, mut block: NonNull<Block>, size: usize) -> *mut u8 {
        unsafe {
            let remainder_addr = block.as_ptr() as usize + BLOCK_HEADER_SIZE + size;
            let pad = padding(remainder_addr);
            let remainder_addr = remainder_addr + pad;

            let remainder =
                block.as_ref().size as isize - size as isize - pad as isize;

            block.as_mut().status = BlockStatus::Alloc;

            if remainder >= (BLOCK_HEADER_SIZE + 1) as isize {
                let rest = remainder_addr as *mut Block;

                rest.write(Block {
                    size: remainder as usize - BLOCK_HEADER_SIZE,
                    status: BlockStatus::Free,
                    prev: None,
                    next: None,
                });

                block.as_mut().size = size + pad;
                self.free.insert(NonNull::new_unchecked(rest));
            }

            self.used.insert(block);

            Block::payload(block)
        }
    }

    /// Releases the block behind `ptr`. Arena blocks go back on the free
    /// list and are merged with their neighbours right away; mapped blocks
    /// are returned to the kernel. Null is a no-op.
    ///
    /// **SAFETY**: `ptr` must be null or a currently-live pointer
    /// previously returned by this heap.
    pub unsafe fn deallocate(&mut self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }

        unsafe {
            let block = Block::from_payload(ptr);

            match block.as_ref().status {
                BlockStatus::Alloc => {
                    self.used.remove(block);
                    self.free.insert(block);
                    self.free.coalesce();
                }
                BlockStatus::Mapped => self.deallocate_mapped(block),
                BlockStatus::Free => {
                    debug_assert!(false, "deallocating a block that is already free");
                }
            }
        }
    }

    /// Allocates room for `count` elements of `size` bytes each and zeroes
    /// the whole payload. Overflow of `count * size` returns null, as does
    /// a zero total.
    ///
    /// Unlike [`Heap::allocate`] the mapping threshold here is the page
    /// size, so any request spanning a page goes straight to `mmap`, whose
    /// fresh pages the kernel already hands out zeroed; the explicit zero
    /// pass covers recycled arena blocks.
    ///
    /// **SAFETY**: Same contract as [`Heap::allocate`].
    pub unsafe fn allocate_zeroed(&mut self, count: usize, size: usize) -> *mut u8 {
        let Some(total) = count.checked_mul(size) else {
            return ptr::null_mut();
        };

        let threshold = self.kernel.page_size();

        unsafe {
            let ptr = self.allocate_with(total, threshold);

            if !ptr.is_null() {
                ptr::write_bytes(ptr, 0, total);
            }

            ptr
        }
    }

    /// Resizes the block behind `ptr` to `size` payload bytes, in place
    /// whenever the arena allows it.
    ///
    /// The decision tree, first match wins:
    ///
    /// 1. null pointer: plain allocation;
    /// 2. zero size: plain deallocation, returns null;
    /// 3. a header already marked free: null, nothing touched;
    /// 4. the stored size already matches the padded request: unchanged;
    /// 5. mapped block: fresh allocation, payload copy, old mapping
    ///    released;
    /// 6. shrink: the freed tail becomes a new free block when it is big
    ///    enough, otherwise the block keeps its size;
    /// 7. grow in place: into slack before the next arena block, by moving
    ///    the break when the block is the arena tail, or by absorbing a
    ///    free successor;
    /// 8. otherwise: fresh allocation, payload copy, old block freed.
    ///
    /// On success the old pointer is invalid unless it is the one
    /// returned.
    ///
    /// **SAFETY**: `ptr` must be null or a currently-live pointer
    /// previously returned by this heap.
    pub unsafe fn reallocate(&mut self, ptr: *mut u8, size: usize) -> *mut u8 {
        unsafe {
            if ptr.is_null() {
                return self.allocate(size);
            }

            if size == 0 {
                self.deallocate(ptr);
                return ptr::null_mut();
            }

            let mut block = Block::from_payload(ptr);

            if block.as_ref().status == BlockStatus::Free {
                return ptr::null_mut();
            }

            let pad = padding(size);

            if block.as_ref().size == size + pad {
                return ptr;
            }

            if block.as_ref().status == BlockStatus::Mapped {
                return self.relocate(block, size);
            }

            if size < block.as_ref().size {
                self.shrink(block, size);
                return ptr;
            }

            let requested_end = block.as_ptr() as usize + BLOCK_HEADER_SIZE + size + pad;

            match self.next_in_arena(block) {
                // Enough slack before the next block: just stretch.
                Some(next) if requested_end < next.as_ptr() as usize => {
                    block.as_mut().size = size + pad;
                    ptr
                }

                // The block is the arena tail: move the break by the
                // difference and stretch over the fresh memory.
                None => {
                    let delta = (size + pad) as isize - block.as_ref().size as isize;

                    self.kernel.extend_break(delta).expect("sbrk failed");
                    block.as_mut().size = size + pad;
                    ptr
                }

                // A free successor within reach: absorb it, part or whole.
                Some(next)
                    if next.as_ref().status == BlockStatus::Free
                        && requested_end <= Block::end(next) =>
                {
                    let leftover = (next.as_ptr() as usize + next.as_ref().size) as isize
                        - (block.as_ptr() as usize + size + pad) as isize;

                    block.as_mut().size = size + pad;
                    self.free.remove(next);

                    if leftover > (BLOCK_HEADER_SIZE + 1) as isize {
                        let rest = Block::end(block) as *mut Block;

                        rest.write(Block {
                            size: leftover as usize - BLOCK_HEADER_SIZE,
                            status: BlockStatus::Free,
                            prev: None,
                            next: None,
                        });

                        self.free.insert(NonNull::new_unchecked(rest));
                    } else {
                        block.as_mut().size =
                            (block.as_ref().size as isize + leftover) as usize;
                    }

                    ptr
                }

                Some(_) => self.relocate(block, size),
            }
        }
    }

    /// Shrink-in-place step of the reallocation tree: splits the freed
    /// tail off as a new free block when it can hold one, then merges it
    /// with whatever free block may follow.
    unsafe fn shrink(&mut self, mut block: NonNull<Block>, size: usize) {
        unsafe {
            let pad = padding(size);
            let remainder = block.as_ref().size as isize - (size + pad) as isize;

            if remainder > (BLOCK_HEADER_SIZE + 1) as isize {
                let rest = (block.as_ptr() as *mut u8)
                    .add(BLOCK_HEADER_SIZE + size + pad)
                    .cast::<Block>();

                rest.write(Block {
                    size: remainder as usize - BLOCK_HEADER_SIZE,
                    status: BlockStatus::Free,
                    prev: None,
                    next: None,
                });

                block.as_mut().size = size + pad;
                self.free.insert(NonNull::new_unchecked(rest));
                // The freed tail may sit right before an older free block.
                self.free.coalesce();
            }
        }
    }

    /// Last resort of the reallocation tree, also the whole of it for
    /// mapped blocks: allocate fresh, copy the surviving payload, release
    /// the old block.
    unsafe fn relocate(&mut self, block: NonNull<Block>, size: usize) -> *mut u8 {
        unsafe {
            let new_ptr = self.allocate(size);

            let to_copy = size.min(block.as_ref().size);
            ptr::copy_nonoverlapping(Block::payload(block).cast_const(), new_ptr, to_copy);

            self.deallocate(Block::payload(block));

            new_ptr
        }
    }

    /// The in-memory successor of `block` inside the arena: the
    /// lowest-addressed block past it on either list. `None` means the
    /// block is the arena's last one, which is how the reallocation tree
    /// recognises the tail case.
    pub(crate) fn next_in_arena(&self, block: NonNull<Block>) -> Option<NonNull<Block>> {
        match (self.used.first_after(block), self.free.first_after(block)) {
            (Some(used), Some(free)) => Some(used.min(free)),
            (used, free) => used.or(free),
        }
    }
}
