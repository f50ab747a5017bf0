use std::ptr::NonNull;

use crate::block::{Block, BlockStatus, BLOCK_HEADER_SIZE};
use crate::heap::Heap;
use crate::kernel::Kernel;
use crate::utils::padding;

/// Bytes claimed from the program break by the very first arena-bound
/// request. One big reservation up front keeps the early allocations from
/// each paying a syscall.
pub(crate) const PREALLOC_SIZE: usize = 128 * 1024;

/// Arena management: the one contiguous region between the break position
/// captured at first use and the current break. It only ever changes at
/// its tail, by moving the break.
impl<K: Kernel> Heap<K> {
    /// One-shot reservation of the initial arena, published as a single
    /// free block. Runs once, when both lists are still empty.
    pub(crate) unsafe fn prealloc(&mut self) {
        unsafe {
            let addr = self
                .kernel
                .extend_break(PREALLOC_SIZE as isize)
                .expect("sbrk failed");

            let block = addr.cast::<Block>();

            block.as_ptr().write(Block {
                size: PREALLOC_SIZE - BLOCK_HEADER_SIZE,
                status: BlockStatus::Free,
                prev: None,
                next: None,
            });

            self.free.insert(block);
        }
    }

    /// Called when the best-fit search came up empty: makes room for
    /// `size` payload bytes at the arena tail and returns the resulting
    /// live block.
    ///
    /// The cheap path recycles the arena's last free block, stretching it
    /// over fresh break memory so no header has to be written. When that
    /// block cannot be stretched safely, or there is no free block at
    /// all, a brand new block gets appended at the break.
    pub(crate) unsafe fn grow(&mut self, size: usize) -> NonNull<Block> {
        unsafe {
            if !self.free.is_empty() {
                if let Some(block) = self.reuse_tail(size) {
                    return block;
                }
            }

            let pad = padding(size);
            let addr = self
                .kernel
                .extend_break((BLOCK_HEADER_SIZE + size + pad) as isize)
                .expect("sbrk failed");

            let block = addr.cast::<Block>();

            block.as_ptr().write(Block {
                size: size + pad,
                status: BlockStatus::Alloc,
                prev: None,
                next: None,
            });

            self.used.insert(block);

            block
        }
    }

    /// Tries to satisfy `size` by promoting the address-maximal free block
    /// in place.
    ///
    /// When that block has no arena successor at all it is the arena's
    /// physical tail: the break moves up by the missing bytes and the
    /// block simply gets bigger. When a successor exists, the block may
    /// only be promoted if the room up to that successor's header already
    /// covers the request; stretching any further would overlap the
    /// neighbour, so growth falls back to appending instead.
    unsafe fn reuse_tail(&mut self, size: usize) -> Option<NonNull<Block>> {
        unsafe {
            let mut tail = self.free.last()?;
            let pad = padding(size);

            match self.next_in_arena(tail) {
                Some(next) => {
                    let room = next.as_ptr() as usize
                        - tail.as_ptr() as usize
                        - BLOCK_HEADER_SIZE;

                    if size + pad > room {
                        return None;
                    }
                }
                None => {
                    let missing = size - tail.as_ref().size;

                    self.kernel
                        .extend_break((missing + pad) as isize)
                        .expect("sbrk failed");
                }
            }

            self.free.remove(tail);
            tail.as_mut().size = size + pad;
            tail.as_mut().status = BlockStatus::Alloc;
            self.used.insert(tail);

            Some(tail)
        }
    }
}
