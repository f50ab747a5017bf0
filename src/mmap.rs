use std::ptr::NonNull;

use crate::block::{Block, BlockStatus, BLOCK_HEADER_SIZE};
use crate::heap::Heap;
use crate::kernel::Kernel;
use crate::utils::padding;

/// Large-block path: one anonymous private read-write mapping per
/// allocation, with the usual header written at its base.
///
/// ```text
/// +----------+--------------------------------+-----+
/// |  Header  |            Payload             | pad |
/// +----------+--------------------------------+-----+
/// ^
/// mapping start, also what munmap gets back
/// ```
///
/// Mapped blocks are list-less; the header's `size` keeps the caller's
/// unpadded request, and the release path recomputes the padding from it
/// to rebuild the exact mapping length. Arena blocks store the padded
/// size instead, so this asymmetry is what keeps `munmap` honest.
impl<K: Kernel> Heap<K> {
    pub(crate) unsafe fn allocate_mapped(&mut self, size: usize) -> *mut u8 {
        unsafe {
            let len = size + BLOCK_HEADER_SIZE + padding(size);
            let addr = self.kernel.request_memory(len).expect("mmap failed");

            let block = addr.cast::<Block>();

            block.as_ptr().write(Block {
                size,
                status: BlockStatus::Mapped,
                prev: None,
                next: None,
            });

            Block::payload(block)
        }
    }

    pub(crate) unsafe fn deallocate_mapped(&mut self, block: NonNull<Block>) {
        unsafe {
            let size = block.as_ref().size;
            let len = BLOCK_HEADER_SIZE + size + padding(size);

            self.kernel.return_memory(block.as_ptr().cast::<u8>(), len);
        }
    }
}
