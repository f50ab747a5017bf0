use std::ptr::NonNull;

use crate::block::{Block, BlockStatus, BLOCK_HEADER_SIZE};
use crate::list::{BlockList, Link};

/// The free blocks of the arena, kept on an address-ordered [`BlockList`]
/// and carrying the two policies that act on them: best-fit selection and
/// eager coalescing.
///
/// ```text
///                         free list (by address)
///
///       +----------------------+          +---------------------+
///       |                      |          |                     |
/// +-----v----+   +-------+   +-+--------+ | +---------+   +-----v----+
/// |   Free   |   | Alloc |   |   Free   +-+ |  Alloc  |   |   Free   |
/// +----------+   +-------+   +----------+   +---------+   +----------+
///
///  ............. one contiguous arena, low to high ................
/// ```
///
/// Mapped blocks never show up here; they are released straight back to
/// the kernel.
pub(crate) struct FreeList {
    blocks: BlockList,
}

impl FreeList {
    pub const fn new() -> Self {
        Self {
            blocks: BlockList::new(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[inline]
    pub fn first(&self) -> Link<Block> {
        self.blocks.first()
    }

    #[inline]
    pub fn last(&self) -> Link<Block> {
        self.blocks.last()
    }

    #[inline]
    pub fn first_after(&self, block: NonNull<Block>) -> Link<Block> {
        self.blocks.first_after(block)
    }

    #[inline]
    pub fn iter(&self) -> crate::list::Iter<'_> {
        self.blocks.iter()
    }

    /// The underlying address-ordered list, for code that needs to inspect
    /// the raw linkage.
    #[inline]
    pub fn blocks(&self) -> &BlockList {
        &self.blocks
    }

    /// Marks `block` as free and splices it into the list at its address
    /// position.
    ///
    /// **SAFETY**: `block` must point at a live arena header that is not
    /// currently on any list.
    pub unsafe fn insert(&mut self, mut block: NonNull<Block>) {
        unsafe {
            block.as_mut().status = BlockStatus::Free;
            self.blocks.insert(block);
        }
    }

    /// Takes `block` off the list without touching its status; the caller
    /// decides what the block becomes next.
    ///
    /// **SAFETY**: `block` must currently be on this list.
    pub unsafe fn remove(&mut self, block: NonNull<Block>) {
        unsafe { self.blocks.remove(block) }
    }

    /// Best-fit selection: among the blocks able to hold `size` payload
    /// bytes, picks the one with the smallest size. The address-ordered
    /// walk breaks ties in favour of the lowest address. The chosen block
    /// is unlinked and returned; `None` means nothing fits.
    pub unsafe fn take_best_fit(&mut self, size: usize) -> Option<NonNull<Block>> {
        let mut best: Option<NonNull<Block>> = None;

        unsafe {
            for candidate in self.blocks.iter() {
                if candidate.as_ref().size < size {
                    continue;
                }

                match best {
                    Some(current) if candidate.as_ref().size >= current.as_ref().size => {}
                    _ => best = Some(candidate),
                }
            }

            if let Some(block) = best {
                self.blocks.remove(block);
            }
        }

        best
    }

    /// Eager coalescing pass: walks the list front to back and absorbs
    /// every successor that starts exactly where the current block ends.
    /// The cursor only advances once the current block has no adjacent
    /// successor left, so whole runs collapse into a single block.
    pub unsafe fn coalesce(&mut self) {
        let mut current = self.blocks.first();

        unsafe {
            while let Some(mut block) = current {
                match block.as_ref().next {
                    Some(next) if Block::end(block) == next.as_ptr() as usize => {
                        block.as_mut().size += BLOCK_HEADER_SIZE + next.as_ref().size;
                        self.blocks.remove(next);
                    }
                    other => current = other,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(size: usize) -> Block {
        Block {
            size,
            status: BlockStatus::Free,
            prev: None,
            next: None,
        }
    }

    #[test]
    fn best_fit_picks_the_smallest_sufficient_block() {
        let mut blocks = [block(1000), block(200), block(500)];
        let nodes: Vec<NonNull<Block>> = blocks.iter_mut().map(NonNull::from).collect();

        let mut free = FreeList::new();

        unsafe {
            for &node in &nodes {
                free.insert(node);
            }

            // All three can hold 150 bytes; the 200-byte one wins over the
            // 1000-byte one a first-fit walk would return.
            let chosen = free.take_best_fit(150).unwrap();
            assert_eq!(chosen, nodes[1]);
            assert_eq!(free.len(), 2);

            // An exact fit is still a fit.
            let chosen = free.take_best_fit(500).unwrap();
            assert_eq!(chosen, nodes[2]);

            // Nothing can hold more than the largest block.
            assert!(free.take_best_fit(1001).is_none());
            assert_eq!(free.len(), 1);
        }
    }

    #[test]
    fn coalesce_absorbs_adjacent_runs() {
        // Hand-build a little arena inside an aligned buffer: two adjacent
        // free blocks followed by a detached third one.
        let mut buffer = vec![0u64; 128];
        let base = buffer.as_mut_ptr().cast::<u8>();

        unsafe {
            let a = base.cast::<Block>();
            a.write(block(64));
            let b = base.add(BLOCK_HEADER_SIZE + 64).cast::<Block>();
            b.write(block(64));
            let c = base.add(3 * (BLOCK_HEADER_SIZE + 64)).cast::<Block>();
            c.write(block(32));

            let a = NonNull::new_unchecked(a);
            let b = NonNull::new_unchecked(b);
            let c = NonNull::new_unchecked(c);

            let mut free = FreeList::new();
            free.insert(a);
            free.insert(b);
            free.insert(c);

            free.coalesce();

            // `a` swallowed `b`, header included; `c` was out of reach.
            assert_eq!(free.len(), 2);
            assert_eq!(free.first(), Some(a));
            assert_eq!(a.as_ref().size, 64 + BLOCK_HEADER_SIZE + 64);
            assert_eq!(free.last(), Some(c));
            assert_eq!(c.as_ref().size, 32);
        }
    }
}
