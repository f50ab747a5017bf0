//! BrkAlloc is a custom implementation of the four classic dynamic memory
//! primitives, built straight on two operating-system calls:
//!
//! [`sbrk`](https://man7.org/linux/man-pages/man2/sbrk.2.html) for the
//! contiguous arena, and
//! [`mmap`](https://man7.org/linux/man-pages/man2/mmap.2.html) for large
//! standalone blocks.
//!
//! The internal structure of the allocator looks like this:
//!
//! ```text
//!                 the arena (program break memory)
//!
//! +---------+--------+---------+--------+---------+----------+
//! |  Alloc  |  Free  |  Alloc  |  Free  |  Alloc  |   Free   | <- break
//! +---------+--------+---------+--------+---------+----------+
//!      ^         ^        ^        ^         ^         ^
//!      |         |        |        |         |         |
//!      +---------|--------+--------|---------+         |      used list
//!                |                 |                   |
//!                +-----------------+-------------------+      free list
//! ```
//!
//! Every block is prefixed by a header carrying its size, its state and
//! the links of whichever list it is on. Both lists are kept sorted by
//! address, which is what makes merging neighbours and finding a block's
//! arena successor simple walks.
//!
//! The main policies:
//! - **Best fit**: a request reuses the smallest free block able to hold it
//! - **Block splitting**: oversized free blocks are split so the tail stays
//!   reusable
//! - **Eager coalescing**: freeing merges adjacent free blocks immediately
//! - **In-place growth**: reallocation stretches a block over free
//!   neighbours or over the break itself before it ever copies
//! - **Size threshold**: requests of 128 KiB and up skip the arena and get
//!   their own anonymous mapping
//!
//! The main structure is [`BrkAlloc`], you can follow the codebase from
//! there. [`heap::Heap`] is the allocator behind it, usable standalone
//! when a process-global instance is not wanted.

mod arena;
mod block;
mod brkalloc;
mod freelist;
mod kernel;
mod list;
mod mmap;
mod utils;

pub mod heap;

pub use brkalloc::BrkAlloc;
pub use kernel::{Kernel, Sys};
