use std::ptr::NonNull;

/// Virtual memory page size of the machine. This should be a constant,
/// but we can't do that since we don't know the value at compile time.
pub(crate) static mut PAGE_SIZE: usize = 0;

/// The two operating-system primitives the allocator is built on, behind
/// one seam so the heap never talks to the OS directly:
///
/// - the program break, moved up and down with `sbrk`, backing the
///   contiguous arena;
/// - anonymous private mappings, one per large block.
///
/// The production implementation is [`Sys`]. Tests plug in their own
/// kernel with a simulated break, which is what allows several
/// independent heaps to coexist inside one test process.
pub trait Kernel {
    /// Moves the program break by `delta` bytes and returns the previous
    /// break position, which on growth is the start of the fresh memory.
    /// `None` means the kernel refused.
    unsafe fn extend_break(&mut self, delta: isize) -> Option<NonNull<u8>>;

    /// Requests a standalone read-write mapping of `len` bytes. `None`
    /// means the underlying syscall failed.
    unsafe fn request_memory(&mut self, len: usize) -> Option<NonNull<u8>>;

    /// Returns the mapping of `len` bytes starting at `addr` back to the
    /// kernel. A failure here is unrecoverable.
    unsafe fn return_memory(&mut self, addr: *mut u8, len: usize);

    /// Virtual memory page size in bytes.
    fn page_size(&self) -> usize;
}

/// The real operating system.
pub struct Sys;

/// Wrapper to look up and cache the machine's page size.
#[inline]
pub(crate) fn page_size() -> usize {
    unsafe {
        if PAGE_SIZE == 0 {
            PAGE_SIZE = sysconf_page_size();
        }

        PAGE_SIZE
    }
}

#[cfg(unix)]
fn sysconf_page_size() -> usize {
    unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) as usize }
}

#[cfg(unix)]
mod unix {
    use super::{page_size, Kernel, Sys};

    use libc::{intptr_t, mmap, munmap, off_t, sbrk, size_t};

    use std::os::raw::{c_int, c_void};
    use std::ptr::NonNull;

    impl Kernel for Sys {
        unsafe fn extend_break(&mut self, delta: isize) -> Option<NonNull<u8>> {
            unsafe {
                let addr = sbrk(delta as intptr_t);

                if addr as isize == -1 {
                    None
                } else {
                    Some(NonNull::new_unchecked(addr).cast::<u8>())
                }
            }
        }

        unsafe fn request_memory(&mut self, len: usize) -> Option<NonNull<u8>> {
            // mmap parameters.
            const ADDR: *mut c_void = std::ptr::null_mut::<c_void>();
            // Read-Write only memory.
            const PROT: c_int = libc::PROT_READ | libc::PROT_WRITE;
            const FLAGS: c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
            const FD: c_int = -1;
            const OFFSET: off_t = 0;

            unsafe {
                let addr = mmap(ADDR, len as size_t, PROT, FLAGS, FD, OFFSET);

                match addr {
                    libc::MAP_FAILED => None,
                    addr => Some(NonNull::new_unchecked(addr).cast::<u8>()),
                }
            }
        }

        unsafe fn return_memory(&mut self, addr: *mut u8, len: usize) {
            unsafe {
                if munmap(addr as *mut c_void, len as size_t) != 0 {
                    panic!("munmap failed");
                }
            }
        }

        fn page_size(&self) -> usize {
            page_size()
        }
    }
}

/// Kernel with a simulated program break, carved out of an owned 8-aligned
/// slab. Large mappings still go through the real `mmap` so the mapped
/// path is exercised for real; only the break is faked, because moving the
/// process's actual break from inside a test would fight the test
/// harness's own allocator.
#[cfg(test)]
pub(crate) struct TestKernel {
    slab: Box<[u64]>,
    brk: usize,
    mapped: usize,
}

#[cfg(test)]
impl TestKernel {
    pub fn new(capacity: usize) -> Self {
        Self {
            slab: vec![0u64; capacity / 8].into_boxed_slice(),
            brk: 0,
            mapped: 0,
        }
    }

    /// Bytes of the slab currently below the simulated break.
    pub fn break_offset(&self) -> usize {
        self.brk
    }

    /// Bytes currently held in standalone mappings.
    pub fn mapped_bytes(&self) -> usize {
        self.mapped
    }
}

#[cfg(test)]
impl Kernel for TestKernel {
    unsafe fn extend_break(&mut self, delta: isize) -> Option<NonNull<u8>> {
        let old = self.brk as isize;
        let new = old + delta;

        if new < 0 || new as usize > self.slab.len() * 8 {
            return None;
        }

        self.brk = new as usize;

        unsafe {
            Some(NonNull::new_unchecked(
                self.slab.as_mut_ptr().cast::<u8>().add(old as usize),
            ))
        }
    }

    unsafe fn request_memory(&mut self, len: usize) -> Option<NonNull<u8>> {
        unsafe {
            let addr = Sys.request_memory(len);

            if addr.is_some() {
                self.mapped += len;
            }

            addr
        }
    }

    unsafe fn return_memory(&mut self, addr: *mut u8, len: usize) {
        unsafe {
            Sys.return_memory(addr, len);
            self.mapped -= len;
        }
    }

    fn page_size(&self) -> usize {
        4096
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_break_moves_and_refuses() {
        let mut kernel = TestKernel::new(4096);

        unsafe {
            let first = kernel.extend_break(1024).unwrap();
            let second = kernel.extend_break(1024).unwrap();

            // Growth returns the previous break.
            assert_eq!(second.as_ptr() as usize, first.as_ptr() as usize + 1024);
            assert_eq!(kernel.break_offset(), 2048);

            // Past the slab end the kernel refuses, state untouched.
            assert!(kernel.extend_break(4096).is_none());
            assert_eq!(kernel.break_offset(), 2048);

            // Shrinking moves the break back down.
            kernel.extend_break(-2048).unwrap();
            assert_eq!(kernel.break_offset(), 0);
        }
    }

    #[test]
    fn page_size_is_cached_and_plausible() {
        let size = page_size();

        assert!(size.is_power_of_two());
        assert_eq!(size, page_size());
        assert_eq!(Sys.page_size(), size);
    }
}
