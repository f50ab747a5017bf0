use brkalloc::heap::Heap;

fn log_alloc(addr: *mut u8, size: usize) {
    println!("Requested {size} bytes of memory");
    println!("Received this address: {addr:?}");
}

fn main() {
    let mut heap = Heap::new();

    unsafe {
        let addr1 = heap.allocate(8);
        log_alloc(addr1, 8);

        let addr2 = heap.allocate(100);
        log_alloc(addr2, 100);

        // Large enough to skip the arena and get its own mapping.
        let addr3 = heap.allocate(256 * 1024);
        log_alloc(addr3, 256 * 1024);

        let addr2 = heap.reallocate(addr2, 4096);
        println!("Resized the second block, now at: {addr2:?}");

        heap.deallocate(addr1);
        heap.deallocate(addr2);
        heap.deallocate(addr3);
    }
}
