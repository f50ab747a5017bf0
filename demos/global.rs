//! This example installs the allocator as the program's global allocator
//! and lets the standard library drive it through Box, Vec and String.

use brkalloc::BrkAlloc;

#[global_allocator]
static ALLOCATOR: BrkAlloc = BrkAlloc::new();

fn main() {
    // Box example
    let val_box = Box::new(22);
    println!("Box Value: {}, At: {:p}", val_box, val_box);

    // Vec example
    let mut v = Vec::new();
    for i in 0..5 {
        v.push(i * 10);
        println!("Added {}; Capacity: {}; At: {:p}", v[i], v.capacity(), v.as_ptr());
    }

    // String example
    let msg = String::from("Heap Testing");
    println!("\nString '{}' - At: {:p}", msg, msg.as_ptr());

    // Merge example: two neighbours freed together should be reusable as
    // one bigger block at the same address.
    let a = Box::new([0u8; 64]);
    let b = Box::new([0u8; 64]);
    let ptr_a = a.as_ptr();

    drop(a);
    drop(b);

    let c = Box::new([0u8; 128]);
    let ptr_c = c.as_ptr();

    if ptr_a == ptr_c {
        println!("Correctly reused at {:p}", ptr_c);
    } else {
        println!("Not correctly reused. A was at {:p} and C is at {:p}", ptr_a, ptr_c);
    }
}
