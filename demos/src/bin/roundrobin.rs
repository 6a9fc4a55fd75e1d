//! Demonstrates the cooperative scheduler: the main process creates a
//! worker, then both interleave prints until the worker finishes.
//!
//! Run with `RUST_LOG=debug` to also see the allocator and scheduler's
//! own diagnostics.

use toykernel::{mem, task};

// Must comfortably exceed `STACK_SIZE` (128 KiB): the bootstrap PCB, the
// worker's PCB, and the worker's whole stack all come out of this one
// region.
const REGION_SIZE: usize = 1 << 20;

extern "C" fn worker() -> i32 {
    let pid = task::current_pid().expect("worker must have a pid");
    for round in 0..3 {
        println!("worker {pid}: round {round}");
        task::yield_now();
    }
    println!("worker {pid}: done, deleting self");
    task::delete(pid);
    0
}

fn main() {
    env_logger::init();

    let mut region = vec![0u8; REGION_SIZE].into_boxed_slice();
    unsafe { mem::init(region.as_mut_ptr(), region.len()) };
    task::init();

    println!("main: creating worker");
    let pid = task::create(worker);
    if pid < 0 {
        eprintln!("main: failed to create worker");
        return;
    }
    println!("main: worker is pid {pid}, back in main");

    task::yield_now();
    task::yield_now();
    println!("main: done");
}
