//! Hammers the allocator with a long run of random alloc/free calls over
//! a fixed-size slot table, printing a final invariant report.
//!
//! Run with `RUST_LOG=debug` to watch individual allocations and frees.

use toykernel::mem;

const REGION_SIZE: usize = 1 << 20;
const SLOTS: usize = 1000;
const ITERATIONS: u32 = 100_000;

fn main() {
    env_logger::init();

    let mut region = vec![0u8; REGION_SIZE].into_boxed_slice();
    unsafe { mem::init(region.as_mut_ptr(), region.len()) };

    let mut state: u32 = 0xC0FF_EE01;
    let mut next_u32 = || {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        state
    };

    let mut slots: Vec<*mut u8> = vec![std::ptr::null_mut(); SLOTS];
    for i in 0..ITERATIONS {
        let slot = (next_u32() as usize) % SLOTS;
        if slots[slot].is_null() {
            let size = 1 + (next_u32() as usize % 512);
            slots[slot] = mem::alloc(size);
        } else {
            unsafe { mem::free(slots[slot]) };
            slots[slot] = std::ptr::null_mut();
        }

        if i % 10_000 == 0 {
            match mem::check_invariants() {
                Ok(report) => println!("iteration {i}: {report:?}"),
                Err(e) => {
                    eprintln!("invariant violated at iteration {i}: {e}");
                    std::process::exit(1);
                }
            }
        }
    }

    for p in slots.into_iter().filter(|p| !p.is_null()) {
        unsafe { mem::free(p) };
    }
    let report = mem::check_invariants().expect("invariants must hold at the end");
    println!("final: {report:?}");
}
