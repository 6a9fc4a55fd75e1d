//! End-to-end scenarios exercising the allocator and the process manager
//! through their public APIs only.
//!
//! Both `mem` and `task` keep their state in process-wide statics, and
//! cargo runs the tests in this file on separate threads by default —
//! every test takes `TEST_LOCK` for its entire body so they don't stomp
//! on each other's region or scheduler.

use std::sync::{Mutex, OnceLock};
use toykernel::{mem, task};

static TEST_LOCK: Mutex<()> = Mutex::new(());

fn region(size: usize) -> Box<[u8]> {
    vec![0u8; size].into_boxed_slice()
}

// ---- allocator scenarios -------------------------------------------------

#[test]
fn allocation_fails_once_the_region_is_exhausted() {
    let _guard = TEST_LOCK.lock().unwrap();
    let mut r = region(4096);
    unsafe { mem::init(r.as_mut_ptr(), r.len()) };

    let a = mem::alloc(100);
    let b = mem::alloc(200);
    let c = mem::alloc(300);
    assert!(!a.is_null() && !b.is_null() && !c.is_null());

    // Nothing close to the whole region is left; this must fail cleanly
    // rather than return an overlapping or out-of-bounds pointer.
    let d = mem::alloc(r.len());
    assert!(d.is_null());

    let report = mem::check_invariants().unwrap();
    assert_eq!(report.used_blocks, 3);

    unsafe {
        mem::free(a);
        mem::free(b);
        mem::free(c);
    }
}

#[test]
fn freeing_both_neighbors_coalesces_into_one_block() {
    let _guard = TEST_LOCK.lock().unwrap();
    let mut r = region(4096);
    unsafe { mem::init(r.as_mut_ptr(), r.len()) };

    let a = mem::alloc(64);
    let b = mem::alloc(64);
    let c = mem::alloc(64);

    // Free in an order that forces `b`'s free to merge with an
    // already-free predecessor *and* an already-free successor in the
    // same call.
    unsafe {
        mem::free(a);
        mem::free(c);
        mem::free(b);
    }

    let report = mem::check_invariants().unwrap();
    assert_eq!(report.total_blocks, 1);
    assert_eq!(report.free_blocks, 1);
    assert_eq!(report.used_blocks, 0);
}

#[test]
fn allocation_after_two_free_blocks_prefers_the_larger_one() {
    let _guard = TEST_LOCK.lock().unwrap();
    let mut r = region(8192);
    unsafe { mem::init(r.as_mut_ptr(), r.len()) };

    let a = mem::alloc(500); // will become the larger free block
    let spacer_ab = mem::alloc(16); // keeps `a` and `b` from coalescing
    let b = mem::alloc(200); // will become the smaller free block
    // Keep the tail allocated too, so freeing `b` has no free neighbor on
    // either side to merge with — without this, `b` would coalesce with
    // the free remainder of the region and stop being the smaller of two
    // isolated free blocks.
    let spacer_tail = mem::alloc(16);
    unsafe {
        mem::free(a);
        mem::free(b);
    }

    let report = mem::check_invariants().unwrap();
    assert_eq!(report.free_blocks, 2); // a and b, isolated by the spacers

    // Worst-fit splits off the front of the larger block, so a request
    // that fits in either must come back out of `a`'s old address, not
    // `b`'s — this is the only externally observable signature of
    // worst-fit vs. best-fit without reaching into allocator internals.
    let small = mem::alloc(150);
    assert_eq!(small, a);

    unsafe {
        mem::free(small);
        mem::free(spacer_ab);
        mem::free(spacer_tail);
    }
}

#[test]
fn random_alloc_free_workload_never_violates_invariants() {
    let _guard = TEST_LOCK.lock().unwrap();
    let mut r = region(1 << 20);
    unsafe { mem::init(r.as_mut_ptr(), r.len()) };

    // Small hand-rolled xorshift PRNG; no example in this corpus pulls in
    // a `rand` dependency for a one-off stress loop.
    let mut state: u32 = 0x9E37_79B9;
    let mut next_u32 = || {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        state
    };

    const SLOTS: usize = 1000;
    let mut slots: Vec<*mut u8> = vec![std::ptr::null_mut(); SLOTS];

    for i in 0..100_000u32 {
        let slot = (next_u32() as usize) % SLOTS;
        if slots[slot].is_null() {
            let size = 1 + (next_u32() as usize % 512);
            slots[slot] = mem::alloc(size);
        } else {
            unsafe { mem::free(slots[slot]) };
            slots[slot] = std::ptr::null_mut();
        }

        if i % 997 == 0 {
            mem::check_invariants().expect("invariants must hold mid-run");
        }
    }

    for p in slots.into_iter().filter(|p| !p.is_null()) {
        unsafe { mem::free(p) };
    }
    let report = mem::check_invariants().expect("invariants must hold at the end");
    assert_eq!(report.used_blocks, 0);
    assert_eq!(report.free_blocks, 1);
}

// ---- process manager scenarios ------------------------------------------

static LOG: OnceLock<Mutex<Vec<u64>>> = OnceLock::new();

fn log_handle() -> &'static Mutex<Vec<u64>> {
    LOG.get_or_init(|| Mutex::new(Vec::new()))
}

fn reset_log() {
    log_handle().lock().unwrap().clear();
}

fn record(pid: task::Pid) {
    log_handle().lock().unwrap().push(pid);
}

fn take_log() -> Vec<u64> {
    log_handle().lock().unwrap().clone()
}

extern "C" fn yield_once_then_exit() -> i32 {
    let pid = task::current_pid().expect("running process must have a pid");
    record(pid);
    task::yield_now();
    record(pid);
    task::delete(pid);
    0
}

#[test]
fn two_process_round_robin_print_order() {
    let _guard = TEST_LOCK.lock().unwrap();
    reset_log();
    // Well above STACK_SIZE: the bootstrap PCB, the child's PCB, and its
    // whole stack all come out of this one region.
    let mut r = region(1 << 20);
    unsafe { mem::init(r.as_mut_ptr(), r.len()) };
    task::init();

    record(task::current_pid().unwrap()); // bootstrap, pid 0

    let child = task::create(yield_once_then_exit);
    assert!(child > 0, "create must hand out a positive pid");

    // `create` enqueues the child at the *head* of the ready queue and
    // switches to it immediately, so by the time control is back here
    // the child has already logged its first action and yielded once.
    record(task::current_pid().unwrap()); // back to bootstrap

    task::yield_now(); // let the child run its second half and self-delete

    let child = child as u64;
    assert_eq!(take_log(), vec![0, child, 0, child]);
}

extern "C" fn self_delete_immediately() -> i32 {
    let pid = task::current_pid().unwrap();
    record(pid);
    task::delete(pid);
    0
}

#[test]
fn self_deletion_does_not_corrupt_the_ready_queue() {
    let _guard = TEST_LOCK.lock().unwrap();
    reset_log();
    let mut r = region(1 << 20);
    unsafe { mem::init(r.as_mut_ptr(), r.len()) };
    task::init();

    // Create several processes back to back; each one runs and
    // self-deletes before the next `create` call returns, since `create`
    // inserts at the ready-queue head and switches immediately.
    let mut children = Vec::new();
    for _ in 0..5 {
        let pid = task::create(self_delete_immediately);
        assert!(pid > 0);
        children.push(pid as u64);
    }

    assert!(task::ready_queue_consistent());
    assert_eq!(take_log(), children);
}

extern "C" fn spin_forever_yielding() -> i32 {
    let pid = task::current_pid().unwrap();
    for _ in 0..3 {
        record(pid);
        task::yield_now();
    }
    task::delete(pid);
    0
}

#[test]
fn bootstrap_interleaves_with_a_long_lived_child() {
    let _guard = TEST_LOCK.lock().unwrap();
    reset_log();
    let mut r = region(1 << 20);
    unsafe { mem::init(r.as_mut_ptr(), r.len()) };
    task::init();

    let child = task::create(spin_forever_yielding) as u64;
    // One round already happened inside `create`; the child logged once
    // and yielded back here.
    assert_eq!(take_log(), vec![child]);

    task::yield_now();
    task::yield_now();

    assert_eq!(take_log(), vec![child, child, child]);
    assert!(task::ready_queue_consistent());
}
