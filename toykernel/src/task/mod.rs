//! The cooperative process manager: a ready queue, a round-robin
//! scheduler, and raw stack-pointer context switching.
//!
//! Every process, including the bootstrap one, has a [`pcb::Pcb`]
//! allocated from [`crate::mem`] — this module has no heap of its own,
//! and never reaches for `Box`. A process's `start` function must end by
//! calling [`delete`] on its own pid; returning normally would pop
//! whatever garbage happens to be below the stack frame as a return
//! address.

mod context;
mod pcb;
mod scheduler;

use crate::config::{PCB_MAGIC, STACK_SIZE};
use crate::mem;
use scheduler::SCHEDULER;

pub use pcb::{Pid, ProcessState};
use pcb::Pcb;

/// Resets the process manager and installs the calling context as the
/// bootstrap process (pid 0).
///
/// Must be called after [`mem::init`] and before any other function in
/// this module. Calling it again starts a fresh scheduler — any PCBs
/// from a previous run are abandoned, not freed.
pub fn init() {
    let pcb = mem::alloc(core::mem::size_of::<Pcb>()) as *mut Pcb;
    assert!(!pcb.is_null(), "task::init: out of memory for bootstrap PCB");
    unsafe {
        (*pcb).magic = PCB_MAGIC;
        (*pcb).pid = 0;
        // Not `Ready`: this PCB represents the thread already executing
        // this call, so it starts out as the running process rather than
        // waiting to be scheduled in.
        (*pcb).state = ProcessState::Running;
        (*pcb).stack_base = core::ptr::null_mut();
        (*pcb).stack_ptr = 0;
        (*pcb).next = core::ptr::null_mut();
    }

    let mut sched = SCHEDULER.lock();
    sched.reset();
    sched.alloc_pid(); // consume pid 0
    sched.set_running(pcb);
    log::info!("task: bootstrap process (pid 0) initialized");
}

/// Creates a new process running `start`, returning its pid, or `-1` if
/// a PCB or stack could not be allocated.
///
/// The new process is inserted at the *head* of the ready queue and the
/// scheduler is invoked immediately, so it runs before any
/// already-waiting process — matching the source design's
/// create-then-yield behavior.
pub fn create(start: extern "C" fn() -> i32) -> i64 {
    let pcb = mem::alloc(core::mem::size_of::<Pcb>()) as *mut Pcb;
    if pcb.is_null() {
        log::warn!("task::create: out of memory for PCB");
        return -1;
    }
    let stack = mem::alloc(STACK_SIZE);
    if stack.is_null() {
        log::warn!("task::create: out of memory for a {STACK_SIZE}-byte stack");
        unsafe { mem::free(pcb as *mut u8) };
        return -1;
    }

    let pid = {
        let mut sched = SCHEDULER.lock();
        sched.alloc_pid()
    };

    unsafe {
        (*pcb).magic = PCB_MAGIC;
        (*pcb).pid = pid;
        (*pcb).state = ProcessState::Ready;
        (*pcb).stack_base = stack;
        (*pcb).next = core::ptr::null_mut();
        context::prepare_stack(pcb, stack, STACK_SIZE, start);
    }

    {
        let mut sched = SCHEDULER.lock();
        unsafe { sched.enqueue_head(pcb) };
    }
    log::info!("task: created pid {pid}");

    scheduler::schedule();
    pid as i64
}

/// Terminates the process identified by `pid`.
///
/// - If `pid` is ready but not running, its PCB and stack are freed
///   immediately and the scheduler runs (a no-op if nothing changed).
/// - If `pid` is the currently running process, this call does not
///   return to its caller in the ordinary sense: the scheduler switches
///   away for good. Its PCB and stack are intentionally **not** freed —
///   there is no longer a safe stack to free them from (see DESIGN.md).
/// - An unknown `pid` is a silent no-op other than invoking the
///   scheduler.
///
/// Returns `0` on success. Note that a self-delete with no other ready
/// process never reaches the `return 0` — it diverges into whichever
/// process is switched to, or, in the degenerate case of an empty ready
/// queue, falls back into this same (already "deleted") stack; see
/// DESIGN.md for that known limitation.
pub fn delete(pid: Pid) -> i32 {
    let is_running = {
        let sched = SCHEDULER.lock();
        sched.current_pid() == Some(pid)
    };

    if is_running {
        let mut sched = SCHEDULER.lock();
        sched.clear_running();
        drop(sched);
        log::info!("task: pid {pid} deleting itself");
        scheduler::schedule();
        // Reached only if the ready queue was empty — see DESIGN.md.
        log::warn!("task: self-delete of pid {pid} found no other ready process");
        return 0;
    }

    let removed = {
        let mut sched = SCHEDULER.lock();
        sched.remove_ready(pid)
    };
    match removed {
        Some(victim) => unsafe {
            debug_assert!(
                Pcb::is_valid(victim),
                "task::delete: ready-queue entry for pid {pid} is not a valid PCB"
            );
            let stack_base = (*victim).stack_base;
            if !stack_base.is_null() {
                mem::free(stack_base);
            }
            mem::free(victim as *mut u8);
            log::info!("task: deleted pid {pid}");
        },
        None => {
            log::debug!("task: delete({pid}) — unknown pid, ignored");
        }
    }

    scheduler::schedule();
    0
}

/// Voluntarily gives up the processor, re-enqueuing the caller at the
/// tail of the ready queue if there is anyone else to run.
pub fn yield_now() {
    scheduler::schedule();
}

/// Returns the pid of the process currently running, if the process
/// manager has been initialized.
pub fn current_pid() -> Option<Pid> {
    SCHEDULER.lock().current_pid()
}

#[doc(hidden)]
pub fn ready_queue_consistent() -> bool {
    SCHEDULER.lock().ready_queue_consistent()
}
