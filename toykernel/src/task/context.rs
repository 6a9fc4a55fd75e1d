//! The stack-switch primitive.
//!
//! This is the one part of the scheduler that is inherently non-portable
//! and inherently outside the type system. Its contract is kept
//! deliberately narrow:
//!
//! - [`switch`]: save the outgoing stack pointer to `*old_sp`, load the
//!   incoming one from `new_sp`, return. The "return" lands wherever the
//!   incoming process's stack says it should — either back into a
//!   previous call to `switch` (the common case) or, for a brand-new
//!   process, directly into its start routine (see [`prepare_stack`]).
//! - [`switch_to`]: the one-way variant used when there is no outgoing
//!   process to save (a process deleting itself — its stack is about to
//!   be abandoned for good, so nothing is written back).
//!
//! Everything else in [`super::scheduler`] is ordinary, portable Rust;
//! only these two routines touch the machine stack pointer directly.
//!
//! Only `x86_64` is implemented. Porting to another architecture means
//! replacing this module's `global_asm!` blocks and [`prepare_stack`]'s
//! layout to match that architecture's calling convention — the rest of
//! the process manager is unchanged.

use super::pcb::Pcb;
use core::mem::size_of;

#[cfg(target_arch = "x86_64")]
core::arch::global_asm!(
    ".global toykernel_switch",
    "toykernel_switch:",
    // rdi = &mut old.stack_ptr, rsi = new.stack_ptr
    "push rbp",
    "push rbx",
    "push r12",
    "push r13",
    "push r14",
    "push r15",
    "mov [rdi], rsp",
    "mov rsp, rsi",
    "pop r15",
    "pop r14",
    "pop r13",
    "pop r12",
    "pop rbx",
    "pop rbp",
    "ret",
);

#[cfg(target_arch = "x86_64")]
core::arch::global_asm!(
    ".global toykernel_switch_to",
    "toykernel_switch_to:",
    // rdi = new.stack_ptr; never returns to the caller.
    "mov rsp, rdi",
    "pop r15",
    "pop r14",
    "pop r13",
    "pop r12",
    "pop rbx",
    "pop rbp",
    "ret",
);

#[cfg(target_arch = "x86_64")]
extern "C" {
    fn toykernel_switch(old_sp: *mut usize, new_sp: usize);
    fn toykernel_switch_to(new_sp: usize) -> !;
}

/// Number of callee-saved registers `toykernel_switch` preserves across a
/// switch (r15, r14, r13, r12, rbx, rbp), plus one slot for the return
/// address a `ret` consumes.
const FRAME_WORDS: usize = 7;

/// Exchanges the running stack pointer with another process's.
///
/// # Safety
/// `old_sp` must point to a live PCB's `stack_ptr` field belonging to the
/// process currently executing. `new_sp` must be a value previously
/// written by a prior `switch`/`switch_to`, or prepared by
/// [`prepare_stack`], for a stack that is not currently in use by any
/// other process.
#[cfg(target_arch = "x86_64")]
pub(crate) unsafe fn switch(old_sp: *mut usize, new_sp: usize) {
    unsafe { toykernel_switch(old_sp, new_sp) }
}

/// Switches directly into `new_sp` without saving anything for the
/// current stack, which is abandoned. Used when a process deletes itself:
/// there is no PCB left to write an outgoing stack pointer into.
///
/// # Safety
/// Same as [`switch`], minus the outgoing side. This function never
/// returns to its caller.
#[cfg(target_arch = "x86_64")]
pub(crate) unsafe fn switch_to(new_sp: usize) -> ! {
    unsafe { toykernel_switch_to(new_sp) }
}

/// Lays out a brand-new process's stack so that the first `switch` into
/// it lands directly in `start`, as if `toykernel_switch` had just
/// returned from a call made from inside `start`'s caller.
///
/// Concretely: six zeroed callee-saved-register slots (matching the six
/// `pop`s in `toykernel_switch`/`toykernel_switch_to`) followed by
/// `start` itself as the return address. `start` must terminate the
/// process — by calling [`super::delete`] on its own pid — rather than
/// returning normally; falling off the end of `start` would pop
/// uninitialized data as a return address.
///
/// # Safety
/// `stack_base` must point to a region of at least `stack_size` writable
/// bytes, not otherwise in use, for the lifetime of the process.
#[cfg(target_arch = "x86_64")]
pub(crate) unsafe fn prepare_stack(
    pcb: *mut Pcb,
    stack_base: *mut u8,
    stack_size: usize,
    start: extern "C" fn() -> i32,
) {
    unsafe {
        let top = stack_base as usize + stack_size;
        let sp = top - FRAME_WORDS * size_of::<usize>();
        let words = sp as *mut usize;
        // Popped in this order by both switch routines: r15, r14, r13,
        // r12, rbx, rbp, then `ret` consumes the return address.
        words.add(0).write(0); // r15
        words.add(1).write(0); // r14
        words.add(2).write(0); // r13
        words.add(3).write(0); // r12
        words.add(4).write(0); // rbx
        words.add(5).write(0); // rbp
        words.add(6).write(start as usize); // return address
        (*pcb).stack_ptr = sp;
    }
}

#[cfg(not(target_arch = "x86_64"))]
compile_error!("toykernel's context switch is only implemented for x86_64");
