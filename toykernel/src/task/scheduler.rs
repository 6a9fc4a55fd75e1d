//! The ready queue and the round-robin scheduler.
//!
//! The scheduler is the only place a context switch happens: dequeue the
//! next ready process, push the current one (if any) to the tail as
//! `READY`, install the dequeued one as running, then swap stacks.
//! Creating a process inserts it at the *head* of the ready queue before
//! calling this, so a freshly created process runs next — before
//! whoever was already waiting.

use super::context;
use super::pcb::{Pcb, Pid, ProcessState};
use core::ptr;
use spin::Mutex;

pub(crate) struct Scheduler {
    ready_head: *mut Pcb,
    ready_tail: *mut Pcb,
    running: *mut Pcb,
    next_pid: Pid,
}

// SAFETY: reached only through `SCHEDULER`'s spin::Mutex.
unsafe impl Send for Scheduler {}

pub(crate) static SCHEDULER: Mutex<Scheduler> = Mutex::new(Scheduler::uninit());

impl Scheduler {
    pub(crate) const fn uninit() -> Self {
        Self {
            ready_head: ptr::null_mut(),
            ready_tail: ptr::null_mut(),
            running: ptr::null_mut(),
            next_pid: 0,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.ready_head = ptr::null_mut();
        self.ready_tail = ptr::null_mut();
        self.running = ptr::null_mut();
        self.next_pid = 0;
    }

    pub(crate) fn alloc_pid(&mut self) -> Pid {
        let pid = self.next_pid;
        self.next_pid = self.next_pid.wrapping_add(1);
        pid
    }

    pub(crate) fn set_running(&mut self, pcb: *mut Pcb) {
        self.running = pcb;
    }

    pub(crate) fn running(&self) -> *mut Pcb {
        self.running
    }

    pub(crate) fn current_pid(&self) -> Option<Pid> {
        if self.running.is_null() {
            None
        } else {
            Some(unsafe { (*self.running).pid })
        }
    }

    /// Clears the running slot without freeing anything — used when a
    /// process deletes itself, so the scheduler's next `schedule()` call
    /// knows there is no outgoing process to save.
    pub(crate) fn clear_running(&mut self) {
        self.running = ptr::null_mut();
    }

    /// Appends `pcb` to the tail of the ready queue.
    ///
    /// # Safety
    /// `pcb` must be a live PCB not already linked into the ready queue.
    pub(crate) unsafe fn enqueue_tail(&mut self, pcb: *mut Pcb) {
        unsafe {
            (*pcb).next = ptr::null_mut();
        }
        if self.ready_tail.is_null() {
            self.ready_head = pcb;
        } else {
            unsafe {
                (*self.ready_tail).next = pcb;
            }
        }
        self.ready_tail = pcb;
    }

    /// Inserts `pcb` at the head of the ready queue — used only by
    /// `task::create`, so a freshly created process runs before whoever
    /// was already waiting.
    ///
    /// # Safety
    /// `pcb` must be a live PCB not already linked into the ready queue.
    pub(crate) unsafe fn enqueue_head(&mut self, pcb: *mut Pcb) {
        unsafe {
            (*pcb).next = self.ready_head;
        }
        if self.ready_head.is_null() {
            self.ready_tail = pcb;
        }
        self.ready_head = pcb;
    }

    /// Removes and returns the head of the ready queue, or null if empty.
    fn dequeue_head(&mut self) -> *mut Pcb {
        let head = self.ready_head;
        if head.is_null() {
            return ptr::null_mut();
        }
        unsafe {
            self.ready_head = (*head).next;
            (*head).next = ptr::null_mut();
        }
        if self.ready_head.is_null() {
            self.ready_tail = ptr::null_mut();
        }
        head
    }

    /// Splices the PCB with the given `pid` out of the ready queue, if
    /// present.
    pub(crate) fn remove_ready(&mut self, pid: Pid) -> Option<*mut Pcb> {
        let mut prev: *mut Pcb = ptr::null_mut();
        let mut cur = self.ready_head;
        while !cur.is_null() {
            let next = unsafe { (*cur).next };
            if unsafe { (*cur).pid } == pid {
                if prev.is_null() {
                    self.ready_head = next;
                } else {
                    unsafe {
                        (*prev).next = next;
                    }
                }
                if self.ready_tail == cur {
                    self.ready_tail = prev;
                }
                unsafe {
                    (*cur).next = ptr::null_mut();
                }
                return Some(cur);
            }
            prev = cur;
            cur = next;
        }
        None
    }

    /// True iff membership is consistent with the head/tail pointers
    /// (property 8) and every queued PCB has state `READY`.
    #[doc(hidden)]
    pub fn ready_queue_consistent(&self) -> bool {
        if self.ready_head.is_null() != self.ready_tail.is_null() {
            return false;
        }
        let mut cur = self.ready_head;
        let mut last = ptr::null_mut();
        while !cur.is_null() {
            if unsafe { (*cur).state } != ProcessState::Ready {
                return false;
            }
            last = cur;
            cur = unsafe { (*cur).next };
        }
        last == self.ready_tail
    }
}

/// Runs one round of the scheduler: pick the next ready process (if any)
/// and switch to it.
pub(crate) fn schedule() {
    enum Action {
        None,
        Swap(*mut usize, usize),
        SwitchOnly(usize),
    }

    let action = {
        let mut sched = SCHEDULER.lock();
        let next = sched.dequeue_head();
        if next.is_null() {
            Action::None
        } else {
            let outgoing = sched.running();
            if !outgoing.is_null() {
                unsafe {
                    (*outgoing).state = ProcessState::Ready;
                }
                unsafe {
                    sched.enqueue_tail(outgoing);
                }
            }
            unsafe {
                (*next).next = ptr::null_mut();
                (*next).state = ProcessState::Running;
            }
            sched.set_running(next);
            let new_sp = unsafe { (*next).stack_ptr };
            if outgoing.is_null() {
                Action::SwitchOnly(new_sp)
            } else {
                Action::Swap(unsafe { &mut (*outgoing).stack_ptr as *mut usize }, new_sp)
            }
        }
    };

    match action {
        Action::None => {}
        Action::Swap(old_sp, new_sp) => unsafe { context::switch(old_sp, new_sp) },
        Action::SwitchOnly(new_sp) => unsafe { context::switch_to(new_sp) },
    }
}
