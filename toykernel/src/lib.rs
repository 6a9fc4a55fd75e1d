//! A didactic kernel core: a worst-fit, coalescing region allocator and a
//! cooperative single-threaded process manager built on top of it.
//!
//! This crate is hosted, not bare-metal — it links against `std` and
//! never touches stdout, environment variables, or process exit codes
//! itself. Everything it needs (a byte region to manage, a logger, an
//! entry point) is handed to it by the caller; see the `demos` crate in
//! this workspace for runnable drivers.
//!
//! # Modules
//! - [`mem`]: the region allocator.
//! - [`task`]: the process manager, built on top of `mem` for its PCBs
//!   and per-process stacks.
//!
//! Initialization order matters: call [`mem::init`] before [`task::init`],
//! since the process manager allocates its bootstrap PCB from the region.

pub mod config;
pub mod mem;
pub mod task;
