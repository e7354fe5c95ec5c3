//! # strand - cooperative user-level threading
//!
//! A user-level (M:N) cooperative threading runtime: strands are lightweight
//! threads whose execution contexts are captured and restored entirely in
//! userspace, on guard-protected stacks recycled through a per-context cache.
//!
//! ## Quick Start
//!
//! ```ignore
//! use strand::{RuntimeConfig, yield_now};
//!
//! fn main() {
//!     strand::init(RuntimeConfig::from_env()).unwrap();
//!     strand::init_thread().unwrap();
//!
//!     strand::spawn_main(|| {
//!         strand::spawn(|| {
//!             println!("hello from a strand");
//!             yield_now();
//!             println!("back again");
//!         }).unwrap();
//!
//!         yield_now(); // let it run
//!     }).unwrap();
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    User Code                        │
//! │      spawn(), yield_now(), park/wake, WaitSet       │
//! └─────────────────────────────────────────────────────┘
//!                          │
//!                          ▼
//! ┌─────────────────────────────────────────────────────┐
//! │                Scheduler (per context)              │
//! │    FIFO run queue, wait sets, RUNNING ⇄ RUNNABLE    │
//! │              ⇄ SLEEPING state machine               │
//! └─────────────────────────────────────────────────────┘
//!                          │
//!             ┌────────────┴────────────┐
//!             ▼                         ▼
//! ┌───────────────────────┐ ┌───────────────────────────┐
//! │ Context switch (asm)  │ │       Stack manager       │
//! │ pop_tf / call_runtime │ │ slab + guards + LIFO cache│
//! └───────────────────────┘ └───────────────────────────┘
//! ```
//!
//! ## Lifecycle
//!
//! 1. `init(config)` once per process
//! 2. `init_thread()` on every OS thread that will run strands
//! 3. `spawn_main(f)` to bootstrap work on the calling stack, or
//!    `sched_start()` to hand the thread to the scheduler for good

// Re-export core types
pub use strand_core::{SchedError, SchedResult, StrandId, StrandState, TrapFrame};

// Re-export kprint macros for debug logging
pub use strand_core::kprint::{init as init_logging, set_flush_enabled, set_log_level, LogLevel};
pub use strand_core::{kdebug, kerror, kinfo, kprintln, ktrace, kwarn};

// Re-export env utilities
pub use strand_core::{env_get, env_get_bool};

// Re-export runtime types and operations
pub use strand_runtime::{
    live_strands, park_current, sched_start, spawn, spawn_main, spawn_raw, wake_all, wake_one,
    wake_one_with, yield_now, RuntimeConfig, WaitSet,
};

use strand_runtime::{sched_init, sched_init_thread, stack_init, stack_init_thread};

/// One-time process-wide initialization: stack slab, fault handler,
/// scheduler tables. Must precede `init_thread`.
pub fn init(config: RuntimeConfig) -> SchedResult<()> {
    stack_init(&config)?;
    sched_init(&config)?;
    Ok(())
}

/// Per-OS-thread initialization: stack cache and execution context.
/// Must run on every thread that spawns or runs strands.
pub fn init_thread() -> SchedResult<()> {
    stack_init_thread()?;
    sched_init_thread()?;
    Ok(())
}

/// The id of the strand we're running in, or `StrandId::NONE`
#[inline]
pub fn current_id() -> StrandId {
    strand_runtime::tls::current_strand_id()
}

/// Check if currently executing within a strand
#[inline]
pub fn is_in_strand() -> bool {
    strand_runtime::tls::in_strand()
}
