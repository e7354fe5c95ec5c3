//! # strand-runtime
//!
//! Platform-specific runtime implementation for the strand scheduler.
//!
//! This crate provides:
//! - Stack slab management (mmap, guard regions, per-context caching)
//! - Guard-fault diagnosis (SIGSEGV/SIGBUS)
//! - Context switching (architecture-specific assembly)
//! - The per-context scheduler state machine
//!
//! Layering is strict: `stack` depends on nothing else here, `arch` operates
//! only on memory handed to it, and `sched` sits on top of both.

#![allow(dead_code)]

pub mod arch;
pub mod config;
pub mod fault;
pub mod sched;
pub mod stack;
pub mod strand;
pub mod tls;
pub mod waitset;

// Re-exports
pub use config::RuntimeConfig;
pub use sched::{
    live_strands, park_current, sched_init, sched_init_thread, sched_start, spawn, spawn_main,
    spawn_raw, wake_all, wake_one, wake_one_with, yield_now,
};
pub use stack::{init_for_entry, stack_init, stack_init_thread, Stack};
pub use waitset::WaitSet;

// Architecture detection
cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        pub use arch::x86_64 as current_arch;
    } else if #[cfg(target_arch = "aarch64")] {
        pub use arch::aarch64 as current_arch;
    } else {
        compile_error!("Unsupported architecture");
    }
}
