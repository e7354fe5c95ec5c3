//! Architecture-specific context switching
//!
//! Two primitives only: `pop_tf` (unconditional resume of a saved trap
//! frame) and `call_runtime` (record the caller into a trap frame, then
//! invoke a function on a different stack). All raw register manipulation
//! in the runtime lives behind these two.

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        pub mod x86_64;
    } else if #[cfg(target_arch = "aarch64")] {
        pub mod aarch64;
    }
}
