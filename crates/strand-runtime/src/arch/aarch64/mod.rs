//! aarch64 context switching implementation
//!
//! TODO: port the x86_64 primitives (x19-x28/fp/lr/sp save set, entry via
//! x30) for Linux ARM and Apple Silicon.

use strand_core::trapframe::TrapFrame;

/// Restore a trap frame and jump into it; never returns
///
/// # Safety
///
/// `tf` must describe a resumable context.
pub unsafe extern "C" fn pop_tf(_tf: *const TrapFrame) -> ! {
    todo!("aarch64 pop_tf not yet implemented")
}

/// Save the caller into `tf`, switch to `stack`, call `f(arg)`
///
/// # Safety
///
/// `stack` must be a valid 16-byte-aligned stack top; `f` must not return.
pub unsafe extern "C" fn call_runtime(
    _tf: *mut TrapFrame,
    _f: extern "C" fn(usize),
    _stack: *mut u8,
    _arg: usize,
) {
    todo!("aarch64 call_runtime not yet implemented")
}

/// Address of the exit trampoline written into fresh stacks
pub fn exit_trampoline_addr() -> usize {
    todo!("aarch64 exit trampoline not yet implemented")
}
