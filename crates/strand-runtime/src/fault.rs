//! Guard-fault diagnosis
//!
//! A write or read into a stack's guard region is the runtime's only
//! stack-overflow detection mechanism; there is no growable-stack fallback.
//! The handler classifies SIGSEGV/SIGBUS fault addresses against the slab
//! layout: a guard hit names the running strand and aborts, anything else
//! is re-raised with the default disposition so ordinary crashes keep their
//! ordinary behavior.
//!
//! The handler runs on a per-thread alternate signal stack, because when a
//! strand overflows by pushing, rsp itself already points into the guard.

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use strand_core::error::{SchedError, SchedResult};

static HANDLER_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Alternate signal stack size per thread
const SIGSTACK_SIZE: usize = 64 * 1024;

thread_local! {
    static SIGSTACK_READY: Cell<bool> = const { Cell::new(false) };
}

/// Install the SIGSEGV/SIGBUS classifier (process-wide, once)
pub fn install_guard_fault_handler() -> SchedResult<()> {
    if HANDLER_INSTALLED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }

    let action = SigAction::new(
        SigHandler::SigAction(handle_fault),
        SaFlags::SA_SIGINFO | SaFlags::SA_ONSTACK,
        SigSet::empty(),
    );

    unsafe {
        sigaction(Signal::SIGSEGV, &action)
            .map_err(|e| SchedError::PlatformError(e as i32))?;
        sigaction(Signal::SIGBUS, &action)
            .map_err(|e| SchedError::PlatformError(e as i32))?;
    }

    Ok(())
}

/// Give the calling thread an alternate signal stack
///
/// Called from `stack_init_thread`. The buffer lives as long as the thread;
/// execution contexts are permanent, so it is simply leaked.
pub(crate) fn install_thread_sigstack() {
    SIGSTACK_READY.with(|ready| {
        if ready.get() {
            return;
        }
        unsafe {
            let buf = libc::malloc(SIGSTACK_SIZE);
            if buf.is_null() {
                return; // handler will run on the faulting stack; best effort
            }
            let ss = libc::stack_t {
                ss_sp: buf,
                ss_flags: 0,
                ss_size: SIGSTACK_SIZE,
            };
            libc::sigaltstack(&ss, std::ptr::null_mut());
        }
        ready.set(true);
    });
}

extern "C" fn handle_fault(signo: libc::c_int, info: *mut libc::siginfo_t, _ctx: *mut libc::c_void) {
    let addr = unsafe { (*info).si_addr() } as usize;

    if let Some(pool) = crate::stack::pool() {
        if pool.addr_in_guard(addr) {
            // Only async-signal-safe calls from here on: raw writes + abort.
            write_bytes(b"strand: fatal stack overflow (guard region hit), strand ");
            let id = crate::tls::current_strand_id();
            if id.is_some() {
                write_u32(id.as_u32());
            } else {
                write_bytes(b"<none>");
            }
            write_bytes(b", fault addr 0x");
            write_hex(addr as u64);
            write_bytes(b"\n");
            unsafe { libc::abort() };
        }
    }

    // Not ours: fall back to the default disposition and re-raise
    let dfl = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    unsafe {
        let sig = Signal::try_from(signo).unwrap_or(Signal::SIGSEGV);
        let _ = sigaction(sig, &dfl);
        let _ = libc::raise(signo);
    }
}

fn write_bytes(bytes: &[u8]) {
    unsafe {
        let _ = libc::write(2, bytes.as_ptr() as *const libc::c_void, bytes.len());
    }
}

fn write_u32(mut v: u32) {
    let mut buf = [0u8; 10];
    let mut i = buf.len();
    loop {
        i -= 1;
        buf[i] = b'0' + (v % 10) as u8;
        v /= 10;
        if v == 0 {
            break;
        }
    }
    write_bytes(&buf[i..]);
}

fn write_hex(v: u64) {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    let mut buf = [0u8; 16];
    for (i, b) in buf.iter_mut().enumerate() {
        *b = DIGITS[((v >> ((15 - i) * 4)) & 0xF) as usize];
    }
    write_bytes(&buf);
}
