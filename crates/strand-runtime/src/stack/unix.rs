//! Unix slab reservation using mmap
//!
//! The whole slab is reserved PROT_NONE up front; usable ranges are opened
//! with mprotect the first time a slot is carved. Guard regions are never
//! touched again, so any access to them faults.

use strand_core::error::{MemoryError, SchedResult};

/// Hint for slab start address (high address to avoid conflicts)
const SLAB_START_HINT: usize = 0x7100_0000_0000;

/// Reserve `len` bytes of inaccessible address space
pub(crate) fn reserve_slab(len: usize) -> SchedResult<*mut u8> {
    let base = unsafe {
        libc::mmap(
            SLAB_START_HINT as *mut libc::c_void,
            len,
            libc::PROT_NONE, // no access until a slot is activated
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE,
            -1,
            0,
        )
    };

    if base == libc::MAP_FAILED {
        return Err(MemoryError::AllocationFailed.into());
    }

    Ok(base as *mut u8)
}

/// Make a usable range readable and writable
pub(crate) fn activate(addr: *mut u8, len: usize) -> SchedResult<()> {
    let ret = unsafe {
        libc::mprotect(
            addr as *mut libc::c_void,
            len,
            libc::PROT_READ | libc::PROT_WRITE,
        )
    };
    if ret != 0 {
        return Err(MemoryError::ProtectionFailed.into());
    }
    Ok(())
}
