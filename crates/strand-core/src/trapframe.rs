//! Saved register record for context switches
//!
//! The layout follows the System V AMD64 calling convention: argument
//! registers that the callee may clobber, callee-saved registers, then the
//! three special-purpose values (return value, instruction pointer, stack
//! pointer). The struct is `repr(C)` with stable offsets because the
//! context-switch assembly in `strand-runtime` addresses fields by literal
//! offset.
//!
//! Layout (offsets are load-bearing for the assembly):
//! ```text
//! 0x00: rdi   (first argument)
//! 0x08: rsi
//! 0x10: rdx
//! 0x18: rcx
//! 0x20: r8
//! 0x28: r9
//! 0x30: r10
//! 0x38: r11
//! 0x40: rbx   (callee-saved)
//! 0x48: rbp
//! 0x50: r12
//! 0x58: r13
//! 0x60: r14
//! 0x68: r15
//! 0x70: rax   (return value)
//! 0x78: rip
//! 0x80: rsp
//! ```
//!
//! A trap frame is meaningful only while its owning strand is suspended;
//! while the strand runs, the live register file is authoritative and the
//! frame is stale until the next suspension point rewrites it.

/// All registers that must survive a context switch
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TrapFrame {
    // Argument registers, clobberable by the callee
    pub rdi: u64,
    pub rsi: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub r8: u64,
    pub r9: u64,
    pub r10: u64,
    pub r11: u64,

    // Callee-saved registers
    pub rbx: u64,
    pub rbp: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,

    // Special-purpose registers
    pub rax: u64,
    pub rip: u64,
    pub rsp: u64,
}

impl TrapFrame {
    /// A zeroed trap frame
    pub const fn new() -> Self {
        Self {
            rdi: 0,
            rsi: 0,
            rdx: 0,
            rcx: 0,
            r8: 0,
            r9: 0,
            r10: 0,
            r11: 0,
            rbx: 0,
            rbp: 0,
            r12: 0,
            r13: 0,
            r14: 0,
            r15: 0,
            rax: 0,
            rip: 0,
            rsp: 0,
        }
    }

    /// First six integer/pointer call arguments by convention position
    ///
    /// # Panics
    ///
    /// Panics if `n > 5`; the convention passes further arguments on the
    /// stack, which a trap frame does not capture.
    #[inline]
    pub fn arg(&self, n: usize) -> u64 {
        match n {
            0 => self.rdi,
            1 => self.rsi,
            2 => self.rdx,
            3 => self.rcx,
            4 => self.r8,
            5 => self.r9,
            _ => panic!("argument {} is not register-passed", n),
        }
    }

    /// Set one of the first six call arguments by convention position
    #[inline]
    pub fn set_arg(&mut self, n: usize, value: u64) {
        match n {
            0 => self.rdi = value,
            1 => self.rsi = value,
            2 => self.rdx = value,
            3 => self.rcx = value,
            4 => self.r8 = value,
            5 => self.r9 = value,
            _ => panic!("argument {} is not register-passed", n),
        }
    }
}

impl Default for TrapFrame {
    fn default() -> Self {
        TrapFrame::new()
    }
}

// The assembly addresses fields by these offsets; hold them in place.
const _: () = {
    use core::mem::offset_of;
    assert!(offset_of!(TrapFrame, rdi) == 0x00);
    assert!(offset_of!(TrapFrame, rsi) == 0x08);
    assert!(offset_of!(TrapFrame, rdx) == 0x10);
    assert!(offset_of!(TrapFrame, rcx) == 0x18);
    assert!(offset_of!(TrapFrame, r8) == 0x20);
    assert!(offset_of!(TrapFrame, r9) == 0x28);
    assert!(offset_of!(TrapFrame, r10) == 0x30);
    assert!(offset_of!(TrapFrame, r11) == 0x38);
    assert!(offset_of!(TrapFrame, rbx) == 0x40);
    assert!(offset_of!(TrapFrame, rbp) == 0x48);
    assert!(offset_of!(TrapFrame, r12) == 0x50);
    assert!(offset_of!(TrapFrame, r13) == 0x58);
    assert!(offset_of!(TrapFrame, r14) == 0x60);
    assert!(offset_of!(TrapFrame, r15) == 0x68);
    assert!(offset_of!(TrapFrame, rax) == 0x70);
    assert!(offset_of!(TrapFrame, rip) == 0x78);
    assert!(offset_of!(TrapFrame, rsp) == 0x80);
    assert!(core::mem::size_of::<TrapFrame>() == 0x88);
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arg_accessors() {
        let mut tf = TrapFrame::new();
        for n in 0..6 {
            tf.set_arg(n, 100 + n as u64);
        }
        assert_eq!(tf.rdi, 100);
        assert_eq!(tf.rsi, 101);
        assert_eq!(tf.rdx, 102);
        assert_eq!(tf.rcx, 103);
        assert_eq!(tf.r8, 104);
        assert_eq!(tf.r9, 105);
        for n in 0..6 {
            assert_eq!(tf.arg(n), 100 + n as u64);
        }
    }

    #[test]
    #[should_panic]
    fn test_arg_out_of_range() {
        let tf = TrapFrame::new();
        let _ = tf.arg(6);
    }

    #[test]
    fn test_offsets() {
        // Mirror of the compile-time asserts, as a plain runtime check
        let tf = TrapFrame::new();
        let base = &tf as *const _ as usize;
        assert_eq!(&tf.rdi as *const _ as usize - base, 0x00);
        assert_eq!(&tf.rbx as *const _ as usize - base, 0x40);
        assert_eq!(&tf.rax as *const _ as usize - base, 0x70);
        assert_eq!(&tf.rip as *const _ as usize - base, 0x78);
        assert_eq!(&tf.rsp as *const _ as usize - base, 0x80);
    }
}
