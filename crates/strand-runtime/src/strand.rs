//! Strand records and the record table
//!
//! A `Strand` pairs a trap frame with an exclusively-owned stack and the
//! bookkeeping the scheduler needs. Records live in a fixed table indexed
//! by `StrandId` and are recycled through the slot allocator; their
//! addresses are stable for the lifetime of the process, which is what lets
//! the switch assembly hold raw pointers into them.
//!
//! Cross-context discipline: a record is mutated only by the context
//! running it or, after a membership transfer, the context waking it. The
//! `owner` word makes that transfer a compare-and-swap; `tf_busy` keeps a
//! waker from resuming a strand whose registers are not yet saved.

use crate::stack::Stack;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU32, AtomicU64, AtomicU8, Ordering};
use strand_core::constants::STRAND_NONE;
use strand_core::id::StrandId;
use strand_core::slot::SlotAllocator;
use strand_core::state::{Membership, StrandState};
use strand_core::trapframe::TrapFrame;

/// The unit of cooperative scheduling
pub struct Strand {
    /// Saved registers; stale while the strand runs
    tf: UnsafeCell<TrapFrame>,

    /// Lifecycle state
    state: AtomicU8,

    /// Which container owns this record (encoded `Membership`)
    owner: AtomicU64,

    /// Set while the strand is switching away and its registers are not yet
    /// in `tf`; dispatchers spin on this before `pop_tf`
    tf_busy: AtomicBool,

    /// The main strand adopts the process stack and is never destroyed
    main_strand: AtomicBool,

    /// Entry function and argument, read by the entry trampoline
    entry_fn: AtomicU64,
    entry_arg: AtomicU64,

    /// Exclusively-owned stack; None for the main strand
    stack: UnsafeCell<Option<Stack>>,

    /// Channel-park fields, populated only while Sleeping on a wait set;
    /// the waking party consumes them
    pub chan_buf: AtomicPtr<u8>,
    pub chan_closed: AtomicBool,

    /// Context that last ran this strand (wake-target hint)
    ctx_id: AtomicU32,

    /// Self id, for diagnostics
    id: AtomicU32,
}

// Safety: all shared fields are atomics; `tf` and `stack` are only touched
// by the context that owns the record per the membership protocol.
unsafe impl Sync for Strand {}

impl Strand {
    pub(crate) const fn new() -> Self {
        Self {
            tf: UnsafeCell::new(TrapFrame::new()),
            state: AtomicU8::new(StrandState::Runnable as u8),
            owner: AtomicU64::new(0), // Membership::Free
            tf_busy: AtomicBool::new(false),
            main_strand: AtomicBool::new(false),
            entry_fn: AtomicU64::new(0),
            entry_arg: AtomicU64::new(0),
            stack: UnsafeCell::new(None),
            chan_buf: AtomicPtr::new(std::ptr::null_mut()),
            chan_closed: AtomicBool::new(false),
            ctx_id: AtomicU32::new(STRAND_NONE),
            id: AtomicU32::new(STRAND_NONE),
        }
    }

    /// Reset a freshly allocated record
    pub(crate) fn init(&self, id: StrandId, main: bool) {
        self.state.store(StrandState::Runnable as u8, Ordering::Relaxed);
        self.tf_busy.store(false, Ordering::Relaxed);
        self.main_strand.store(main, Ordering::Relaxed);
        self.entry_fn.store(0, Ordering::Relaxed);
        self.entry_arg.store(0, Ordering::Relaxed);
        self.chan_buf.store(std::ptr::null_mut(), Ordering::Relaxed);
        self.chan_closed.store(false, Ordering::Relaxed);
        self.ctx_id.store(STRAND_NONE, Ordering::Relaxed);
        self.id.store(id.as_u32(), Ordering::Relaxed);
    }

    /// Clear transient fields before the record goes back on the free list
    pub(crate) fn clear(&self) {
        self.entry_fn.store(0, Ordering::Relaxed);
        self.entry_arg.store(0, Ordering::Relaxed);
        self.chan_buf.store(std::ptr::null_mut(), Ordering::Relaxed);
        self.chan_closed.store(false, Ordering::Relaxed);
        self.main_strand.store(false, Ordering::Relaxed);
        self.id.store(STRAND_NONE, Ordering::Relaxed);
    }

    #[inline]
    pub fn id(&self) -> StrandId {
        StrandId::new(self.id.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn tf_ptr(&self) -> *mut TrapFrame {
        self.tf.get()
    }

    #[inline]
    pub fn get_state(&self) -> StrandState {
        StrandState::from(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set_state(&self, state: StrandState) {
        self.state.store(state as u8, Ordering::Release);
    }

    #[inline]
    pub fn is_main(&self) -> bool {
        self.main_strand.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_entry(&self, f: u64, arg: u64) {
        self.entry_fn.store(f, Ordering::Relaxed);
        self.entry_arg.store(arg, Ordering::Relaxed);
    }

    #[inline]
    pub fn entry(&self) -> (u64, u64) {
        (
            self.entry_fn.load(Ordering::Relaxed),
            self.entry_arg.load(Ordering::Relaxed),
        )
    }

    #[inline]
    pub fn ctx_id(&self) -> u32 {
        self.ctx_id.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_ctx(&self, ctx: u32) {
        self.ctx_id.store(ctx, Ordering::Relaxed);
    }

    /// Current container membership
    #[inline]
    pub fn membership(&self) -> Membership {
        Membership::decode(self.owner.load(Ordering::Acquire))
    }

    /// Move the record from one container to another
    ///
    /// The single-owner invariant is enforced here, not assumed: finding the
    /// record anywhere other than `from` is a fatal programming error.
    pub fn transfer(&self, from: Membership, to: Membership) {
        match self.owner.compare_exchange(
            from.encode(),
            to.encode(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {}
            Err(found) => panic!(
                "strand {}: ownership transfer {} -> {} found {}",
                self.id(),
                from,
                to,
                Membership::decode(found)
            ),
        }
    }

    /// Hand the record a stack (spawn path)
    ///
    /// # Safety
    ///
    /// Caller must be the only context touching this record.
    pub(crate) unsafe fn put_stack(&self, stack: Stack) {
        let slot = &mut *self.stack.get();
        debug_assert!(slot.is_none(), "strand already owns a stack");
        *slot = Some(stack);
    }

    /// Take the record's stack back (exit path)
    ///
    /// # Safety
    ///
    /// Caller must be the only context touching this record.
    pub(crate) unsafe fn take_stack(&self) -> Option<Stack> {
        (*self.stack.get()).take()
    }

    /// Check whether the record currently owns a stack
    pub(crate) fn has_stack(&self) -> bool {
        // Safety: read-only peek; races only with the owning context
        unsafe { (*self.stack.get()).is_some() }
    }

    // tf_busy handshake

    #[inline]
    pub fn mark_tf_busy(&self) {
        self.tf_busy.store(true, Ordering::Release);
    }

    #[inline]
    pub fn clear_tf_busy(&self) {
        self.tf_busy.store(false, Ordering::Release);
    }

    /// Spin until the strand's registers have actually been saved
    #[inline]
    pub fn wait_tf_saved(&self) {
        while self.tf_busy.load(Ordering::Acquire) {
            core::hint::spin_loop();
        }
    }
}

/// Fixed table of strand records
pub(crate) struct StrandTable {
    slots: Box<[Strand]>,
    pub alloc: SlotAllocator,
}

impl StrandTable {
    pub fn new(max_strands: usize) -> Self {
        let slots: Box<[Strand]> = (0..max_strands).map(|_| Strand::new()).collect();
        Self {
            slots,
            alloc: SlotAllocator::new(max_strands),
        }
    }

    /// Record for `id`; ids come from the allocator so this always hits
    #[inline]
    pub fn get(&self, id: StrandId) -> &Strand {
        &self.slots[id.as_usize()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_happy_path() {
        let th = Strand::new();
        th.init(StrandId::new(3), false);

        assert_eq!(th.membership(), Membership::Free);
        th.transfer(Membership::Free, Membership::RunQueue);
        th.transfer(Membership::RunQueue, Membership::Running);
        th.transfer(Membership::Running, Membership::WaitSet(0x1234));
        assert_eq!(th.membership(), Membership::WaitSet(0x1234));
        th.transfer(Membership::WaitSet(0x1234), Membership::RunQueue);
        th.transfer(Membership::RunQueue, Membership::Running);
        th.transfer(Membership::Running, Membership::Free);
    }

    #[test]
    #[should_panic(expected = "ownership transfer")]
    fn test_transfer_wrong_container_panics() {
        let th = Strand::new();
        th.init(StrandId::new(4), false);

        // Record is Free; claiming it came from a run queue must blow up
        th.transfer(Membership::RunQueue, Membership::Running);
    }

    #[test]
    fn test_tf_busy_handshake() {
        let th = Strand::new();
        th.mark_tf_busy();

        let flag = &th.tf_busy;
        assert!(flag.load(Ordering::Relaxed));
        th.clear_tf_busy();
        th.wait_tf_saved(); // returns immediately once clear
    }

    #[test]
    fn test_table_record_stability() {
        let table = StrandTable::new(16);
        let id = table.alloc.allocate().unwrap();
        let a = table.get(id) as *const Strand;
        table.alloc.release(id);
        let id2 = table.alloc.allocate().unwrap();
        assert_eq!(id, id2); // LIFO reuse
        let b = table.get(id2) as *const Strand;
        assert_eq!(a, b); // same record address
    }
}
