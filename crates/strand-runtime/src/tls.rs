//! Thread-local storage for the current execution context and strand

use crate::sched::SchedContext;
use std::cell::Cell;
use strand_core::constants::STRAND_NONE;
use strand_core::id::StrandId;

thread_local! {
    /// This OS thread's execution context (leaked, so 'static once set)
    static CONTEXT: Cell<*const SchedContext> = const { Cell::new(std::ptr::null()) };

    /// Strand currently running on this context
    static CURRENT: Cell<u32> = const { Cell::new(STRAND_NONE) };
}

/// Bind this OS thread to an execution context
#[inline]
pub(crate) fn set_context(ctx: &'static SchedContext) {
    CONTEXT.with(|cell| cell.set(ctx as *const SchedContext));
}

/// The execution context bound to this OS thread, if any
#[inline]
pub(crate) fn context() -> Option<&'static SchedContext> {
    let ptr = CONTEXT.with(|cell| cell.get());
    if ptr.is_null() {
        None
    } else {
        // Safety: contexts are leaked at creation and never freed
        Some(unsafe { &*ptr })
    }
}

/// Check whether this OS thread has an execution context
#[inline]
pub fn has_context() -> bool {
    CONTEXT.with(|cell| !cell.get().is_null())
}

/// Record the strand now running on this context
#[inline]
pub(crate) fn set_current(id: StrandId) {
    CURRENT.with(|cell| cell.set(id.as_u32()));
}

/// Clear the running strand (context going back to scheduling)
#[inline]
pub(crate) fn clear_current() {
    CURRENT.with(|cell| cell.set(STRAND_NONE));
}

/// The strand currently running on this context
#[inline]
pub fn current_strand_id() -> StrandId {
    StrandId::new(CURRENT.with(|cell| cell.get()))
}

/// Check whether we're executing inside a strand
#[inline]
pub fn in_strand() -> bool {
    CURRENT.with(|cell| cell.get() != STRAND_NONE)
}
