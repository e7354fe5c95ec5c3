//! The strand scheduler
//!
//! Cooperative, one strand RUNNING per execution context. Every suspension
//! funnels through the same protocol: the strand records what should happen
//! to it in its context's pending slot, then `call_runtime` saves its
//! registers and enters `sched_entry` on the context's dedicated runtime
//! stack. Only there — with the registers provably saved — is the strand
//! requeued, left parked, or destroyed. Dispatch is the mirror image:
//! wait out `tf_busy`, transfer ownership, `pop_tf`.
//!
//! Requeueing after the switch instead of before it is what prevents a
//! second context from resuming a strand whose registers are still live in
//! the CPU.

use crate::config::RuntimeConfig;
use crate::current_arch as arch;
use crate::stack;
use crate::strand::{Strand, StrandTable};
use crate::tls;
use crate::waitset::WaitSet;

use strand_core::constants::STRAND_NONE;
use strand_core::error::{SchedError, SchedResult};
use strand_core::id::StrandId;
use strand_core::kdebug;
use strand_core::spinlock::SpinLock;
use strand_core::state::{Membership, StrandState};
use strand_core::trapframe::TrapFrame;

use std::cell::{Cell, UnsafeCell};
use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// A context's FIFO run queue; shared with wakers through the registry
pub(crate) type RunQueue = SpinLock<VecDeque<u32>>;

/// What to do with the strand that just switched away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingAction {
    Nothing,
    Yield,
    Park,
    Exit,
}

/// Per-execution-context scheduler state
///
/// One per OS thread that runs strands. Created by `sched_init_thread`,
/// leaked, and reachable from other contexts only through its run queue.
pub struct SchedContext {
    /// Index into the context registry
    id: u32,

    /// Strands ready to run on this context
    pub(crate) run_queue: Arc<RunQueue>,

    /// Dedicated stack the scheduler itself runs on
    runtime_stack: stack::Stack,

    /// 16-byte-aligned top of the runtime stack
    runtime_sp: u64,

    /// Scratch frame capturing the native caller of `sched_start`
    native_tf: UnsafeCell<TrapFrame>,

    /// Scratch frame for exiting strands; never resumed
    exit_tf: UnsafeCell<TrapFrame>,

    /// Strand that just switched away, and what to do with it
    pending: Cell<u32>,
    pending_action: Cell<PendingAction>,

    /// `spawn_main` is one-time per context
    main_spawned: Cell<bool>,
}

impl SchedContext {
    #[inline]
    fn set_pending(&self, id: StrandId, action: PendingAction) {
        self.pending.set(id.as_u32());
        self.pending_action.set(action);
    }

    #[inline]
    fn as_arg(&self) -> usize {
        self as *const SchedContext as usize
    }

    #[inline]
    fn runtime_sp(&self) -> *mut u8 {
        self.runtime_sp as *mut u8
    }
}

/// Global scheduler state
struct Sched {
    table: StrandTable,
    registry: SpinLock<Vec<Arc<RunQueue>>>,
    idle_spins: u32,
    debug: bool,
}

static SCHED: OnceLock<Sched> = OnceLock::new();

#[inline]
fn sched() -> SchedResult<&'static Sched> {
    SCHED.get().ok_or(SchedError::NotInitialized)
}

#[inline]
fn sched_ref() -> &'static Sched {
    SCHED.get().expect("scheduler not initialized")
}

/// One-time global scheduler setup. Must run before any spawn.
pub fn sched_init(config: &RuntimeConfig) -> SchedResult<()> {
    config.validate().expect("invalid runtime configuration");

    let sched = Sched {
        table: StrandTable::new(config.max_strands),
        registry: SpinLock::new(Vec::new()),
        idle_spins: config.idle_spins,
        debug: config.debug_logging,
    };
    SCHED.set(sched).map_err(|_| SchedError::AlreadyInitialized)
}

/// Per-execution-context scheduler setup
///
/// Draws the context's runtime stack from the stack cache, so
/// `stack_init_thread` must have run on this thread first.
pub fn sched_init_thread() -> SchedResult<()> {
    let sched = sched()?;
    if tls::has_context() {
        return Err(SchedError::AlreadyInitialized);
    }

    let runtime_stack = stack::alloc_stack()?;
    let runtime_sp = runtime_stack.top() as u64 & !0xF;

    let run_queue: Arc<RunQueue> = Arc::new(SpinLock::new(VecDeque::new()));
    let id = {
        let mut registry = sched.registry.lock();
        registry.push(Arc::clone(&run_queue));
        (registry.len() - 1) as u32
    };

    let ctx: &'static SchedContext = Box::leak(Box::new(SchedContext {
        id,
        run_queue,
        runtime_stack,
        runtime_sp,
        native_tf: UnsafeCell::new(TrapFrame::new()),
        exit_tf: UnsafeCell::new(TrapFrame::new()),
        pending: Cell::new(STRAND_NONE),
        pending_action: Cell::new(PendingAction::Nothing),
        main_spawned: Cell::new(false),
    }));
    tls::set_context(ctx);

    if sched.debug {
        kdebug!("context {} initialized", id);
    }
    Ok(())
}

/// Number of live strand records (all contexts)
pub fn live_strands() -> u32 {
    SCHED.get().map(|s| s.table.alloc.allocated()).unwrap_or(0)
}

// ============================================================================
// Scheduler loop (always entered on the runtime stack via call_runtime)
// ============================================================================

/// Entry point on the runtime stack after every switch away from a strand
extern "C" fn sched_entry(arg: usize) {
    // Safety: arg is a leaked &'static SchedContext, set up by this thread
    let ctx: &'static SchedContext = unsafe { &*(arg as *const SchedContext) };
    finish_previous(ctx);
    schedule(ctx)
}

/// Settle the strand that just switched away
///
/// Running on the runtime stack means the strand's registers are saved, so
/// this is the first point where requeueing or destroying it is sound.
fn finish_previous(ctx: &SchedContext) {
    let id = ctx.pending.replace(STRAND_NONE);
    let action = ctx.pending_action.replace(PendingAction::Nothing);
    if id == STRAND_NONE {
        return;
    }

    let sched = sched_ref();
    let id = StrandId::new(id);
    let th = sched.table.get(id);
    tls::clear_current();

    match action {
        PendingAction::Yield => {
            th.transfer(Membership::Running, Membership::RunQueue);
            th.clear_tf_busy();
            ctx.run_queue.lock().push_back(id.as_u32());
        }
        PendingAction::Park => {
            // Already sitting in its wait set; publishing the saved
            // registers is all that's left
            th.clear_tf_busy();
        }
        PendingAction::Exit => {
            assert!(
                !th.is_main(),
                "main strand must not exit through the trampoline"
            );
            th.transfer(Membership::Running, Membership::Free);
            // Safety: the strand is off-CPU and owned by this context
            if let Some(s) = unsafe { th.take_stack() } {
                stack::release_stack(s);
            }
            th.clear();
            sched.table.alloc.release(id);
            if sched.debug {
                kdebug!("[ctx {}] strand {} destroyed", ctx.id, id);
            }
        }
        PendingAction::Nothing => {}
    }
}

/// Pick runnable strands forever; idle-backoff when there are none
fn schedule(ctx: &SchedContext) -> ! {
    let sched = sched_ref();
    let mut idle_rounds: u32 = 0;

    loop {
        let next = ctx.run_queue.lock().pop_front();
        if let Some(raw) = next {
            dispatch(ctx, StrandId::new(raw))
        }

        // No work; a waker on another context may still push to us
        if idle_rounds < sched.idle_spins {
            idle_rounds += 1;
            for _ in 0..32 {
                core::hint::spin_loop();
            }
            std::thread::yield_now();
        } else {
            std::thread::sleep(Duration::from_micros(100));
        }
    }
}

/// Resume one strand; never returns to the caller
fn dispatch(ctx: &SchedContext, id: StrandId) -> ! {
    let sched = sched_ref();
    let th = sched.table.get(id);

    // Resume-before-save gate: the strand may still be mid-switch on
    // another context
    th.wait_tf_saved();

    th.transfer(Membership::RunQueue, Membership::Running);
    th.set_state(StrandState::Running);
    th.set_ctx(ctx.id);
    tls::set_current(id);

    if sched.debug {
        kdebug!("[ctx {}] dispatch strand {}", ctx.id, id);
    }

    // Safety: the frame was either saved by call_runtime or primed by spawn
    unsafe { arch::pop_tf(th.tf_ptr()) }
}

// ============================================================================
// Suspension points (called from strand code)
// ============================================================================

/// Voluntarily give up the CPU; the strand goes to the back of its
/// context's run queue
///
/// Outside a strand this degrades to an OS-thread yield.
pub fn yield_now() {
    let Some(ctx) = tls::context() else {
        std::thread::yield_now();
        return;
    };
    let id = tls::current_strand_id();
    if id.is_none() {
        std::thread::yield_now();
        return;
    }

    let th = sched_ref().table.get(id);
    th.set_state(StrandState::Runnable);
    th.mark_tf_busy();
    ctx.set_pending(id, PendingAction::Yield);

    // Safety: the runtime stack is dedicated to scheduler entries
    unsafe { arch::call_runtime(th.tf_ptr(), sched_entry, ctx.runtime_sp(), ctx.as_arg()) };

    // Resumed by a later dispatch
}

/// Park the current strand on a wait set until a waker moves it back
///
/// `buf` is an opaque exchange buffer the waking party may fill before the
/// wake (see `wake_one_with`). Returns the `chan_closed` flag the waker
/// left behind.
pub fn park_current(ws: &WaitSet, buf: *mut u8) -> bool {
    let ctx = tls::context().expect("park outside an execution context");
    let id = tls::current_strand_id();
    assert!(id.is_some(), "park outside a strand");

    let th = sched_ref().table.get(id);
    th.chan_buf.store(buf, Ordering::Release);
    th.chan_closed.store(false, Ordering::Relaxed);
    th.set_state(StrandState::Sleeping);
    th.mark_tf_busy();

    {
        // Membership moves under the wait-set lock; from here on a waker
        // may claim the strand, but tf_busy holds it off the CPU
        let mut waiters = ws.lock();
        th.transfer(Membership::Running, Membership::WaitSet(ws.key()));
        waiters.push_back(id);
    }

    ctx.set_pending(id, PendingAction::Park);
    // Safety: as in yield_now
    unsafe { arch::call_runtime(th.tf_ptr(), sched_entry, ctx.runtime_sp(), ctx.as_arg()) };

    // Woken: consume the park fields
    let closed = th.chan_closed.load(Ordering::Acquire);
    th.chan_buf.store(std::ptr::null_mut(), Ordering::Relaxed);
    th.chan_closed.store(false, Ordering::Relaxed);
    closed
}

/// Wake the longest-parked strand of a wait set
///
/// Atomic with respect to other wakers of the same wait set: the pop
/// happens under its lock, so no strand is woken twice.
pub fn wake_one(ws: &WaitSet, closed: bool) -> Option<StrandId> {
    wake_one_with(ws, closed, |_| {})
}

/// Wake the longest-parked strand, filling its exchange buffer first
///
/// `fill` runs before the strand becomes runnable, so the parked side reads
/// the buffer only after it is written.
pub fn wake_one_with<F: FnOnce(*mut u8)>(ws: &WaitSet, closed: bool, fill: F) -> Option<StrandId> {
    let sched = SCHED.get()?;

    let id = ws.lock().pop_front()?;
    let th = sched.table.get(id);
    th.transfer(Membership::WaitSet(ws.key()), Membership::RunQueue);

    fill(th.chan_buf.load(Ordering::Acquire));
    th.chan_closed.store(closed, Ordering::Release);
    th.set_state(StrandState::Runnable);

    enqueue_runnable(sched, th, id);
    Some(id)
}

/// Wake every strand parked on a wait set (e.g. on close). Returns how many.
pub fn wake_all(ws: &WaitSet, closed: bool) -> usize {
    let mut n = 0;
    while wake_one(ws, closed).is_some() {
        n += 1;
    }
    n
}

/// Push a runnable strand onto a run queue: the context it last ran on,
/// else the caller's, else the first registered one
fn enqueue_runnable(sched: &Sched, th: &Strand, id: StrandId) {
    let rq = {
        let registry = sched.registry.lock();
        let hint = th.ctx_id() as usize;
        if hint < registry.len() {
            Arc::clone(&registry[hint])
        } else if let Some(ctx) = tls::context() {
            Arc::clone(&ctx.run_queue)
        } else {
            Arc::clone(
                registry
                    .first()
                    .expect("no execution context registered"),
            )
        }
    };
    rq.lock().push_back(id.as_u32());
}

// ============================================================================
// Spawn / exit
// ============================================================================

/// Spawn a strand running `entry(arg)`
///
/// Fails only on resource exhaustion (records or stacks); retry policy
/// belongs to the caller.
pub fn spawn_raw(entry: extern "C" fn(usize), arg: usize) -> SchedResult<StrandId> {
    let sched = sched()?;

    let id = sched.table.alloc.allocate()?;
    let stack = match stack::alloc_stack() {
        Ok(s) => s,
        Err(e) => {
            sched.table.alloc.release(id);
            return Err(e);
        }
    };

    let th = sched.table.get(id);
    th.init(id, false);
    th.set_entry(entry as usize as u64, arg as u64);

    let sp = stack::init_for_entry(&stack, arch::exit_trampoline_addr());
    // Safety: freshly allocated record, no other context knows it yet
    unsafe {
        th.put_stack(stack);
        let tf = &mut *th.tf_ptr();
        *tf = TrapFrame::new();
        tf.rip = strand_entry as usize as u64;
        tf.rsp = sp;
        tf.set_arg(0, id.as_u32() as u64);
    }

    th.set_state(StrandState::Runnable);
    th.transfer(Membership::Free, Membership::RunQueue);
    enqueue_runnable(sched, th, id);

    if sched.debug {
        kdebug!("spawned strand {}", id);
    }
    Ok(id)
}

/// Spawn a strand running a closure
pub fn spawn<F>(f: F) -> SchedResult<StrandId>
where
    F: FnOnce() + Send + 'static,
{
    let boxed: Box<dyn FnOnce()> = Box::new(f);
    let ptr = Box::into_raw(Box::new(boxed));
    match spawn_raw(closure_entry, ptr as usize) {
        Ok(id) => Ok(id),
        Err(e) => {
            // Safety: ptr came from Box::into_raw just above and was never run
            unsafe { drop(Box::from_raw(ptr)) };
            Err(e)
        }
    }
}

/// First code a spawned strand runs, entered via `pop_tf` on its own stack
///
/// No heap allocation in here: this runs before any of the strand's own
/// frames exist, and the entry/closure words in the record are all it needs.
extern "C" fn strand_entry(id: usize) {
    let th = sched_ref().table.get(StrandId::new(id as u32));
    let (f, arg) = th.entry();
    // Safety: set by spawn_raw from a real extern "C" fn
    let f: extern "C" fn(usize) = unsafe { std::mem::transmute(f as usize) };
    f(arg as usize);
    // Returning pops the exit-trampoline sentinel written at the stack top
}

extern "C" fn closure_entry(arg: usize) {
    // Safety: spawn() stored a Box<Box<dyn FnOnce()>> here; from_raw does
    // not allocate
    let boxed: Box<Box<dyn FnOnce()>> = unsafe { Box::from_raw(arg as *mut _) };
    (*boxed)();
}

/// Exit path entered from the exit trampoline when a strand's entry returns
///
/// Still on the dying strand's stack here, so the stack cannot be released
/// yet; hop to the runtime stack first and let `finish_previous` do it.
pub extern "C" fn strand_exit() -> ! {
    let ctx = tls::context().expect("strand exit outside an execution context");
    let id = tls::current_strand_id();
    assert!(id.is_some(), "exit trampoline without a current strand");

    ctx.set_pending(id, PendingAction::Exit);
    // Safety: exit_tf is scratch, never resumed
    unsafe {
        arch::call_runtime(
            ctx.exit_tf.get(),
            sched_entry,
            ctx.runtime_sp(),
            ctx.as_arg(),
        )
    };
    unreachable!("exited strand resumed");
}

// ============================================================================
// Bootstrap
// ============================================================================

/// Run `f` as the main strand on the caller's own stack
///
/// One-time per execution context. No stack is drawn from the pool: the
/// calling context's native stack is adopted, which is why the main strand
/// is exempt from the normal exit path. Yields and parks inside `f` suspend
/// and resume it like any other strand. Returns when `f` returns; strands
/// still queued at that point keep running on later yields or under
/// `sched_start`.
pub fn spawn_main<F: FnOnce()>(f: F) -> SchedResult<()> {
    let sched = sched()?;
    let ctx = tls::context().ok_or(SchedError::NotInitialized)?;
    if ctx.main_spawned.replace(true) {
        return Err(SchedError::AlreadyInitialized);
    }

    let id = sched.table.alloc.allocate()?;
    let th = sched.table.get(id);
    th.init(id, true);
    th.transfer(Membership::Free, Membership::Running);
    th.set_state(StrandState::Running);
    th.set_ctx(ctx.id);
    tls::set_current(id);

    f();

    // Main finished on its own stack: reclaim the record, which owns no
    // pool stack by construction
    tls::clear_current();
    th.transfer(Membership::Running, Membership::Free);
    debug_assert!(!th.has_stack());
    th.clear();
    sched.table.alloc.release(id);
    Ok(())
}

/// Hand this context to the scheduler permanently
///
/// The caller of last resort once no strand is running; diverges.
pub fn sched_start() -> ! {
    let ctx = tls::context().expect("sched_init_thread() must run before sched_start()");
    assert!(!tls::in_strand(), "sched_start() called from inside a strand");

    // Safety: native_tf is scratch; nothing ever resumes it
    unsafe {
        arch::call_runtime(
            ctx.native_tf.get(),
            sched_entry,
            ctx.runtime_sp(),
            ctx.as_arg(),
        )
    };
    unreachable!("scheduler loop returned");
}

// ============================================================================
// Tests
// ============================================================================
