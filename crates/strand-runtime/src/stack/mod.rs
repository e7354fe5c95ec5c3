//! Stack slab management
//!
//! All strand stacks come from one reserved slab of virtual address space.
//! Each slot is a usable area of `stack_size` bytes followed immediately by
//! a `guard_size` guard region that stays `PROT_NONE` for the life of the
//! process; the slab also begins with one leading guard region so that
//! slot 0's downward overflow faults like everyone else's (slot N's
//! overflow otherwise lands in slot N-1's guard).
//!
//! ```text
//! [guard][usable 0][guard 0][usable 1][guard 1] ...
//! ```
//!
//! Allocation is two-level: a per-execution-context `StackCache` (plain
//! LIFO vector, no synchronization) over a lock-free global pool. A cache
//! hit costs a `Vec::pop`; a miss pops the global queue; only the very
//! first use of a slot pays an `mprotect`.

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        pub(crate) use unix::*;
    } else {
        compile_error!("Unsupported platform");
    }
}

use crate::config::RuntimeConfig;
use crossbeam_queue::SegQueue;
use std::cell::RefCell;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;
use strand_core::constants::WORD_SIZE;
use strand_core::error::{MemoryError, SchedError, SchedResult};

/// Single-owner handle to one stack slot
///
/// Handles move between the pool, a cache, and a strand record; they are
/// never copied, so two live strands can never alias a slot.
pub struct Stack {
    base: NonNull<u8>,
    size: usize,
}

// Safety: a Stack is an exclusive capability to its slot; the memory it
// points to is never shared while the handle exists.
unsafe impl Send for Stack {}

impl Stack {
    /// Lowest usable address
    #[inline]
    pub fn base(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    /// One past the highest usable address (stacks grow down from here)
    #[inline]
    pub fn top(&self) -> *mut u8 {
        unsafe { self.base.as_ptr().add(self.size) }
    }

    /// Usable size in bytes
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }
}

impl std::fmt::Debug for Stack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Stack({:p}, {} bytes)", self.base, self.size)
    }
}

/// Global pool backing the per-context caches
pub struct StackPool {
    /// Start of the slab (the leading guard region)
    slab: *mut u8,

    /// Total reserved bytes
    slab_size: usize,

    /// Usable bytes per slot
    stack_size: usize,

    /// Guard bytes per slot
    guard_size: usize,

    /// Number of slots in the slab
    max_stacks: usize,

    /// Per-context cache watermark (copied from config for `StackCache`)
    cache_slots: usize,

    /// Next never-activated slot index
    next_fresh: AtomicUsize,

    /// Released slots, by usable-base address
    free: SegQueue<usize>,
}

// Safety: slab bookkeeping is immutable after construction; the mutable
// parts (next_fresh, free) are themselves thread-safe.
unsafe impl Send for StackPool {}
unsafe impl Sync for StackPool {}

impl StackPool {
    /// Reserve the slab and build an empty pool
    pub fn new(config: &RuntimeConfig) -> SchedResult<Self> {
        let slot = config
            .stack_size
            .checked_add(config.guard_size)
            .ok_or(MemoryError::TooManyStacks)?;
        let slab_size = config
            .max_stacks
            .checked_mul(slot)
            .and_then(|n| n.checked_add(config.guard_size))
            .ok_or(MemoryError::TooManyStacks)?;

        let slab = reserve_slab(slab_size)?;

        Ok(Self {
            slab,
            slab_size,
            stack_size: config.stack_size,
            guard_size: config.guard_size,
            max_stacks: config.max_stacks,
            cache_slots: config.stack_cache,
            next_fresh: AtomicUsize::new(0),
            free: SegQueue::new(),
        })
    }

    #[inline]
    fn slot_size(&self) -> usize {
        self.stack_size + self.guard_size
    }

    /// Usable base address of slot `i`
    #[inline]
    fn usable_base(&self, i: usize) -> *mut u8 {
        debug_assert!(i < self.max_stacks);
        unsafe { self.slab.add(self.guard_size + i * self.slot_size()) }
    }

    /// Take a stack: recycled slot first, else activate a fresh one
    pub fn take(&self) -> SchedResult<Stack> {
        if let Some(addr) = self.free.pop() {
            // Safety: addresses in the queue came from usable_base()
            let base = unsafe { NonNull::new_unchecked(addr as *mut u8) };
            return Ok(Stack { base, size: self.stack_size });
        }

        // Carve a fresh slot
        loop {
            let current = self.next_fresh.load(Ordering::Acquire);
            if current >= self.max_stacks {
                return Err(SchedError::StackExhausted);
            }
            if self
                .next_fresh
                .compare_exchange_weak(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                continue;
            }

            let base = self.usable_base(current);
            // Guard regions stay PROT_NONE; only the usable range opens up
            activate(base, self.stack_size)?;
            return Ok(Stack {
                base: unsafe { NonNull::new_unchecked(base) },
                size: self.stack_size,
            });
        }
    }

    /// Return a stack to the pool. Contents are left as-is.
    pub fn give(&self, stack: Stack) {
        self.free.push(stack.base() as usize);
    }

    /// Number of slots carved from the slab so far
    pub fn carved(&self) -> usize {
        self.next_fresh.load(Ordering::Relaxed).min(self.max_stacks)
    }

    /// Check whether `addr` falls in one of the slab's guard regions
    ///
    /// Used by the fault handler to tell a stack overflow apart from an
    /// unrelated memory fault. Async-signal-safe: reads only immutable
    /// fields.
    pub fn addr_in_guard(&self, addr: usize) -> bool {
        let start = self.slab as usize;
        if addr < start || addr >= start + self.slab_size {
            return false;
        }
        let off = addr - start;
        if off < self.guard_size {
            return true; // leading guard
        }
        (off - self.guard_size) % self.slot_size() >= self.stack_size
    }

    /// Check whether `addr` falls anywhere in the slab
    pub fn addr_in_slab(&self, addr: usize) -> bool {
        let start = self.slab as usize;
        addr >= start && addr < start + self.slab_size
    }
}

/// Per-execution-context stack cache
///
/// Plain LIFO over the global pool: the most recently released stack has
/// the hottest pages and comes back first. Not synchronized; one cache per
/// context.
pub struct StackCache {
    pool: &'static StackPool,
    free: Vec<Stack>,
    capacity: usize,
}

impl StackCache {
    pub fn new(pool: &'static StackPool) -> Self {
        let capacity = pool.cache_slots;
        Self {
            pool,
            free: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Allocate a stack in O(1) amortized time
    pub fn alloc(&mut self) -> SchedResult<Stack> {
        if let Some(stack) = self.free.pop() {
            return Ok(stack);
        }
        self.pool.take()
    }

    /// Release a stack; spills half the cache to the pool when full
    pub fn release(&mut self, stack: Stack) {
        if self.free.len() >= self.capacity {
            for s in self.free.drain(..self.capacity / 2) {
                self.pool.give(s);
            }
        }
        self.free.push(stack);
    }

    /// Number of cached stacks
    pub fn cached(&self) -> usize {
        self.free.len()
    }
}

impl Drop for StackCache {
    fn drop(&mut self) {
        // A context that does go away hands its cached slots back
        for s in self.free.drain(..) {
            self.pool.give(s);
        }
    }
}

/// Prime a fresh stack for first entry
///
/// Writes the exit-trampoline address into the top word of the usable area
/// and returns the initial stack pointer, which sits just below it. At that
/// value `rsp % 16 == 8`, the state a function entered by `call` expects,
/// so vector-register spills in the entry function stay aligned. Prepares
/// state only; performs no control transfer.
pub fn init_for_entry(stack: &Stack, exit_fn: usize) -> u64 {
    let top = stack.top() as u64;
    let sp = top - WORD_SIZE as u64;
    debug_assert_eq!(sp % 16, 8, "initial rsp violates the call alignment contract");
    unsafe {
        *(sp as *mut u64) = exit_fn as u64;
    }
    sp
}

// ============================================================================
// Global pool + per-context cache
// ============================================================================

static POOL: OnceLock<StackPool> = OnceLock::new();

thread_local! {
    static CACHE: RefCell<Option<StackCache>> = const { RefCell::new(None) };
}

/// One-time global setup: reserve the slab and install the guard-fault
/// handler. Must run before any `stack_init_thread`.
pub fn stack_init(config: &RuntimeConfig) -> SchedResult<()> {
    let pool = StackPool::new(config)?;
    POOL.set(pool)
        .map_err(|_| SchedError::AlreadyInitialized)?;
    crate::fault::install_guard_fault_handler()?;
    Ok(())
}

/// Per-execution-context setup of the local stack cache
pub fn stack_init_thread() -> SchedResult<()> {
    let pool = POOL.get().ok_or(SchedError::NotInitialized)?;
    crate::fault::install_thread_sigstack();
    CACHE.with(|c| {
        let mut cache = c.borrow_mut();
        if cache.is_some() {
            return Err(SchedError::AlreadyInitialized);
        }
        *cache = Some(StackCache::new(pool));
        Ok(())
    })
}

/// Allocate a stack from this context's cache
pub fn alloc_stack() -> SchedResult<Stack> {
    CACHE.with(|c| {
        c.borrow_mut()
            .as_mut()
            .ok_or(SchedError::NotInitialized)?
            .alloc()
    })
}

/// Release a stack to this context's cache (or straight to the pool when
/// called off-context)
pub fn release_stack(stack: Stack) {
    CACHE.with(|c| {
        if let Some(cache) = c.borrow_mut().as_mut() {
            cache.release(stack);
        } else if let Some(pool) = POOL.get() {
            pool.give(stack);
        }
        // No pool at all: the slab is gone, drop the handle
    });
}

/// The global pool, if initialized
pub fn pool() -> Option<&'static StackPool> {
    POOL.get()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config(max_stacks: usize) -> RuntimeConfig {
        RuntimeConfig::new()
            .stack_size(16 * 1024)
            .guard_size(4096)
            .max_stacks(max_stacks)
    }

    #[test]
    fn test_initial_sp_alignment() {
        let pool = StackPool::new(&small_config(4)).unwrap();
        let stack = pool.take().unwrap();

        let sp = init_for_entry(&stack, 0xABCD_EF00);
        assert_eq!(sp % 16, 8);
        assert_eq!(sp, stack.top() as u64 - 8);

        // The sentinel landed in the top word
        let sentinel = unsafe { *(sp as *const u64) };
        assert_eq!(sentinel, 0xABCD_EF00);
    }

    #[test]
    fn test_no_overlap() {
        let pool = StackPool::new(&small_config(8)).unwrap();

        let stacks: Vec<Stack> = (0..8).map(|_| pool.take().unwrap()).collect();
        let mut ranges: Vec<(usize, usize)> = stacks
            .iter()
            .map(|s| (s.base() as usize, s.top() as usize))
            .collect();
        ranges.sort();

        for pair in ranges.windows(2) {
            assert!(pair[0].1 <= pair[1].0, "stack ranges overlap: {:?}", pair);
        }
    }

    #[test]
    fn test_usable_area_writable() {
        let pool = StackPool::new(&small_config(2)).unwrap();
        let stack = pool.take().unwrap();

        unsafe {
            // Both ends of the usable range
            *stack.base() = 0xAA;
            *(stack.top().sub(1)) = 0xBB;
            assert_eq!(*stack.base(), 0xAA);
            assert_eq!(*(stack.top().sub(1)), 0xBB);
        }
    }

    #[test]
    fn test_exhaustion() {
        let pool = StackPool::new(&small_config(2)).unwrap();

        let _a = pool.take().unwrap();
        let _b = pool.take().unwrap();
        assert!(matches!(pool.take(), Err(SchedError::StackExhausted)));
    }

    #[test]
    fn test_pool_recycles() {
        let pool = StackPool::new(&small_config(1)).unwrap();

        let a = pool.take().unwrap();
        let base = a.base() as usize;
        pool.give(a);

        let b = pool.take().unwrap();
        assert_eq!(b.base() as usize, base);
    }

    #[test]
    fn test_cache_lifo() {
        let pool: &'static StackPool =
            Box::leak(Box::new(StackPool::new(&small_config(4)).unwrap()));
        let mut cache = StackCache::new(pool);

        let a = cache.alloc().unwrap();
        let b = cache.alloc().unwrap();
        let a_base = a.base() as usize;
        let b_base = b.base() as usize;

        cache.release(a);
        cache.release(b);
        assert_eq!(cache.cached(), 2);

        // Most recently released comes back first
        assert_eq!(cache.alloc().unwrap().base() as usize, b_base);
        assert_eq!(cache.alloc().unwrap().base() as usize, a_base);
    }

    #[test]
    fn test_guard_classification() {
        let cfg = small_config(3);
        let pool = StackPool::new(&cfg).unwrap();
        let stack = pool.take().unwrap();

        let top = stack.top() as usize;
        let base = stack.base() as usize;

        // One word past the usable area is guard
        assert!(pool.addr_in_guard(top));
        assert!(pool.addr_in_guard(top + cfg.guard_size - 1));
        // The leading guard protects slot 0's underflow
        assert!(pool.addr_in_guard(base - 1));
        // The usable area is not guard
        assert!(!pool.addr_in_guard(base));
        assert!(!pool.addr_in_guard(top - 8));
        // Far away is not even in the slab
        assert!(!pool.addr_in_guard(0x1000));
        assert!(!pool.addr_in_slab(0x1000));
    }
}
