//! Slot allocator for strand records
//!
//! Manages allocation and deallocation of fixed-size record slots.
//! Uses a LIFO free stack so recently released slots are reused first,
//! keeping their cache lines and (for stacks) their pages hot.

use crate::error::{SchedError, SchedResult};
use crate::id::StrandId;
use crate::spinlock::SpinLock;
use core::sync::atomic::{AtomicU32, Ordering};

/// Allocator handing out record slot indices up to a fixed capacity
pub struct SlotAllocator {
    /// LIFO stack of released slot IDs
    free_stack: SpinLock<Vec<u32>>,

    /// Next never-used slot ID
    next_fresh: AtomicU32,

    /// Maximum number of slots
    max_slots: u32,

    /// Number of currently allocated slots
    allocated: AtomicU32,
}

impl SlotAllocator {
    /// Create a new slot allocator
    pub fn new(max_slots: usize) -> Self {
        Self {
            // Sized up front so release never reallocates from a strand stack
            free_stack: SpinLock::new(Vec::with_capacity(max_slots)),
            next_fresh: AtomicU32::new(0),
            max_slots: max_slots as u32,
            allocated: AtomicU32::new(0),
        }
    }

    /// Allocate a slot, preferring recently released ones
    pub fn allocate(&self) -> SchedResult<StrandId> {
        {
            let mut free = self.free_stack.lock();
            if let Some(id) = free.pop() {
                self.allocated.fetch_add(1, Ordering::Relaxed);
                return Ok(StrandId::new(id));
            }
        }

        // Free stack empty: claim a fresh slot
        loop {
            let current = self.next_fresh.load(Ordering::Acquire);
            if current >= self.max_slots {
                return Err(SchedError::NoSlotsAvailable);
            }

            match self.next_fresh.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.allocated.fetch_add(1, Ordering::Relaxed);
                    return Ok(StrandId::new(current));
                }
                Err(_) => continue,
            }
        }
    }

    /// Release a slot back to the allocator
    pub fn release(&self, id: StrandId) {
        if id.is_none() {
            return;
        }

        let mut free = self.free_stack.lock();
        free.push(id.as_u32());
        self.allocated.fetch_sub(1, Ordering::Relaxed);
    }

    /// Number of currently allocated slots
    #[inline]
    pub fn allocated(&self) -> u32 {
        self.allocated.load(Ordering::Relaxed)
    }

    /// Maximum number of slots
    #[inline]
    pub fn max_slots(&self) -> u32 {
        self.max_slots
    }

    /// Check if a slot ID is within range
    #[inline]
    pub fn is_valid(&self, id: StrandId) -> bool {
        id.is_some() && id.as_u32() < self.max_slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_sequential() {
        let alloc = SlotAllocator::new(100);

        let a = alloc.allocate().unwrap();
        let b = alloc.allocate().unwrap();
        let c = alloc.allocate().unwrap();

        assert_eq!(a.as_u32(), 0);
        assert_eq!(b.as_u32(), 1);
        assert_eq!(c.as_u32(), 2);
        assert_eq!(alloc.allocated(), 3);
    }

    #[test]
    fn test_allocate_release_reuse() {
        let alloc = SlotAllocator::new(100);

        let a = alloc.allocate().unwrap();
        let _b = alloc.allocate().unwrap();

        alloc.release(a);
        assert_eq!(alloc.allocated(), 1);

        // LIFO: the released slot comes back first
        let c = alloc.allocate().unwrap();
        assert_eq!(c, a);
        assert_eq!(alloc.allocated(), 2);
    }

    #[test]
    fn test_allocate_exhaustion() {
        let alloc = SlotAllocator::new(3);

        let _a = alloc.allocate().unwrap();
        let _b = alloc.allocate().unwrap();
        let _c = alloc.allocate().unwrap();

        let result = alloc.allocate();
        assert!(matches!(result, Err(SchedError::NoSlotsAvailable)));
    }

    #[test]
    fn test_concurrent_allocation() {
        use std::sync::Arc;
        use std::thread;

        let alloc = Arc::new(SlotAllocator::new(10_000));
        let mut handles = vec![];

        for _ in 0..4 {
            let alloc = Arc::clone(&alloc);
            handles.push(thread::spawn(move || {
                let mut ids = vec![];
                for _ in 0..1000 {
                    ids.push(alloc.allocate().unwrap());
                }
                ids
            }));
        }

        let mut all_ids: Vec<StrandId> = vec![];
        for h in handles {
            all_ids.extend(h.join().unwrap());
        }

        // 4000 unique IDs, no double allocation
        assert_eq!(all_ids.len(), 4000);
        all_ids.sort();
        all_ids.dedup();
        assert_eq!(all_ids.len(), 4000);
    }
}
