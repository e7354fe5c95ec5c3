//! End-to-end lifecycle tests
//!
//! These tests make exact assertions about global record counts, so this
//! file runs as its own process and serializes its tests on a mutex. Each
//! scenario gets a dedicated OS thread (and therefore a fresh execution
//! context) regardless of how the harness schedules tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once, OnceLock};
use strand::{RuntimeConfig, SchedError};

const MAX_STRANDS: usize = 64;

fn serial() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|e| e.into_inner())
}

/// Init the runtime once, then run `f` on a fresh context thread
fn run_in_context<F: FnOnce() + Send + 'static>(f: F) {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        // More stacks than records: every context takes a runtime stack,
        // and record capacity is what these tests assert on.
        let config = RuntimeConfig::new()
            .stack_size(32 * 1024)
            .guard_size(4096)
            .max_strands(MAX_STRANDS)
            .max_stacks(256);
        strand::init(config).unwrap();
    });

    std::thread::spawn(move || {
        strand::init_thread().unwrap();
        f();
    })
    .join()
    .unwrap();
}

#[test]
fn sentinel_scenario_destroys_both_strands() {
    let _guard = serial();

    let shared = Arc::new(AtomicUsize::new(0));
    let s = Arc::clone(&shared);
    run_in_context(move || {
        assert_eq!(strand::live_strands(), 0);
        let done = Arc::new(AtomicUsize::new(0));

        let s_main = Arc::clone(&s);
        let d_main = Arc::clone(&done);
        strand::spawn_main(move || {
            // Main strand is live
            assert_eq!(strand::live_strands(), 1);

            let s1 = Arc::clone(&s_main);
            let d1 = Arc::clone(&d_main);
            strand::spawn(move || {
                s1.store(1, Ordering::SeqCst);
                strand::yield_now();
                s1.store(2, Ordering::SeqCst);
                d1.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

            let s2 = Arc::clone(&s_main);
            let d2 = Arc::clone(&d_main);
            strand::spawn(move || {
                assert_eq!(s2.load(Ordering::SeqCst), 1);
                strand::yield_now();
                assert_eq!(s2.load(Ordering::SeqCst), 2);
                d2.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

            assert_eq!(strand::live_strands(), 3);

            while d_main.load(Ordering::SeqCst) < 2 {
                strand::yield_now();
            }
            // Cooperative single context: once both closures finished,
            // their exit paths have run and their records and stacks are
            // reclaimed
            assert_eq!(strand::live_strands(), 1);
        })
        .unwrap();

        assert_eq!(strand::live_strands(), 0);
    });

    assert_eq!(shared.load(Ordering::SeqCst), 2);
}

#[test]
fn spawn_capacity_is_enforced() {
    let _guard = serial();

    let ran = Arc::new(AtomicUsize::new(0));
    let r = Arc::clone(&ran);
    run_in_context(move || {
        assert_eq!(strand::live_strands(), 0);

        let r_main = Arc::clone(&r);
        strand::spawn_main(move || {
            let mut spawned = 0usize;
            let err = loop {
                let r2 = Arc::clone(&r_main);
                match strand::spawn(move || {
                    r2.fetch_add(1, Ordering::SeqCst);
                }) {
                    Ok(_) => spawned += 1,
                    Err(e) => break e,
                }
            };

            // Main holds one record; every remaining slot was handed out,
            // and the spawn past the limit failed cleanly instead of
            // corrupting anything
            assert_eq!(spawned, MAX_STRANDS - 1);
            assert_eq!(err, SchedError::NoSlotsAvailable);
            assert_eq!(strand::live_strands() as usize, MAX_STRANDS);

            while r_main.load(Ordering::SeqCst) < spawned {
                strand::yield_now();
            }
        })
        .unwrap();

        assert_eq!(strand::live_strands(), 0);
    });

    assert_eq!(ran.load(Ordering::SeqCst), MAX_STRANDS - 1);
}

#[test]
fn main_bootstrap_owns_no_pool_stack() {
    let _guard = serial();

    run_in_context(|| {
        assert_eq!(strand::live_strands(), 0);
        strand::spawn_main(|| {
            assert!(strand::is_in_strand());
            assert!(strand::current_id().is_some());
            // Suspend and resume on the adopted native stack
            strand::yield_now();
            strand::yield_now();
        })
        .unwrap();

        // Main's record is reclaimed on return; nothing was drawn from or
        // returned to the stack pool on its behalf
        assert_eq!(strand::live_strands(), 0);
        assert!(!strand::is_in_strand());
    });
}

#[test]
fn park_wake_pairs_with_channel_fields() {
    let _guard = serial();

    let got = Arc::new(AtomicUsize::new(0));
    let g = Arc::clone(&got);
    run_in_context(move || {
        let ws = Arc::new(strand::WaitSet::new());

        let ws_main = Arc::clone(&ws);
        let g_main = Arc::clone(&g);
        strand::spawn_main(move || {
            let ws2 = Arc::clone(&ws_main);
            let g2 = Arc::clone(&g_main);
            strand::spawn(move || {
                let mut slot: u64 = 0;
                let closed = strand::park_current(&ws2, &mut slot as *mut u64 as *mut u8);
                assert!(!closed);
                g2.store(slot as usize, Ordering::SeqCst);
            })
            .unwrap();

            while ws_main.is_empty() {
                strand::yield_now();
            }
            strand::wake_one_with(&ws_main, false, |buf| unsafe {
                *(buf as *mut u64) = 7070;
            });

            while g_main.load(Ordering::SeqCst) == 0 {
                strand::yield_now();
            }
        })
        .unwrap();

        assert_eq!(strand::live_strands(), 0);
    });

    assert_eq!(got.load(Ordering::SeqCst), 7070);
}
