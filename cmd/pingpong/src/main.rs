//! Ping-pong over wait sets
//!
//! Two strands bounce a counter back and forth using the raw park/wake
//! protocol: the waker fills the parked side's exchange buffer before the
//! wake, and a closed-flag wake shuts the peer down. This is the protocol
//! channel implementations build on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use strand::{RuntimeConfig, WaitSet};

const ROUNDS: u64 = 100_000;

fn main() {
    strand::init(RuntimeConfig::from_env()).expect("runtime init failed");
    strand::init_thread().expect("context init failed");

    let ws_ping = Arc::new(WaitSet::new());
    let ws_pong = Arc::new(WaitSet::new());
    let done_ping = Arc::new(AtomicBool::new(false));
    let done_pong = Arc::new(AtomicBool::new(false));

    let d = Arc::clone(&done_ping);
    let dq = Arc::clone(&done_pong);
    let wp = Arc::clone(&ws_ping);
    let wq = Arc::clone(&ws_pong);
    strand::spawn_main(move || {
        // Pong: receive, increment, send back, until closed
        let ws_pong_rx = Arc::clone(&wq);
        let ws_ping_tx = Arc::clone(&wp);
        let dq2 = Arc::clone(&dq);
        strand::spawn(move || {
            loop {
                let mut token: u64 = 0;
                let closed = strand::park_current(&ws_pong_rx, &mut token as *mut u64 as *mut u8);
                if closed {
                    break;
                }
                while strand::wake_one_with(&ws_ping_tx, false, |buf| unsafe {
                    *(buf as *mut u64) = token + 1;
                })
                .is_none()
                {
                    strand::yield_now();
                }
            }
            dq2.store(true, Ordering::SeqCst);
        })
        .expect("spawn pong failed");

        // Ping: drive the token round trips
        let ws_ping_rx = Arc::clone(&wp);
        let ws_pong_tx = Arc::clone(&wq);
        let d2 = Arc::clone(&d);
        strand::spawn(move || {
            let started = std::time::Instant::now();
            let mut token: u64 = 0;
            for _ in 0..ROUNDS {
                while strand::wake_one_with(&ws_pong_tx, false, |buf| unsafe {
                    *(buf as *mut u64) = token;
                })
                .is_none()
                {
                    strand::yield_now();
                }
                let mut back: u64 = 0;
                let closed = strand::park_current(&ws_ping_rx, &mut back as *mut u64 as *mut u8);
                assert!(!closed);
                token = back;
            }
            let elapsed = started.elapsed();

            assert_eq!(token, ROUNDS);
            println!(
                "{} round trips in {:?} ({:.0} ns/round-trip)",
                ROUNDS,
                elapsed,
                elapsed.as_nanos() as f64 / ROUNDS as f64
            );

            // Shut pong down
            while strand::wake_one(&ws_pong_tx, true).is_none() {
                strand::yield_now();
            }
            d2.store(true, Ordering::SeqCst);
        })
        .expect("spawn ping failed");

        while !d.load(Ordering::SeqCst) || !dq.load(Ordering::SeqCst) {
            strand::yield_now();
        }
    })
    .expect("bootstrap failed");
}
