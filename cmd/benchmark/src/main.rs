//! Context-switch micro-benchmark
//!
//! Two strands yield back and forth; every yield is one call_runtime into
//! the scheduler plus one pop_tf out of it, so a round trip costs four
//! switches (two per strand).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use strand::RuntimeConfig;

const YIELDS_PER_STRAND: usize = 1_000_000;

fn main() {
    strand::init(RuntimeConfig::from_env()).expect("runtime init failed");
    strand::init_thread().expect("context init failed");

    let done = Arc::new(AtomicUsize::new(0));

    let d = Arc::clone(&done);
    strand::spawn_main(move || {
        let started = std::time::Instant::now();

        for _ in 0..2 {
            let d2 = Arc::clone(&d);
            strand::spawn(move || {
                for _ in 0..YIELDS_PER_STRAND {
                    strand::yield_now();
                }
                d2.fetch_add(1, Ordering::SeqCst);
            })
            .expect("spawn failed");
        }

        while d.load(Ordering::SeqCst) < 2 {
            strand::yield_now();
        }

        let elapsed = started.elapsed();
        let switches = 2 * 2 * YIELDS_PER_STRAND; // in and out, per strand
        println!(
            "{} context switches in {:?} ({:.1} ns/switch)",
            switches,
            elapsed,
            elapsed.as_nanos() as f64 / switches as f64
        );
    })
    .expect("bootstrap failed");
}
