//! Strand stress test
//!
//! Spawns a large batch of short-lived strands to exercise record and stack
//! recycling under churn. Spawn count and batch size come from the command
//! line: `stress [total] [batch]`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use strand::{kinfo, RuntimeConfig};

fn main() {
    let mut args = std::env::args().skip(1);
    let total: usize = args.next().and_then(|s| s.parse().ok()).unwrap_or(50_000);
    let batch: usize = args.next().and_then(|s| s.parse().ok()).unwrap_or(1_000);

    strand::init(RuntimeConfig::from_env()).expect("runtime init failed");
    strand::init_thread().expect("context init failed");

    println!("stress: {} strands in batches of {}", total, batch);
    let completed = Arc::new(AtomicUsize::new(0));

    let c = Arc::clone(&completed);
    strand::spawn_main(move || {
        let started = std::time::Instant::now();
        let mut spawned = 0usize;

        while spawned < total {
            let n = batch.min(total - spawned);
            for _ in 0..n {
                let c2 = Arc::clone(&c);
                strand::spawn(move || {
                    strand::yield_now();
                    c2.fetch_add(1, Ordering::SeqCst);
                })
                .expect("spawn failed");
            }
            spawned += n;

            // Drain the batch before the next one so the pool recycles
            while c.load(Ordering::SeqCst) < spawned {
                strand::yield_now();
            }
        }

        let elapsed = started.elapsed();
        kinfo!(
            "{} strands in {:?} ({:.0} strands/sec)",
            total,
            elapsed,
            total as f64 / elapsed.as_secs_f64()
        );
    })
    .expect("bootstrap failed");

    assert_eq!(completed.load(Ordering::SeqCst), total);
    println!("done; live strands: {}", strand::live_strands());
}
