//! Basic strand example
//!
//! Spawns a few strands that interleave through voluntary yields.
//!
//! # Environment Variables
//!
//! - `STRAND_LOG_LEVEL=debug` - set log level (off, error, warn, info, debug, trace)
//! - `STRAND_FLUSH_EPRINT=1` - flush debug output immediately
// STRAND_LOG_LEVEL=debug cargo run -p strand-basic

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use strand::{kdebug, kinfo, RuntimeConfig};

fn main() {
    println!("=== Strand Basic Example ===\n");

    strand::init(RuntimeConfig::from_env()).expect("runtime init failed");
    strand::init_thread().expect("context init failed");

    let completed = Arc::new(AtomicUsize::new(0));

    let c = Arc::clone(&completed);
    strand::spawn_main(move || {
        kinfo!("spawning strands...");

        for i in 1..=4 {
            let c = Arc::clone(&c);
            let id = strand::spawn(move || {
                kdebug!("[strand {}] started", i);
                for j in 0..3 {
                    kdebug!("[strand {}] iteration {}", i, j);
                    strand::yield_now();
                }
                kdebug!("[strand {}] finished", i);
                c.fetch_add(1, Ordering::SeqCst);
            })
            .expect("spawn failed");
            println!("spawned strand {} (id={})", i, id);
        }

        while c.load(Ordering::SeqCst) < 4 {
            strand::yield_now();
        }
        kinfo!("{} strand(s) completed", c.load(Ordering::SeqCst));
    })
    .expect("bootstrap failed");

    println!("\n=== Example Complete ===");
}
