//! Context-switch throughput benchmark
//!
//! Measures the full spawn -> yield*10 -> exit cycle through the scheduler,
//! which is dominated by the call_runtime/pop_tf pair.

use criterion::{criterion_group, criterion_main, Criterion};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use strand::RuntimeConfig;

fn bench_switch(c: &mut Criterion) {
    let config = RuntimeConfig::new()
        .stack_size(32 * 1024)
        .guard_size(4096)
        .max_strands(1024)
        .max_stacks(1024);
    strand::init(config).unwrap();
    strand::init_thread().unwrap();

    strand::spawn_main(|| {
        c.bench_function("spawn_yield10_exit", |b| {
            b.iter(|| {
                let done = Arc::new(AtomicBool::new(false));
                let d = Arc::clone(&done);
                strand::spawn(move || {
                    for _ in 0..10 {
                        strand::yield_now();
                    }
                    d.store(true, Ordering::Release);
                })
                .unwrap();
                while !done.load(Ordering::Acquire) {
                    strand::yield_now();
                }
            })
        });
    })
    .unwrap();
}

criterion_group!(benches, bench_switch);
criterion_main!(benches);
