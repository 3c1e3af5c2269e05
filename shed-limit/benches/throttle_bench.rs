use std::hint::black_box;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::Barrier;
use std::thread;
use std::time::Instant;

use criterion::criterion_group;
use criterion::criterion_main;
use criterion::BenchmarkId;
use criterion::Criterion;

use governor::clock::QuantaClock;
use governor::Quota;
use governor::RateLimiter;

use shed_limit::AdaptiveThrottle;
use shed_limit::Context;
use shed_limit::Fault;
use shed_limit::Priority;
use shed_limit::PriorityRange;

fn bench_healthy_path(c: &mut Criterion) {
    let throttle = AdaptiveThrottle::new(PriorityRange::standard());
    let cx = Context::new();

    let mut group = c.benchmark_group("execute-healthy");
    group.bench_function("single-threaded", |b| {
        b.iter(|| {
            let _ = black_box(&throttle).execute::<(), _>(&cx, Priority::MEDIUM, |_| Ok(()));
        })
    });
    group.finish();
}

fn bench_rejection_probability(c: &mut Criterion) {
    let throttle = AdaptiveThrottle::new(PriorityRange::standard()).with_draw(|| 0.99);
    let cx = Context::new();

    // Occupy every lane so the cross-priority walk has work to do.
    for rank in 0..4u8 {
        for _ in 0..100 {
            let _ = throttle.execute::<(), _>(&cx, Priority::new(rank), |_| {
                Err(Fault::unavailable().into())
            });
        }
    }

    let mut group = c.benchmark_group("rejection-probability");
    group.bench_function("highest", |b| {
        b.iter(|| black_box(&throttle).rejection_probability(Priority::HIGH))
    });
    group.bench_function("lowest", |b| {
        b.iter(|| black_box(&throttle).rejection_probability(Priority::LOW))
    });
    group.finish();
}

fn bench_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("execute-healthy-contended");

    for threads in [2, 4, 8].iter() {
        let num_threads = *threads;
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}-threads", num_threads)),
            &num_threads,
            |b, &n| {
                b.iter_custom(|iters| {
                    let throttle = Arc::new(AdaptiveThrottle::new(PriorityRange::standard()));
                    let barrier = Arc::new(Barrier::new(n + 1));
                    let mut handles = Vec::with_capacity(n);

                    for _ in 0..n {
                        let throttle = Arc::clone(&throttle);
                        let barrier = Arc::clone(&barrier);
                        let iters_per_thread = iters / n as u64;

                        handles.push(thread::spawn(move || {
                            let cx = Context::new();
                            barrier.wait();
                            for _ in 0..iters_per_thread {
                                let _ = black_box(
                                    throttle.execute::<(), _>(&cx, Priority::MEDIUM, |_| Ok(())),
                                );
                            }
                        }));
                    }

                    barrier.wait();
                    let start = Instant::now();

                    for handle in handles {
                        let _ = handle.join();
                    }

                    start.elapsed()
                });
            },
        );
    }
    group.finish();
}

// External baseline: Governor's direct limiter, the closest widely used
// client-side gate. Not the same algorithm, but a useful yardstick for the
// per-call cost.
fn bench_governor_baseline(c: &mut Criterion) {
    let quota = Quota::per_second(NonZeroU32::new(1_000_000).unwrap());
    let clock = QuantaClock::default();
    let limiter = RateLimiter::direct_with_clock(quota, clock);

    c.bench_function("governor-direct-check", |b| {
        b.iter(|| {
            let _ = black_box(&limiter).check();
        })
    });
}

fn run_all_benches(c: &mut Criterion) {
    bench_healthy_path(c);
    bench_rejection_probability(c);
    bench_contended(c);
    bench_governor_baseline(c);
}

criterion_group!(benches, run_all_benches);
criterion_main!(benches);
