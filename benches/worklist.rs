//! Microbenchmarks for the worklist implementations.
//!
//! Single-threaded push/pop cycles isolate per-operation overhead; the
//! multi-thread groups measure contention behavior of the adapter lock
//! against the chunked FIFO's staging.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::thread;

use worklist_rs::runtime::WorkerId;
use worklist_rs::worklist::{ChunkedFifo, Fifo, Lifo, Obim, Worklist};

const OPS_PER_ITER: u64 = 10_000;

fn bench_single_thread(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_thread_push_pop");
    group.throughput(Throughput::Elements(OPS_PER_ITER));
    let w = WorkerId::FIRST;

    group.bench_function("lifo", |b| {
        let wl = Lifo::<u64>::new();
        b.iter(|| {
            for v in 0..OPS_PER_ITER {
                wl.push(w, black_box(v));
            }
            while let Some(v) = wl.pop(w) {
                black_box(v);
            }
        });
    });

    group.bench_function("fifo", |b| {
        let wl = Fifo::<u64>::new();
        b.iter(|| {
            for v in 0..OPS_PER_ITER {
                wl.push(w, black_box(v));
            }
            while let Some(v) = wl.pop(w) {
                black_box(v);
            }
        });
    });

    group.bench_function("chunked", |b| {
        let wl = ChunkedFifo::<u64, 64>::new(1);
        b.iter(|| {
            for v in 0..OPS_PER_ITER {
                wl.push(w, black_box(v));
            }
            while let Some(v) = wl.pop(w) {
                black_box(v);
            }
        });
    });

    group.bench_function("obim", |b| {
        let wl = Obim::new(63, 1, |v: &u64| (*v % 64) as usize);
        b.iter(|| {
            for v in 0..OPS_PER_ITER {
                wl.push(w, black_box(v));
            }
            while let Some(v) = wl.pop(w) {
                black_box(v);
            }
        });
    });

    group.finish();
}

fn bench_contended(c: &mut Criterion) {
    const WORKERS: usize = 4;
    let mut group = c.benchmark_group("four_workers_push_pop");
    group.throughput(Throughput::Elements(OPS_PER_ITER * WORKERS as u64));

    group.bench_function("lifo", |b| {
        b.iter(|| {
            let wl = Lifo::<u64>::new();
            let wl = &wl;
            thread::scope(|s| {
                for i in 0..WORKERS {
                    s.spawn(move || {
                        let w = WorkerId::new(i);
                        for v in 0..OPS_PER_ITER {
                            wl.push(w, v);
                        }
                        for _ in 0..OPS_PER_ITER {
                            black_box(wl.pop(w));
                        }
                    });
                }
            });
        });
    });

    group.bench_function("chunked", |b| {
        b.iter(|| {
            let wl = ChunkedFifo::<u64, 64>::new(WORKERS);
            let wl = &wl;
            thread::scope(|s| {
                for i in 0..WORKERS {
                    s.spawn(move || {
                        let w = WorkerId::new(i);
                        for v in 0..OPS_PER_ITER {
                            wl.push(w, v);
                        }
                        for _ in 0..OPS_PER_ITER {
                            black_box(wl.pop(w));
                        }
                    });
                }
            });
        });
    });

    group.finish();
}

criterion_group!(benches, bench_single_thread, bench_contended);
criterion_main!(benches);
