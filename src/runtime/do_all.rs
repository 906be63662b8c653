//! Non-speculative bulk map with optional work stealing.
//!
//! `do_all` partitions its items round-robin across per-worker deques and
//! invokes the operator exactly once per item. There is no context and no
//! pushing: the item set is fixed at the call. When stealing is enabled, a
//! worker whose own partition empties takes items from randomized victims,
//! which absorbs skew from operators with uneven cost.
//!
//! The deques are Chase-Lev (`crossbeam_deque`): the owner pops its own
//! queue cheaply; thieves take from the other end. Victim order is driven
//! by each worker's forked RNG stream, so a fixed seed gives a fixed steal
//! pattern on a fixed worker count.
//!
//! Workers never block: all work exists up front, so a worker exits once
//! its own deque and every victim probe come up empty.

use std::time::Instant;

use crossbeam_deque::{Steal, Stealer, Worker as Deque};

use super::config::{LoopConfig, Runtime};
use super::metrics::{LoopMetrics, LoopReport};
use super::rng::XorShift64;

impl Runtime {
    /// Apply `op` to every item exactly once, in parallel.
    pub fn do_all<T, Op>(&self, cfg: &LoopConfig, items: Vec<T>, op: Op) -> LoopReport
    where
        T: Send,
        Op: Fn(T) + Sync,
    {
        cfg.validate();
        let start = Instant::now();
        let workers = self.workers();

        let locals: Vec<Deque<T>> = (0..workers).map(|_| Deque::new_fifo()).collect();
        let stealers: Vec<Stealer<T>> = locals.iter().map(Deque::stealer).collect();
        for (i, item) in items.into_iter().enumerate() {
            locals[i % workers].push(item);
        }

        let op = &op;
        let stealers = &stealers;

        let per_worker: Vec<LoopMetrics> = std::thread::scope(|s| {
            let handles: Vec<_> = locals
                .into_iter()
                .enumerate()
                .map(|(i, local)| {
                    let steal = cfg.steal;
                    let mut rng = XorShift64::new(self.worker_seed(i));
                    s.spawn(move || {
                        let mut m = LoopMetrics::default();
                        loop {
                            while let Some(item) = local.pop() {
                                m.pops += 1;
                                m.committed += 1;
                                op(item);
                            }
                            if !steal || workers == 1 {
                                break;
                            }
                            match steal_once(i, stealers, &mut rng, &mut m) {
                                Some(item) => {
                                    m.pops += 1;
                                    m.committed += 1;
                                    op(item);
                                }
                                None => break,
                            }
                        }
                        m
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("worker thread panicked"))
                .collect()
        });

        LoopReport::merge(&cfg.name, workers, start.elapsed(), &per_worker)
    }
}

/// One randomized sweep over the victims. `Retry` means the victim's owner
/// raced us; spin on that victim until the answer is definitive.
fn steal_once<T>(
    me: usize,
    stealers: &[Stealer<T>],
    rng: &mut XorShift64,
    m: &mut LoopMetrics,
) -> Option<T> {
    let n = stealers.len();
    let offset = rng.next_usize(n);
    for k in 0..n {
        let victim = (offset + k) % n;
        if victim == me {
            continue;
        }
        m.steal_attempts += 1;
        loop {
            match stealers[victim].steal() {
                Steal::Success(item) => {
                    m.steal_successes += 1;
                    return Some(item);
                }
                Steal::Retry => std::hint::spin_loop(),
                Steal::Empty => break,
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn rt(workers: usize) -> Runtime {
        Runtime::with_seed(workers, 999)
    }

    #[test]
    fn every_item_runs_exactly_once() {
        let hits: Vec<AtomicUsize> = (0..5000).map(|_| AtomicUsize::new(0)).collect();
        let hits = &hits;
        let report = rt(4).do_all(&LoopConfig::named("map"), (0..5000usize).collect(), |i| {
            hits[i].fetch_add(1, Ordering::Relaxed);
        });
        assert!(hits.iter().all(|h| h.load(Ordering::Relaxed) == 1));
        assert_eq!(report.committed, 5000);
    }

    #[test]
    fn skewed_cost_is_absorbed_by_stealing() {
        // All expensive items land on worker 0's partition; stealing moves
        // some of them elsewhere.
        let done = AtomicUsize::new(0);
        let report = rt(4).do_all(
            &LoopConfig::named("skew"),
            (0..64usize).collect(),
            |item| {
                if item % 4 == 0 {
                    std::thread::sleep(std::time::Duration::from_millis(1));
                }
                done.fetch_add(1, Ordering::Relaxed);
            },
        );
        assert_eq!(done.load(Ordering::Relaxed), 64);
        assert!(report.steal_attempts > 0);
    }

    #[test]
    fn steal_disabled_still_runs_everything() {
        let done = AtomicUsize::new(0);
        let cfg = LoopConfig {
            steal: false,
            ..LoopConfig::named("nosteal")
        };
        let report = rt(4).do_all(&cfg, (0..1000usize).collect(), |_| {
            done.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(done.load(Ordering::Relaxed), 1000);
        assert_eq!(report.steal_attempts, 0);
    }

    #[test]
    fn single_worker_preserves_item_order() {
        let seen = Mutex::new(Vec::new());
        rt(1).do_all(&LoopConfig::named("ordered"), (0..100u32).collect(), |i| {
            seen.lock().unwrap().push(i);
        });
        assert_eq!(*seen.lock().unwrap(), (0..100).collect::<Vec<_>>());
    }
}
