//! Speculative parallel loop over a worklist.
//!
//! # Per-item state machine
//!
//! ```text
//!   pending ──pop──► running ──Ok──────► committed (ctx pushes flush)
//!                       │
//!                       └──Err(Abort)──► aborted ──W.aborted──► pending
//!                       └──Err(Fatal)──► loop stops, first error returned
//! ```
//!
//! The operator receives each item by reference plus a [`UserContext`].
//! Context pushes are buffered for the invocation's lifetime and flushed to
//! the worklist only when the operator returns `Ok` — the commit point.
//! An abort discards the buffer and re-queues the item through
//! `Worklist::aborted`, which may bias re-delivery toward the same worker.
//!
//! # Termination detection
//!
//! A shared idle-worker count plus a best-effort emptiness re-check. A
//! worker that finds no work registers idle and keeps polling; it
//! de-registers *before* attempting another pop, so any worker holding an
//! item is always counted as busy. When a worker observes every worker
//! idle and its own view empty, every remaining item would have to be in
//! the shared structures its emptiness check covers — so the loop is done,
//! and the observer raises the stop flag for everyone.
//!
//! # Parallel break
//!
//! [`UserContext::break_loop`] requests early termination: each worker
//! finishes its current operator invocation and exits without draining.
//! Remaining items stay in the worklist for the caller's next phase (the
//! max-flow application re-seeds after its global relabel this way).
//!
//! # Stealing
//!
//! When [`LoopConfig::steal`] is set and the worklist reports
//! `can_steal()`, a worker whose pop comes up empty probes
//! `Worklist::steal` before going idle. None of the worklists in
//! [`crate::worklist`] opts into the capability (their `can_steal` is the
//! trait default `false`), so on those the toggle has no effect in this
//! driver; it engages only for caller-supplied worklists that implement
//! the stealing pair. `do_all` distributes work through its own stealing
//! deques regardless.
//!
//! # Panics
//!
//! An operator panic propagates out of the loop on join, after the
//! remaining workers notice the stop flag; counters may undercount that
//! loop's work.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use crate::worklist::Worklist;

use super::config::{LoopConfig, Runtime};
use super::idle::TieredIdle;
use super::metrics::{LoopMetrics, LoopReport};
use super::worker_id::WorkerId;

/// Operator outcome for one item.
///
/// `Abort` re-queues the item for retry and never propagates out of the
/// loop; `Fatal` stops the whole loop, which returns the first such error.
#[derive(Debug)]
pub enum OpError<E = core::convert::Infallible> {
    /// Speculative rollback: discard this invocation's pushes, retry the
    /// item later.
    Abort,
    /// Unrecoverable: stop the loop and surface the error to the caller.
    Fatal(E),
}

/// Per-invocation context handed to `for_each` operators.
///
/// Lives for exactly one operator invocation; pushes buffered here flush
/// to the worklist at the commit point.
pub struct UserContext<'a, T> {
    worker: WorkerId,
    pushes: &'a mut Vec<T>,
    break_flag: &'a AtomicBool,
}

impl<T> UserContext<'_, T> {
    /// Buffer a new item; it becomes visible only if this invocation
    /// commits.
    #[inline]
    pub fn push(&mut self, v: T) {
        self.pushes.push(v);
    }

    /// The worker running this invocation.
    #[inline]
    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    /// Request early loop termination. Workers finish their current
    /// invocation, then exit without draining the worklist.
    #[inline]
    pub fn break_loop(&self) {
        self.break_flag.store(true, Ordering::Release);
    }
}

impl Runtime {
    /// Run `op` speculatively over `initial` and everything it pushes.
    ///
    /// Seeds `wl` via `fill_initial`, spawns one thread per worker, and
    /// drains until the worklist is empty, an operator returns
    /// `Err(Fatal)`, or [`UserContext::break_loop`] is raised. The
    /// worklist is borrowed, not consumed: after a break, un-drained items
    /// are still in it.
    ///
    /// # Errors
    ///
    /// The first `Fatal` error any worker observed. `Abort` outcomes are
    /// not errors; they re-queue the item and show up in the report's
    /// `aborted` counter.
    pub fn for_each<T, W, Op, E>(
        &self,
        cfg: &LoopConfig,
        wl: &mut W,
        initial: Vec<T>,
        op: Op,
    ) -> Result<LoopReport, E>
    where
        T: Send,
        W: Worklist<T>,
        Op: Fn(&T, &mut UserContext<'_, T>) -> Result<(), OpError<E>> + Sync,
        E: Send,
    {
        cfg.validate();
        let start = Instant::now();
        let workers = self.workers();

        wl.fill_initial(initial);
        let wl: &W = wl;

        let stop = AtomicBool::new(false);
        let break_flag = AtomicBool::new(false);
        let idle_workers = AtomicUsize::new(0);
        let first_fatal: Mutex<Option<E>> = Mutex::new(None);

        let op = &op;
        let stop_ref = &stop;
        let break_ref = &break_flag;
        let idle_ref = &idle_workers;
        let fatal_ref = &first_fatal;

        let per_worker: Vec<LoopMetrics> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..workers)
                .map(|i| {
                    let spin = cfg.spin_iters;
                    let steal = cfg.steal;
                    s.spawn(move || {
                        run_worker(
                            WorkerId::new(i),
                            workers,
                            wl,
                            op,
                            spin,
                            steal,
                            stop_ref,
                            break_ref,
                            idle_ref,
                            fatal_ref,
                        )
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("worker thread panicked"))
                .collect()
        });

        if let Some(e) = first_fatal.into_inner().expect("fatal mutex poisoned") {
            return Err(e);
        }
        Ok(LoopReport::merge(
            &cfg.name,
            workers,
            start.elapsed(),
            &per_worker,
        ))
    }
}

#[allow(clippy::too_many_arguments)]
fn run_worker<T, W, Op, E>(
    w: WorkerId,
    workers: usize,
    wl: &W,
    op: &Op,
    spin_iters: u32,
    steal: bool,
    stop: &AtomicBool,
    break_flag: &AtomicBool,
    idle_workers: &AtomicUsize,
    first_fatal: &Mutex<Option<E>>,
) -> LoopMetrics
where
    T: Send,
    W: Worklist<T>,
    Op: Fn(&T, &mut UserContext<'_, T>) -> Result<(), OpError<E>> + Sync,
{
    // Raise the stop flag on any exit path, unwinding included: a worker
    // that dies must not leave its siblings polling forever. Normal exits
    // have already set or observed the flag, so the extra store is free.
    struct StopGuard<'a>(&'a AtomicBool);
    impl Drop for StopGuard<'_> {
        fn drop(&mut self) {
            self.0.store(true, Ordering::Release);
        }
    }
    let _stop_on_exit = StopGuard(stop);

    let mut m = LoopMetrics::default();
    let mut idle = TieredIdle::new(spin_iters);
    let mut pushes: Vec<T> = Vec::new();
    let mut is_idle = false;

    loop {
        if stop.load(Ordering::Acquire) {
            break;
        }

        // De-register from the idle count before taking work, so a worker
        // holding an item is always counted busy by the termination check.
        if is_idle {
            idle_workers.fetch_sub(1, Ordering::SeqCst);
            is_idle = false;
        }

        let item = wl.pop(w).or_else(|| {
            if steal && wl.can_steal() {
                m.steal_attempts += 1;
                let stolen = wl.steal(w);
                if stolen.is_some() {
                    m.steal_successes += 1;
                }
                stolen
            } else {
                None
            }
        });

        let Some(item) = item else {
            idle.on_idle();
            idle_workers.fetch_add(1, Ordering::SeqCst);
            is_idle = true;

            // All workers idle and this view empty: any remaining item
            // would be visible to the emptiness check, so there is none.
            if idle_workers.load(Ordering::SeqCst) == workers && wl.empty(w) {
                stop.store(true, Ordering::Release);
                break;
            }
            continue;
        };

        idle.on_work();
        m.pops += 1;

        debug_assert!(pushes.is_empty());
        let mut ctx = UserContext {
            worker: w,
            pushes: &mut pushes,
            break_flag,
        };

        match op(&item, &mut ctx) {
            Ok(()) => {
                // Commit point: buffered pushes become visible.
                for v in pushes.drain(..) {
                    wl.push(w, v);
                    m.pushes += 1;
                }
                m.committed += 1;
            }
            Err(OpError::Abort) => {
                pushes.clear();
                wl.aborted(w, item);
                m.aborted += 1;
            }
            Err(OpError::Fatal(e)) => {
                pushes.clear();
                let mut slot = first_fatal.lock().expect("fatal mutex poisoned");
                if slot.is_none() {
                    *slot = Some(e);
                }
                drop(slot);
                stop.store(true, Ordering::Release);
                break;
            }
        }

        if break_flag.load(Ordering::Acquire) {
            stop.store(true, Ordering::Release);
            break;
        }
    }

    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worklist::{ChunkedFifo, Fifo, Lifo};
    use std::sync::atomic::{AtomicU32, AtomicUsize};

    fn rt(workers: usize) -> Runtime {
        Runtime::with_seed(workers, 12345)
    }

    #[test]
    fn runs_each_seed_exactly_once_when_nothing_pushes() {
        let executed = AtomicUsize::new(0);
        let mut wl = ChunkedFifo::<u32, 8>::new(4);
        let report = rt(4)
            .for_each::<_, _, _, core::convert::Infallible>(
                &LoopConfig::named("seeds"),
                &mut wl,
                (0..1000).collect(),
                |_, _| {
                    executed.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                },
            )
            .unwrap();
        assert_eq!(executed.load(Ordering::Relaxed), 1000);
        assert_eq!(report.committed, 1000);
        assert_eq!(report.aborted, 0);
    }

    #[test]
    fn context_pushes_are_executed() {
        // Each seed n pushes n children; total = seeds + sum(n).
        let executed = AtomicUsize::new(0);
        let mut wl = ChunkedFifo::<u64, 16>::new(4);
        let report = rt(4)
            .for_each::<_, _, _, core::convert::Infallible>(
                &LoopConfig::named("fanout"),
                &mut wl,
                vec![100, 200, 0],
                |&item, ctx| {
                    executed.fetch_add(1, Ordering::Relaxed);
                    for _ in 0..item {
                        ctx.push(0);
                    }
                    Ok(())
                },
            )
            .unwrap();
        assert_eq!(executed.load(Ordering::Relaxed), 3 + 300);
        assert_eq!(report.pushes, 300);
    }

    #[test]
    fn aborted_items_are_retried_until_they_commit() {
        let first_attempt = AtomicBool::new(true);
        let a_commits = AtomicU32::new(0);
        let b_commits = AtomicU32::new(0);
        let a_aborts = AtomicU32::new(0);

        let mut wl = ChunkedFifo::<char, 4>::new(2);
        let report = rt(2)
            .for_each::<_, _, _, core::convert::Infallible>(
                &LoopConfig::named("abort-retry"),
                &mut wl,
                vec!['a', 'b'],
                |&item, _ctx| match item {
                    'a' if first_attempt.swap(false, Ordering::SeqCst) => {
                        a_aborts.fetch_add(1, Ordering::SeqCst);
                        Err(OpError::Abort)
                    }
                    'a' => {
                        a_commits.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                    _ => {
                        b_commits.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                },
            )
            .unwrap();

        assert_eq!(a_commits.load(Ordering::SeqCst), 1);
        assert_eq!(b_commits.load(Ordering::SeqCst), 1);
        assert!(a_aborts.load(Ordering::SeqCst) >= 1);
        assert_eq!(report.committed, 2);
        assert!(report.aborted >= 1);
        assert!(wl.empty(WorkerId::FIRST));
    }

    #[test]
    fn abort_discards_buffered_pushes() {
        let mut wl = Fifo::<u32>::new();
        let report = rt(2)
            .for_each::<_, _, _, core::convert::Infallible>(
                &LoopConfig::named("rollback"),
                &mut wl,
                vec![1],
                |&item, ctx| {
                    if item == 1 {
                        // First pass pushes then aborts; the push must not
                        // survive.
                        ctx.push(99);
                        if report_is_first(&item) {
                            return Err(OpError::Abort);
                        }
                    }
                    Ok(())
                },
            )
            .unwrap();

        // Committed retry pushed 99, which then committed as a no-op.
        assert_eq!(report.committed, 2);
        assert_eq!(report.pushes, 1);

        fn report_is_first(_: &u32) -> bool {
            use std::sync::atomic::AtomicBool;
            static FIRST: AtomicBool = AtomicBool::new(true);
            FIRST.swap(false, Ordering::SeqCst)
        }
    }

    #[test]
    fn fatal_stops_the_loop_and_returns_the_first_error() {
        #[derive(Debug, PartialEq)]
        struct Broken(u32);

        let mut wl = Lifo::<u32>::new();
        let result = rt(2).for_each(
            &LoopConfig::named("fatal"),
            &mut wl,
            (0..100).collect(),
            |&item, _ctx| {
                if item == 17 {
                    Err(OpError::Fatal(Broken(item)))
                } else {
                    Ok(())
                }
            },
        );
        assert_eq!(result.unwrap_err(), Broken(17));
    }

    #[test]
    fn break_loop_leaves_remaining_items_in_the_worklist() {
        let executed = AtomicUsize::new(0);
        let mut wl = Fifo::<u32>::new();
        // Single worker so the break point is deterministic.
        let report = rt(1)
            .for_each::<_, _, _, core::convert::Infallible>(
                &LoopConfig::named("break"),
                &mut wl,
                (0..100).collect(),
                |_, ctx| {
                    if executed.fetch_add(1, Ordering::Relaxed) == 9 {
                        ctx.break_loop();
                    }
                    Ok(())
                },
            )
            .unwrap();

        assert_eq!(report.committed, 10);
        // The other 90 items are still queued for the next phase.
        let mut left = 0;
        while Worklist::pop(&wl, WorkerId::FIRST).is_some() {
            left += 1;
        }
        assert_eq!(left, 90);
    }

    #[test]
    fn empty_initial_terminates_immediately() {
        let mut wl = ChunkedFifo::<u32, 8>::new(4);
        let report = rt(4)
            .for_each::<_, _, _, core::convert::Infallible>(
                &LoopConfig::named("empty"),
                &mut wl,
                Vec::new(),
                |_, _| Ok(()),
            )
            .unwrap();
        assert_eq!(report.invocations(), 0);
    }

    /// Worklist whose items are reachable only through the stealing pair:
    /// `pop` always misses, so every delivery exercises the driver's
    /// steal fallback.
    struct StealPool {
        shared: Fifo<u32>,
    }

    impl StealPool {
        fn new() -> Self {
            Self {
                shared: Fifo::new(),
            }
        }
    }

    impl crate::worklist::Worklist<u32> for StealPool {
        fn push(&self, _w: WorkerId, v: u32) {
            self.shared.push_item(v);
        }

        fn pop(&self, _w: WorkerId) -> Option<u32> {
            None
        }

        fn empty(&self, _w: WorkerId) -> bool {
            self.shared.is_empty()
        }

        fn aborted(&self, _w: WorkerId, v: u32) {
            self.shared.push_item(v);
        }

        fn fill_initial(&mut self, items: Vec<u32>) {
            self.shared.seed(items);
        }

        fn steal(&self, _w: WorkerId) -> Option<u32> {
            self.shared.pop_item()
        }

        fn can_steal(&self) -> bool {
            true
        }
    }

    #[test]
    fn steal_capability_drains_the_worklist() {
        let executed = AtomicUsize::new(0);
        let mut wl = StealPool::new();
        let report = rt(4)
            .for_each::<_, _, _, core::convert::Infallible>(
                &LoopConfig::named("steal"),
                &mut wl,
                (0..500).collect(),
                |_, ctx| {
                    if executed.fetch_add(1, Ordering::Relaxed) == 0 {
                        // Context pushes must land back in stealable
                        // territory too.
                        ctx.push(9999);
                    }
                    Ok(())
                },
            )
            .unwrap();

        assert_eq!(executed.load(Ordering::Relaxed), 501);
        assert_eq!(report.committed, 501);
        // Every single delivery went through the steal path.
        assert_eq!(report.steal_successes, 501);
        assert!(report.steal_attempts >= report.steal_successes);
        assert!(wl.empty(WorkerId::FIRST));
    }

    #[test]
    fn steal_toggle_is_inert_without_the_capability() {
        // None of the crate's own worklists opts into stealing, so even
        // with the toggle on (the default) the driver never probes.
        let mut wl = ChunkedFifo::<u32, 8>::new(2);
        let report = rt(2)
            .for_each::<_, _, _, core::convert::Infallible>(
                &LoopConfig::named("no-capability"),
                &mut wl,
                (0..100).collect(),
                |_, _| Ok(()),
            )
            .unwrap();

        assert_eq!(report.invocations(), 100);
        assert_eq!(report.steal_attempts, 0);
        assert_eq!(report.steal_successes, 0);
    }
}
