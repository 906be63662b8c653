//! A value replicated one-per-worker, with an optional cross-worker merge
//! on teardown.
//!
//! # Ownership model
//!
//! ```text
//!   PerWorker<T>
//!   ┌────────────────────────────────────────────────┐
//!   │ CachePadded<T> │ CachePadded<T> │ ... │ (xN)   │
//!   └────────────────────────────────────────────────┘
//!         ▲                 ▲
//!         │ worker 0 only   │ worker 1 only
//! ```
//!
//! At any moment, at most the owning worker mutates its record without
//! synchronization. Cross-worker access happens only:
//!
//! - through `&mut self` (exclusive borrow proves quiescence), or
//! - in the merge step on drop, after all workers have stopped.
//!
//! Records are cache-padded so adjacent workers' hot fields never share a
//! line.
//!
//! # Merge on teardown
//!
//! A merge function supplied at construction is folded over
//! `(slot[0], slot[i])` pairs when the storage drops. Worklists use it to
//! reset cursors or assert that per-worker staging drained; it runs strictly
//! after workers have quiesced because drop requires ownership.

use core::cell::UnsafeCell;

use crossbeam_utils::CachePadded;

use super::worker_id::WorkerId;

/// One record of type `T` per worker.
pub struct PerWorker<T> {
    slots: Box<[CachePadded<UnsafeCell<T>>]>,
    merge: Option<fn(&mut T, &mut T)>,
}

// SAFETY: records are only touched by their owning worker (the `get`
// contract) or under `&mut self`; the container itself carries no shared
// mutable state.
unsafe impl<T: Send> Sync for PerWorker<T> {}

impl<T> PerWorker<T> {
    /// One record per worker, initialized by `init`, no teardown merge.
    pub fn new(workers: usize, init: impl FnMut(WorkerId) -> T) -> Self {
        Self::build(workers, init, None)
    }

    /// One record per worker with a merge folded over `(first, other)`
    /// pairs on drop.
    pub fn with_merge(
        workers: usize,
        init: impl FnMut(WorkerId) -> T,
        merge: fn(&mut T, &mut T),
    ) -> Self {
        Self::build(workers, init, Some(merge))
    }

    fn build(
        workers: usize,
        mut init: impl FnMut(WorkerId) -> T,
        merge: Option<fn(&mut T, &mut T)>,
    ) -> Self {
        assert!(workers > 0, "per-worker storage needs at least one worker");
        let slots = (0..workers)
            .map(|i| CachePadded::new(UnsafeCell::new(init(WorkerId::new(i)))))
            .collect();
        Self { slots, merge }
    }

    /// Number of worker records.
    #[inline]
    pub fn workers(&self) -> usize {
        self.slots.len()
    }

    /// The calling worker's record.
    ///
    /// # Safety
    ///
    /// Only the thread currently acting as worker `w` may call this with
    /// that id, and the returned borrow must end before the same thread
    /// calls `get(w)` again. The loop drivers uphold this by handing each
    /// spawned thread a distinct id for the lifetime of the loop.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get(&self, w: WorkerId) -> &mut T {
        debug_assert!(w.index() < self.slots.len(), "worker id out of range");
        // SAFETY: per the contract above, `w`'s slot is not aliased.
        unsafe { &mut *self.slots[w.index()].get() }
    }

    /// Exclusive access to one record; the borrow proves no worker is live.
    #[inline]
    pub fn get_mut(&mut self, w: WorkerId) -> &mut T {
        self.slots[w.index()].get_mut()
    }

    /// Iterate all records exclusively (post-quiesce inspection).
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.slots.iter_mut().map(|s| s.get_mut())
    }
}

impl<T> Drop for PerWorker<T> {
    fn drop(&mut self) {
        let Some(merge) = self.merge else { return };
        if let Some((first, rest)) = self.slots.split_first_mut() {
            for other in rest {
                merge(first.get_mut(), other.get_mut());
            }
        }
    }
}

impl<T: core::fmt::Debug> core::fmt::Debug for PerWorker<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PerWorker")
            .field("workers", &self.slots.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn records_are_initialized_per_worker() {
        let mut pw = PerWorker::new(4, |w| w.index() * 10);
        for (i, r) in pw.iter_mut().enumerate() {
            assert_eq!(*r, i * 10);
        }
    }

    #[test]
    fn workers_never_observe_each_others_records() {
        let mut pw = PerWorker::new(4, |_| 0usize);
        {
            let pw = &pw;
            thread::scope(|s| {
                for i in 0..4 {
                    s.spawn(move || {
                        let w = WorkerId::new(i);
                        for _ in 0..1000 {
                            // SAFETY: this thread is the sole user of id `i`.
                            let r = unsafe { pw.get(w) };
                            *r += 1;
                        }
                    });
                }
            });
        }
        for r in pw.iter_mut() {
            assert_eq!(*r, 1000);
        }
    }

    #[test]
    fn merge_folds_pairs_on_drop() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static TOTAL: AtomicUsize = AtomicUsize::new(0);

        fn merge(lhs: &mut usize, rhs: &mut usize) {
            *lhs += *rhs;
            TOTAL.store(*lhs, Ordering::Relaxed);
        }

        {
            let mut pw = PerWorker::with_merge(3, |w| w.index() + 1, merge);
            let _ = pw.iter_mut();
        }
        // 1 + 2 + 3 folded into slot 0
        assert_eq!(TOTAL.load(Ordering::Relaxed), 6);
    }
}
