//! Small per-worker cache of best-priority items in front of a parent
//! worklist.
//!
//! Each worker owns `SIZE` slots. A push bubbles through them: every
//! occupied slot holding a *worse* (larger-metric) item swaps with the
//! incoming value, so the value carried forward is always the worst seen
//! so far; the first empty slot absorbs it, and if no slot is empty the
//! final carried value — the worst of cache ∪ {v} — overflows to the
//! parent. Pops serve the first occupied slot before delegating.
//!
//! The cache is deliberately unordered within a worker: it trades strict
//! ordering for branch-light inserts, exploiting that downstream consumers
//! care only about approximate priority. The net effect is that each
//! worker keeps its `SIZE` best-metric items hot and pushes the rest down.
//!
//! Bulk seeding bypasses the cache entirely and goes straight to the
//! parent, so initial work is visible to all workers rather than parked in
//! the seeding worker's slots.

use crate::runtime::{PerWorker, WorkerId};

use super::Worklist;

/// Fixed-size per-worker metric cache over a parent worklist `P`.
pub struct CacheByMetric<T, P, F, const SIZE: usize> {
    parent: P,
    cache: PerWorker<[Option<T>; SIZE]>,
    indexer: F,
}

impl<T, P, F, const SIZE: usize> CacheByMetric<T, P, F, SIZE>
where
    T: Send,
    P: Worklist<T>,
    F: Fn(&T) -> usize + Send + Sync,
{
    /// Wrap `parent` with empty caches for `workers` workers.
    pub fn new(parent: P, workers: usize, indexer: F) -> Self {
        assert!(SIZE > 0, "cache needs at least one slot");
        Self {
            parent,
            cache: PerWorker::new(workers, |_| std::array::from_fn(|_| None)),
            indexer,
        }
    }

    /// The wrapped parent worklist.
    pub fn parent(&self) -> &P {
        &self.parent
    }
}

impl<T, P, F, const SIZE: usize> Worklist<T> for CacheByMetric<T, P, F, SIZE>
where
    T: Send,
    P: Worklist<T>,
    F: Fn(&T) -> usize + Send + Sync,
{
    fn push(&self, w: WorkerId, v: T) {
        // SAFETY: `w` is the calling worker's own id (driver contract).
        let slots = unsafe { self.cache.get(w) };
        let mut v = v;
        let mut v_metric = (self.indexer)(&v);
        for slot in slots.iter_mut() {
            match slot {
                Some(held) => {
                    let held_metric = (self.indexer)(held);
                    if v_metric < held_metric {
                        // Incoming is better; it takes the slot and the
                        // former occupant continues the walk.
                        core::mem::swap(held, &mut v);
                        v_metric = held_metric;
                    }
                }
                None => {
                    *slot = Some(v);
                    return;
                }
            }
        }
        // No free slot: v is now the worst of cache ∪ {pushed}.
        self.parent.push(w, v);
    }

    fn pop(&self, w: WorkerId) -> Option<T> {
        // SAFETY: `w` is the calling worker's own id (driver contract).
        let slots = unsafe { self.cache.get(w) };
        for slot in slots.iter_mut() {
            if slot.is_some() {
                return slot.take();
            }
        }
        self.parent.pop(w)
    }

    fn empty(&self, w: WorkerId) -> bool {
        // SAFETY: `w` is the calling worker's own id (driver contract).
        let slots = unsafe { self.cache.get(w) };
        slots.iter().all(Option::is_none) && self.parent.empty(w)
    }

    fn aborted(&self, w: WorkerId, v: T) {
        self.push(w, v);
    }

    /// Straight to the parent; the cache only fills through worker pushes.
    fn fill_initial(&mut self, items: Vec<T>) {
        self.parent.fill_initial(items);
    }

    fn steal(&self, w: WorkerId) -> Option<T> {
        self.parent.steal(w)
    }

    fn can_steal(&self) -> bool {
        self.parent.can_steal()
    }
}
