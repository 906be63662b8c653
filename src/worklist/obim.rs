//! Ordered-by-integer-metric: priority buckets with per-worker cursors.
//!
//! Given an indexer `I(v) -> [0, range]`, pushes dispatch to bucket
//! `I(v)` and pops drain the lowest bucket the calling worker believes may
//! be non-empty. The cursor approximates a global priority traversal
//! without any global heap:
//!
//! - each worker's cursor starts at 0 and only moves forward during pops;
//! - a push to a bucket below the cursor rewinds it to that bucket;
//! - a cursor that runs off the end wraps to 0 on the next pop.
//!
//! Between rewind points the cursor is monotone per worker, so advancement
//! is weakly monotone per worker and near-monotone globally. When multiple
//! workers share buckets, priority inversions are possible and permitted —
//! bounded by the rate of lower-bucket pushes. Consumers of this structure
//! care about *approximate* priority; anything stricter belongs in a
//! sequential heap.
//!
//! Buckets are themselves worklists (independently locked), supplied by a
//! factory closure. The default is a [`Fifo`] per bucket; the max-flow
//! application instantiates chunked buckets instead.

use core::marker::PhantomData;

use crate::runtime::{PerWorker, WorkerId};

use super::stl::Fifo;
use super::Worklist;

/// Priority-bucket worklist. `F` maps an item to its bucket index; lower
/// buckets drain first (best-effort).
pub struct Obim<T, F, B = Fifo<T>> {
    buckets: Box<[B]>,
    indexer: F,
    cursor: PerWorker<usize>,
    _items: PhantomData<fn(T) -> T>,
}

/// Teardown merge: cursors reset to the lowest bucket.
fn reset_cursors(lhs: &mut usize, rhs: &mut usize) {
    *lhs = 0;
    *rhs = 0;
}

impl<T, F> Obim<T, F, Fifo<T>>
where
    T: Send,
    F: Fn(&T) -> usize + Send + Sync,
{
    /// `range + 1` FIFO buckets for `workers` workers.
    pub fn new(range: usize, workers: usize, indexer: F) -> Self {
        Self::with_buckets(range, workers, indexer, |_| Fifo::new())
    }
}

impl<T, F, B> Obim<T, F, B>
where
    T: Send,
    F: Fn(&T) -> usize + Send + Sync,
    B: Worklist<T>,
{
    /// `range + 1` buckets built by `make_bucket`, indexed 0..=range.
    pub fn with_buckets(
        range: usize,
        workers: usize,
        indexer: F,
        make_bucket: impl FnMut(usize) -> B,
    ) -> Self {
        Self {
            buckets: (0..=range).map(make_bucket).collect(),
            indexer,
            cursor: PerWorker::with_merge(workers, |_| 0, reset_cursors),
            _items: PhantomData,
        }
    }

    /// Number of buckets (`range + 1`).
    pub fn buckets(&self) -> usize {
        self.buckets.len()
    }

    /// Bucket index for `v`. An indexer result above the range is a
    /// programmer error; it clamps to the top bucket.
    #[inline]
    fn bucket_of(&self, v: &T) -> usize {
        (self.indexer)(v).min(self.buckets.len() - 1)
    }
}

impl<T, F, B> Worklist<T> for Obim<T, F, B>
where
    T: Send,
    F: Fn(&T) -> usize + Send + Sync,
    B: Worklist<T>,
{
    fn push(&self, w: WorkerId, v: T) {
        let idx = self.bucket_of(&v);
        self.buckets[idx].push(w, v);
        // SAFETY: `w` is the calling worker's own id (driver contract).
        let cur = unsafe { self.cursor.get(w) };
        if *cur > idx {
            *cur = idx;
        }
    }

    fn pop(&self, w: WorkerId) -> Option<T> {
        // SAFETY: `w` is the calling worker's own id (driver contract).
        let cur = unsafe { self.cursor.get(w) };
        if *cur >= self.buckets.len() {
            // Ran off the end last time; wrap for pushes that landed
            // behind us.
            *cur = 0;
        }
        loop {
            if let Some(v) = self.buckets[*cur].pop(w) {
                return Some(v);
            }
            *cur += 1;
            if *cur >= self.buckets.len() {
                // Parked past the end; the next pop wraps.
                return None;
            }
        }
    }

    fn empty(&self, w: WorkerId) -> bool {
        self.buckets.iter().all(|b| b.empty(w))
    }

    fn aborted(&self, w: WorkerId, v: T) {
        self.push(w, v);
    }

    fn fill_initial(&mut self, items: Vec<T>) {
        for v in items {
            self.push(WorkerId::FIRST, v);
        }
    }
}
