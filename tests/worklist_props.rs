//! Property tests for the worklist invariants.

use proptest::collection::vec;
use proptest::prelude::*;
use std::thread;

use worklist_rs::runtime::WorkerId;
use worklist_rs::worklist::{CacheByMetric, ChunkedFifo, Fifo, Lifo, Obim, Worklist};

const W0: WorkerId = WorkerId::FIRST;

/// Drain everything reachable from worker 0's view.
fn drain<T: Send, W: Worklist<T>>(wl: &W) -> Vec<T> {
    std::iter::from_fn(|| wl.pop(W0)).collect()
}

/// Split items across two pushing workers, then drain and compare
/// multisets.
fn push_concurrently_and_drain<W>(wl: &W, items: &[u32]) -> Vec<u32>
where
    W: Worklist<u32>,
{
    let mid = items.len() / 2;
    let (left, right) = items.split_at(mid);
    thread::scope(|s| {
        s.spawn(|| {
            for &v in left {
                wl.push(WorkerId::new(0), v);
            }
        });
        s.spawn(|| {
            for &v in right {
                wl.push(WorkerId::new(1), v);
            }
        });
    });

    // Worker 1 may have staged items only its own view can reach.
    let mut drained: Vec<u32> = std::iter::from_fn(|| wl.pop(WorkerId::new(1))).collect();
    drained.extend(std::iter::from_fn(|| wl.pop(WorkerId::new(0))));
    drained
}

proptest! {
    /// Preservation: with no aborts, drained items equal pushed items as
    /// multisets, for every worklist shape.
    #[test]
    fn preservation_lifo(items in vec(0u32..1000, 0..200)) {
        let wl = Lifo::<u32>::new();
        let mut drained = push_concurrently_and_drain(&wl, &items);
        let mut expected = items.clone();
        drained.sort_unstable();
        expected.sort_unstable();
        prop_assert_eq!(drained, expected);
    }

    #[test]
    fn preservation_chunked(items in vec(0u32..1000, 0..200)) {
        let wl = ChunkedFifo::<u32, 8>::new(2);
        let mut drained = push_concurrently_and_drain(&wl, &items);
        let mut expected = items.clone();
        drained.sort_unstable();
        expected.sort_unstable();
        prop_assert_eq!(drained, expected);
    }

    #[test]
    fn preservation_obim(items in vec(0u32..1000, 0..200)) {
        let wl = Obim::new(31, 2, |v: &u32| (*v % 32) as usize);
        let mut drained = push_concurrently_and_drain(&wl, &items);
        let mut expected = items.clone();
        drained.sort_unstable();
        expected.sort_unstable();
        prop_assert_eq!(drained, expected);
    }

    #[test]
    fn preservation_cache(items in vec(0u32..1000, 0..200)) {
        let wl: CacheByMetric<u32, _, _, 4> =
            CacheByMetric::new(Fifo::<u32>::new(), 2, |v: &u32| *v as usize);
        let mut drained = push_concurrently_and_drain(&wl, &items);
        let mut expected = items.clone();
        drained.sort_unstable();
        expected.sort_unstable();
        prop_assert_eq!(drained, expected);
    }

    /// Chunk fullness: a single staging worker publishes exactly
    /// floor((k - 1) / CHUNK) chunks after k pushes — chunks publish only
    /// when full.
    #[test]
    fn chunks_publish_only_when_full(k in 0usize..200) {
        let wl = ChunkedFifo::<u32, 4, false>::new(1);
        for v in 0..k as u32 {
            wl.push(W0, v);
        }
        let expected = if k == 0 { 0 } else { (k - 1) / 4 };
        prop_assert_eq!(wl.queued_chunks(), expected);
    }

    /// Local-abort locality: with the shared FIFO dry, an aborted item is
    /// the next thing its worker pops.
    #[test]
    fn aborted_item_returns_to_its_worker(v in 0u32..1000) {
        let wl = ChunkedFifo::<u32, 16>::new(2);
        wl.aborted(W0, v);
        prop_assert_eq!(wl.pop(W0), Some(v));
    }

    /// OBIM cursor monotonicity: draining without intervening pushes
    /// yields non-decreasing metrics per worker.
    #[test]
    fn obim_drains_in_nondecreasing_metric_order(items in vec(0u32..64, 1..100)) {
        let mut wl = Obim::new(63, 1, |v: &u32| *v as usize);
        wl.fill_initial(items);
        let drained = drain(&wl);
        for pair in drained.windows(2) {
            prop_assert!(pair[0] <= pair[1], "metric went backwards: {:?}", pair);
        }
    }

    /// Cache ejection order: after a single worker pushes a batch with
    /// distinct metrics, the cache serves the SIZE smallest items, in
    /// ascending order, before touching the parent.
    #[test]
    fn cache_serves_best_items_first(items in proptest::collection::hash_set(0u32..1000, 1..50)) {
        const SIZE: usize = 4;
        let items: Vec<u32> = items.into_iter().collect();
        let wl: CacheByMetric<u32, _, _, SIZE> =
            CacheByMetric::new(Fifo::<u32>::new(), 1, |v: &u32| *v as usize);
        for &v in &items {
            wl.push(W0, v);
        }

        let mut sorted = items.clone();
        sorted.sort_unstable();
        let cached = sorted.len().min(SIZE);
        for expected in &sorted[..cached] {
            prop_assert_eq!(wl.pop(W0), Some(*expected));
        }

        let mut rest = drain(&wl);
        rest.sort_unstable();
        prop_assert_eq!(rest, sorted[cached..].to_vec());
    }

    /// fill_initial seeds feed pops exactly once.
    #[test]
    fn fill_initial_preserves_items(items in vec(0u32..1000, 0..200)) {
        let mut wl = ChunkedFifo::<u32, 8>::new(2);
        wl.fill_initial(items.clone());
        let mut drained = drain(&wl);
        let mut expected = items.clone();
        drained.sort_unstable();
        expected.sort_unstable();
        prop_assert_eq!(drained, expected);
    }
}
