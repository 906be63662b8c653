//! Preflow-push max-flow.
//!
//! Discharge-based push/relabel over a residual network. Each operator
//! invocation acquires its node's neighborhood with `try_lock`; any failed
//! acquisition aborts the invocation, which re-queues the node through the
//! worklist's abort path — the speculative retry loop in miniature.
//!
//! Active nodes are ordered by height through the priority-bucket worklist
//! with chunked buckets. Per-worker discharge counters accumulate toward
//! the global relabel interval; when a worker's share is spent it raises
//! the parallel break, the loop drains out, and a BFS from the sink
//! recomputes exact distance labels before the next round re-seeds from
//! the surviving active nodes.
//!
//! Heights live in a plain atomic array (the relabel BFS lowers them with
//! CAS); excess and the current-edge cursor live under each node's
//! spinlock and are touched only with the neighborhood held.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

use ahash::AHashMap;

use crate::runtime::{LoopConfig, OpError, PerWorker, Runtime};
use crate::stdx::Spinlock;
use crate::worklist::{ChunkedFifo, Obim};

/// Weight of a relabel toward the global-relabel counter, relative to a
/// plain discharge.
const BETA: usize = 12;
/// Scale of the default global relabel interval in nodes.
const ALPHA: usize = 6;

// ---------------------------------------------------------------------------
// Residual network
// ---------------------------------------------------------------------------

/// Builder that merges parallel arcs and guarantees every arc has its
/// reverse present, so the residual network is symmetric and rows hold no
/// duplicate destinations (the neighborhood lock order relies on that).
pub struct FlowNetworkBuilder {
    n: usize,
    arcs: Vec<(u32, u32, i64)>,
    index: AHashMap<(u32, u32), usize>,
}

impl FlowNetworkBuilder {
    pub fn new(num_nodes: usize) -> Self {
        Self {
            n: num_nodes,
            arcs: Vec::new(),
            index: AHashMap::new(),
        }
    }

    /// Add a directed capacity. Parallel arcs merge; the zero-capacity
    /// reverse arc is created if absent.
    pub fn add_edge(&mut self, u: u32, v: u32, cap: i64) {
        assert!(u != v, "self-loops have no place in a flow network");
        assert!((u as usize) < self.n && (v as usize) < self.n);
        assert!(cap >= 0, "capacities are non-negative");
        self.bump(u, v, cap);
        self.bump(v, u, 0);
    }

    fn bump(&mut self, u: u32, v: u32, cap: i64) {
        match self.index.entry((u, v)) {
            std::collections::hash_map::Entry::Occupied(e) => {
                self.arcs[*e.get()].2 += cap;
            }
            std::collections::hash_map::Entry::Vacant(e) => {
                e.insert(self.arcs.len());
                self.arcs.push((u, v, cap));
            }
        }
    }

    /// Freeze into CSR form with reverse-arc indices resolved.
    pub fn finalize(self, source: u32, sink: u32) -> FlowNetwork {
        assert!(source != sink);
        let n = self.n;

        let mut degree = vec![0usize; n];
        for &(u, _, _) in &self.arcs {
            degree[u as usize] += 1;
        }
        let mut row_start = Vec::with_capacity(n + 1);
        let mut acc = 0;
        row_start.push(0);
        for d in &degree {
            acc += d;
            row_start.push(acc);
        }

        let m = self.arcs.len();
        let mut cursor: Vec<usize> = row_start[..n].to_vec();
        let mut src = vec![0u32; m];
        let mut dst = vec![0u32; m];
        let mut cap = vec![0i64; m];
        for &(u, v, c) in &self.arcs {
            let slot = cursor[u as usize];
            cursor[u as usize] += 1;
            src[slot] = u;
            dst[slot] = v;
            cap[slot] = c;
        }

        let mut by_pair = AHashMap::with_capacity(m);
        for e in 0..m {
            by_pair.insert((src[e], dst[e]), e);
        }
        let rev: Vec<usize> = (0..m)
            .map(|e| by_pair[&(dst[e], src[e])])
            .collect();

        FlowNetwork {
            n,
            source,
            sink,
            row_start: row_start.into_boxed_slice(),
            dst: dst.into_boxed_slice(),
            rev: rev.into_boxed_slice(),
            orig_cap: cap.clone().into_boxed_slice(),
            cap: cap.into_iter().map(AtomicI64::new).collect(),
        }
    }
}

/// Symmetric residual network in CSR form.
pub struct FlowNetwork {
    n: usize,
    source: u32,
    sink: u32,
    row_start: Box<[usize]>,
    dst: Box<[u32]>,
    /// Index of each arc's reverse arc.
    rev: Box<[usize]>,
    /// Residual capacity, mutated under the endpoints' locks (discharge)
    /// or read-only (verification).
    cap: Box<[AtomicI64]>,
    orig_cap: Box<[i64]>,
}

impl FlowNetwork {
    #[inline]
    fn edges(&self, u: u32) -> core::ops::Range<usize> {
        self.row_start[u as usize]..self.row_start[u as usize + 1]
    }

    #[inline]
    fn residual(&self, e: usize) -> i64 {
        self.cap[e].load(Ordering::Relaxed)
    }

    pub fn num_nodes(&self) -> usize {
        self.n
    }
}

// ---------------------------------------------------------------------------
// Push/relabel state
// ---------------------------------------------------------------------------

/// Per-node mutable state guarded by the node's spinlock.
#[derive(Default)]
struct NodeState {
    excess: i64,
    /// Row offset where the last discharge stopped; pushes resume here.
    current: usize,
}

/// Tuning for [`max_flow`].
#[derive(Clone, Copy, Debug)]
pub struct MaxFlowConfig {
    /// Discharge/relabel weight that triggers a global relabel. `None`
    /// computes the conventional `ALPHA * n + m`; `Some(0)` disables
    /// global relabeling.
    pub global_relabel_interval: Option<usize>,
}

impl Default for MaxFlowConfig {
    fn default() -> Self {
        Self {
            global_relabel_interval: None,
        }
    }
}

/// Outcome of [`max_flow`].
pub struct FlowResult {
    /// Value of the maximum flow (excess accumulated at the sink).
    pub value: i64,
    /// Rounds of global relabeling performed.
    pub global_relabels: usize,
}

struct PreflowPush<'a> {
    net: &'a FlowNetwork,
    height: Vec<AtomicUsize>,
    node: Vec<Spinlock<NodeState>>,
}

impl<'a> PreflowPush<'a> {
    fn new(net: &'a FlowNetwork) -> Self {
        Self {
            height: (0..net.n).map(|_| AtomicUsize::new(0)).collect(),
            node: (0..net.n).map(|_| Spinlock::default()).collect(),
            net,
        }
    }

    #[inline]
    fn height_of(&self, u: u32) -> usize {
        self.height[u as usize].load(Ordering::Relaxed)
    }

    /// Saturate the source's arcs; returns the initially active nodes.
    fn initialize_preflow(&self) -> Vec<u32> {
        let net = self.net;
        self.height[net.source as usize].store(net.n, Ordering::Relaxed);

        let mut initial = Vec::new();
        for e in net.edges(net.source) {
            let amount = net.cap[e].load(Ordering::Relaxed);
            if amount <= 0 {
                continue;
            }
            net.cap[e].store(0, Ordering::Relaxed);
            net.cap[net.rev[e]].fetch_add(amount, Ordering::Relaxed);
            let v = net.dst[e];
            let mut state = self.node[v as usize].lock();
            state.excess += amount;
            if v != net.sink && state.excess == amount {
                initial.push(v);
            }
        }
        initial
    }

    /// Discharge `u` with its neighborhood held. Returns whether a relabel
    /// happened and the fresh work discovered.
    fn discharge(
        &self,
        u: u32,
        gu: &mut NodeState,
        gn: &mut [crate::stdx::SpinGuard<'_, NodeState, true>],
    ) -> (bool, Vec<u32>) {
        let net = self.net;
        let n = net.n;
        let row = net.edges(u);
        let mut pushed = Vec::new();
        let mut relabeled = false;

        if gu.excess == 0 || self.height_of(u) >= n {
            return (false, pushed);
        }

        loop {
            let mut finished = false;
            let hu = self.height_of(u);

            for (k, e) in row.clone().enumerate().skip(gu.current) {
                let cap_e = net.residual(e);
                if cap_e == 0 {
                    continue;
                }
                let v = net.dst[e];
                if hu != self.height_of(v) + 1 {
                    continue;
                }

                // Push admissible flow.
                let amount = gu.excess.min(cap_e);
                net.cap[e].fetch_sub(amount, Ordering::Relaxed);
                net.cap[net.rev[e]].fetch_add(amount, Ordering::Relaxed);

                let dn = &mut gn[k];
                if v != net.sink && v != net.source && dn.excess == 0 {
                    pushed.push(v);
                }
                gu.excess -= amount;
                dn.excess += amount;

                if gu.excess == 0 {
                    finished = true;
                    gu.current = k;
                    break;
                }
            }

            if finished {
                break;
            }

            // Relabel: one above the lowest residual neighbor.
            relabeled = true;
            let mut min_height = usize::MAX;
            let mut min_edge = 0;
            for (k, e) in row.clone().enumerate() {
                if net.residual(e) > 0 {
                    let h = self.height_of(net.dst[e]);
                    if h < min_height {
                        min_height = h;
                        min_edge = k;
                    }
                }
            }
            debug_assert!(min_height != usize::MAX, "excess with no residual arc");

            let new_height = min_height.saturating_add(1);
            if new_height < n {
                self.height[u as usize].store(new_height, Ordering::Relaxed);
                gu.current = min_edge;
            } else {
                self.height[u as usize].store(n, Ordering::Relaxed);
                break;
            }
        }

        (relabeled, pushed)
    }

    /// Exact distance labels: reset, then reverse BFS from the sink over
    /// residual arcs, lowering heights with CAS.
    fn global_relabel(&self, rt: &Runtime) {
        let net = self.net;
        let n = net.n;

        rt.do_all(
            &LoopConfig::named("reset-heights"),
            (0..n as u32).collect(),
            |u| {
                self.height[u as usize].store(n, Ordering::Relaxed);
                self.node[u as usize].lock().current = 0;
            },
        );
        self.height[net.sink as usize].store(0, Ordering::Relaxed);

        let mut wl = ChunkedFifo::<u32, 64>::new(rt.workers());
        rt.for_each::<_, _, _, core::convert::Infallible>(
            &LoopConfig::named("update-heights"),
            &mut wl,
            vec![net.sink],
            |&u, ctx| {
                let hu = self.height_of(u);
                for e in net.edges(u) {
                    // Residual arc dst -> u means dst can push to u.
                    if net.residual(net.rev[e]) == 0 {
                        continue;
                    }
                    let v = net.dst[e];
                    let new_height = hu + 1;
                    let mut old = self.height[v as usize].load(Ordering::Relaxed);
                    while new_height < old {
                        match self.height[v as usize].compare_exchange_weak(
                            old,
                            new_height,
                            Ordering::Relaxed,
                            Ordering::Relaxed,
                        ) {
                            Ok(_) => {
                                ctx.push(v);
                                break;
                            }
                            Err(actual) => old = actual,
                        }
                    }
                }
                Ok(())
            },
        )
        .expect("height update operators are infallible");
    }

    /// Active nodes after a global relabel: excess, not source/sink, still
    /// reachable-from-sink heights.
    fn find_work(&self, rt: &Runtime) -> Vec<u32> {
        let net = self.net;
        let n = net.n;
        let active = Spinlock::new(Vec::new());
        rt.do_all(
            &LoopConfig::named("find-work"),
            (0..n as u32).collect(),
            |u| {
                if u == net.source || u == net.sink || self.height_of(u) >= n {
                    return;
                }
                if self.node[u as usize].lock().excess > 0 {
                    active.lock().push(u);
                }
            },
        );
        active.into_inner()
    }
}

/// Compute the maximum flow from `net.source` to `net.sink`.
pub fn max_flow(rt: &Runtime, net: &FlowNetwork, cfg: MaxFlowConfig) -> FlowResult {
    let pp = PreflowPush::new(net);
    let n = net.n;
    let interval = cfg
        .global_relabel_interval
        .unwrap_or(ALPHA * n + net.dst.len());
    let limit = if interval > 0 {
        (interval / rt.workers()).max(1)
    } else {
        0
    };

    let mut initial = pp.initialize_preflow();
    let mut global_relabels = 0;

    loop {
        let should_relabel = AtomicBool::new(false);
        let spent = PerWorker::new(rt.workers(), |_| 0usize);

        let indexer = |v: &u32| pp.height_of(*v).min(n);
        let mut wl = Obim::with_buckets(n, rt.workers(), indexer, |_| {
            ChunkedFifo::<u32, 16>::new(rt.workers())
        });

        rt.for_each::<_, _, _, core::convert::Infallible>(
            &LoopConfig::named("discharge"),
            &mut wl,
            initial,
            |&u, ctx| {
                // Neighborhood acquisition; any contention aborts and
                // retries through the worklist.
                let Some(mut gu) = pp.node[u as usize].try_lock() else {
                    return Err(OpError::Abort);
                };
                let row = net.edges(u);
                let mut gn = Vec::with_capacity(row.len());
                for e in row {
                    match pp.node[net.dst[e] as usize].try_lock() {
                        Some(g) => gn.push(g),
                        None => return Err(OpError::Abort),
                    }
                }

                let (relabeled, pushed) = pp.discharge(u, &mut gu, &mut gn);
                drop(gn);
                drop(gu);
                for v in pushed {
                    ctx.push(v);
                }

                // SAFETY: this closure runs as worker `ctx.worker()`.
                let c = unsafe { spent.get(ctx.worker()) };
                *c += 1 + if relabeled { BETA } else { 0 };
                if limit > 0 && *c >= limit {
                    should_relabel.store(true, Ordering::Release);
                    ctx.break_loop();
                }
                Ok(())
            },
        )
        .expect("discharge operators are infallible");

        if should_relabel.load(Ordering::Acquire) {
            pp.global_relabel(rt);
            global_relabels += 1;
            initial = pp.find_work(rt);
            continue;
        }
        break;
    }

    let value = pp.node[net.sink as usize].lock().excess;
    FlowResult {
        value,
        global_relabels,
    }
}

/// Check preflow feasibility and the max-flow witness; returns the flow
/// value measured at the sink.
///
/// The first phase of push/relabel computes the max-flow *value*: nodes
/// whose height reached `n` may hold trapped excess, so conservation is
/// checked as the preflow inequality (net inflow never negative) rather
/// than strict equality.
pub fn verify_flow(net: &FlowNetwork) -> Result<i64, String> {
    let n = net.n;

    // Feasibility per arc: non-negative residual, antisymmetric flow.
    for e in 0..net.dst.len() {
        let r = net.residual(e);
        if r < 0 {
            return Err(format!("negative residual on arc {e}"));
        }
        let flow = net.orig_cap[e] - r;
        let rev_flow = net.orig_cap[net.rev[e]] - net.residual(net.rev[e]);
        if flow + rev_flow != 0 {
            return Err(format!("arc {e} and its reverse disagree on flow"));
        }
    }

    // Preflow condition: every node but the source has net inflow >= 0.
    for u in 0..n as u32 {
        if u == net.source {
            continue;
        }
        let net_out: i64 = net
            .edges(u)
            .map(|e| net.orig_cap[e] - net.residual(e))
            .sum();
        if net_out > 0 {
            return Err(format!("node {u} ships more flow than it receives"));
        }
    }

    // Optimality witness: no augmenting path in the residual network.
    let mut seen = vec![false; n];
    let mut queue = std::collections::VecDeque::new();
    seen[net.source as usize] = true;
    queue.push_back(net.source);
    while let Some(u) = queue.pop_front() {
        for e in net.edges(u) {
            let v = net.dst[e];
            if net.residual(e) > 0 && !seen[v as usize] {
                seen[v as usize] = true;
                queue.push_back(v);
            }
        }
    }
    if seen[net.sink as usize] {
        return Err("augmenting path exists; flow is not maximum".to_owned());
    }

    // Flow value: net flow into the sink.
    let value: i64 = net
        .edges(net.sink)
        .map(|e| {
            let back = net.rev[e];
            net.orig_cap[back] - net.residual(back)
        })
        .sum();
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rt() -> Runtime {
        Runtime::with_seed(4, 42)
    }

    /// Classic CLRS example network; max flow 23.
    fn clrs_network() -> FlowNetwork {
        let mut b = FlowNetworkBuilder::new(6);
        b.add_edge(0, 1, 16);
        b.add_edge(0, 2, 13);
        b.add_edge(1, 3, 12);
        b.add_edge(2, 1, 4);
        b.add_edge(2, 4, 14);
        b.add_edge(3, 2, 9);
        b.add_edge(3, 5, 20);
        b.add_edge(4, 3, 7);
        b.add_edge(4, 5, 4);
        b.finalize(0, 5)
    }

    #[test]
    fn clrs_max_flow_is_23() {
        let net = clrs_network();
        let result = max_flow(&rt(), &net, MaxFlowConfig::default());
        assert_eq!(result.value, 23);
        assert_eq!(verify_flow(&net).unwrap(), 23);
    }

    #[test]
    fn tiny_interval_forces_global_relabels() {
        let net = clrs_network();
        let result = max_flow(
            &rt(),
            &net,
            MaxFlowConfig {
                global_relabel_interval: Some(2),
            },
        );
        assert_eq!(result.value, 23);
        assert!(result.global_relabels > 0);
        assert_eq!(verify_flow(&net).unwrap(), 23);
    }

    #[test]
    fn disconnected_sink_gets_zero_flow() {
        let mut b = FlowNetworkBuilder::new(4);
        b.add_edge(0, 1, 5);
        b.add_edge(2, 3, 5);
        let net = b.finalize(0, 3);
        let result = max_flow(&rt(), &net, MaxFlowConfig::default());
        assert_eq!(result.value, 0);
        assert_eq!(verify_flow(&net).unwrap(), 0);
    }

    #[test]
    fn parallel_arcs_merge() {
        let mut b = FlowNetworkBuilder::new(2);
        b.add_edge(0, 1, 3);
        b.add_edge(0, 1, 4);
        let net = b.finalize(0, 1);
        let result = max_flow(&rt(), &net, MaxFlowConfig::default());
        assert_eq!(result.value, 7);
    }

    #[test]
    fn layered_grid_network() {
        // Source -> 3 middle layers of 3 nodes -> sink; plenty of
        // contention on the middle nodes under 4 workers.
        let width = 3u32;
        let layers = 3u32;
        let n = 2 + width * layers;
        let source = 0u32;
        let sink = n - 1;
        let node_at = |layer: u32, i: u32| 1 + layer * width + i;

        let mut b = FlowNetworkBuilder::new(n as usize);
        for i in 0..width {
            b.add_edge(source, node_at(0, i), 10);
            b.add_edge(node_at(layers - 1, i), sink, 10);
        }
        for layer in 0..layers - 1 {
            for i in 0..width {
                for j in 0..width {
                    b.add_edge(node_at(layer, i), node_at(layer + 1, j), 5);
                }
            }
        }
        let net = b.finalize(source, sink);
        let result = max_flow(&rt(), &net, MaxFlowConfig::default());
        assert_eq!(result.value, 30);
        assert_eq!(verify_flow(&net).unwrap(), 30);
    }
}
