//! Static timing analysis over a combinational DAG.
//!
//! Pins are nodes, timing arcs are edges with a propagation delay. The
//! analysis runs in three passes:
//!
//! 1. **Levelize** — topological levels via a flag-protocol `for_each`: a
//!    node whose predecessors are still pending simply returns; whichever
//!    predecessor finishes last re-pushes it. No aborts, no locks.
//! 2. **Arrival times** — forward longest-path relaxation driven by a
//!    priority-bucket worklist keyed by topological level, so nodes tend
//!    to run after their fanins and the relaxation mostly settles in one
//!    visit per node. Arrival updates are CAS-max; every improvement
//!    re-pushes the fanout.
//! 3. **Required times** — backward pass, one `do_all` per level in
//!    descending order; each node reads its fanouts' already-final
//!    required times.
//!
//! Slack is `required - arrival`; the design meets its clock period iff
//! the worst slack is non-negative.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use ahash::AHashMap;

use crate::graph::Csr;
use crate::runtime::{LoopConfig, Runtime};
use crate::stdx::Spinlock;
use crate::worklist::{ChunkedFifo, Obim};

/// Monotone CAS-max on an f64 stored as bits. Returns whether `v` raised
/// the stored value. Non-negative floats order the same as their bit
/// patterns, but compare as floats anyway.
fn fetch_max_f64(cell: &AtomicU64, v: f64) -> bool {
    let mut cur = cell.load(Ordering::Relaxed);
    loop {
        if f64::from_bits(cur) >= v {
            return false;
        }
        match cell.compare_exchange_weak(cur, v.to_bits(), Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return true,
            Err(actual) => cur = actual,
        }
    }
}

/// Builder interning pin names and collecting timing arcs.
pub struct TimingGraphBuilder {
    names: Vec<String>,
    index: AHashMap<String, u32>,
    arcs: Vec<(u32, u32, f64)>,
}

impl TimingGraphBuilder {
    pub fn new() -> Self {
        Self {
            names: Vec::new(),
            index: AHashMap::new(),
            arcs: Vec::new(),
        }
    }

    /// Intern a pin by name, creating it on first mention.
    pub fn pin(&mut self, name: &str) -> u32 {
        if let Some(&id) = self.index.get(name) {
            return id;
        }
        let id = self.names.len() as u32;
        self.names.push(name.to_owned());
        self.index.insert(name.to_owned(), id);
        id
    }

    /// Add a timing arc with a propagation delay.
    pub fn arc(&mut self, from: &str, to: &str, delay: f64) {
        assert!(delay >= 0.0, "negative arc delay");
        let f = self.pin(from);
        let t = self.pin(to);
        assert!(f != t, "a pin cannot drive itself");
        self.arcs.push((f, t, delay));
    }

    pub fn build(self) -> TimingGraph {
        let n = self.names.len();
        let fwd = Csr::from_edges(n, &self.arcs, |_| ());
        let reversed: Vec<(u32, u32, f64)> =
            self.arcs.iter().map(|&(f, t, d)| (t, f, d)).collect();
        let rev = Csr::from_edges(n, &reversed, |_| ());
        TimingGraph {
            fwd,
            rev,
            names: self.names,
            arrival: (0..n).map(|_| AtomicU64::new(0)).collect(),
            required: (0..n)
                .map(|_| AtomicU64::new(f64::INFINITY.to_bits()))
                .collect(),
            topo_level: (0..n).map(|_| AtomicUsize::new(0)).collect(),
            flag: (0..n).map(|_| AtomicBool::new(false)).collect(),
        }
    }
}

impl Default for TimingGraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Levelized timing DAG with per-pin arrival/required times.
pub struct TimingGraph {
    fwd: Csr<(), f64>,
    rev: Csr<(), f64>,
    names: Vec<String>,
    arrival: Vec<AtomicU64>,
    required: Vec<AtomicU64>,
    topo_level: Vec<AtomicUsize>,
    flag: Vec<AtomicBool>,
}

/// Analysis summary from [`analyze`].
#[derive(Clone, Debug)]
pub struct TimingReport {
    /// Longest arrival time at any primary output (the critical path).
    pub critical_path: f64,
    /// Minimum slack across all pins.
    pub worst_slack: f64,
}

impl TimingGraph {
    pub fn num_pins(&self) -> usize {
        self.names.len()
    }

    pub fn pin_name(&self, u: u32) -> &str {
        &self.names[u as usize]
    }

    pub fn arrival(&self, u: u32) -> f64 {
        f64::from_bits(self.arrival[u as usize].load(Ordering::Relaxed))
    }

    pub fn required(&self, u: u32) -> f64 {
        f64::from_bits(self.required[u as usize].load(Ordering::Relaxed))
    }

    pub fn slack(&self, u: u32) -> f64 {
        self.required(u) - self.arrival(u)
    }

    pub fn topo_level(&self, u: u32) -> usize {
        self.topo_level[u as usize].load(Ordering::Relaxed)
    }

    fn pins(&self) -> Vec<u32> {
        (0..self.num_pins() as u32).collect()
    }

    /// Primary inputs: pins with no fanin.
    fn primary_inputs(&self, rt: &Runtime) -> Vec<u32> {
        let front = Spinlock::new(Vec::new());
        rt.do_all(&LoopConfig::named("find-inputs"), self.pins(), |u| {
            if self.rev.degree(u) == 0 {
                front.lock().push(u);
            }
        });
        front.into_inner()
    }

    /// Pass 1: topological levels. The flag marks "still to be computed";
    /// a node with a pending predecessor just returns and waits to be
    /// re-pushed by that predecessor's completion.
    fn compute_levels(&self, rt: &Runtime) {
        rt.do_all(&LoopConfig::named("init-flags"), self.pins(), |u| {
            self.flag[u as usize].store(true, Ordering::Relaxed);
            self.topo_level[u as usize].store(0, Ordering::Relaxed);
        });

        let initial = self.primary_inputs(rt);
        let mut wl = ChunkedFifo::<u32, 32>::new(rt.workers());
        rt.for_each::<_, _, _, core::convert::Infallible>(
            &LoopConfig::named("levelize"),
            &mut wl,
            initial,
            |&u, ctx| {
                if !self.flag[u as usize].load(Ordering::Acquire) {
                    return Ok(()); // already levelized
                }
                let mut level = 1;
                for e in self.rev.edges(u) {
                    let pred = self.rev.dst(e);
                    if self.flag[pred as usize].load(Ordering::Acquire) {
                        return Ok(()); // pred pending; it will re-push us
                    }
                    level = level.max(self.topo_level[pred as usize].load(Ordering::Relaxed) + 1);
                }
                self.topo_level[u as usize].store(level, Ordering::Relaxed);
                self.flag[u as usize].store(false, Ordering::Release);
                for e in self.fwd.edges(u) {
                    ctx.push(self.fwd.dst(e));
                }
                Ok(())
            },
        )
        .expect("levelize operators are infallible");
    }

    /// Pass 2: arrival times, near-topological order through the level-
    /// keyed priority buckets.
    fn compute_arrival(&self, rt: &Runtime) {
        let max_level = (0..self.num_pins() as u32)
            .map(|u| self.topo_level(u))
            .max()
            .unwrap_or(0);

        let initial = self.primary_inputs(rt);
        let mut wl = Obim::new(max_level, rt.workers(), |v: &u32| self.topo_level(*v));
        rt.for_each::<_, _, _, core::convert::Infallible>(
            &LoopConfig::named("arrival"),
            &mut wl,
            initial,
            |&u, ctx| {
                let mut arr: f64 = 0.0;
                for e in self.rev.edges(u) {
                    let pred = self.rev.dst(e);
                    arr = arr.max(self.arrival(pred) + self.rev.edge(e));
                }
                let improved = fetch_max_f64(&self.arrival[u as usize], arr);
                if improved || self.rev.degree(u) == 0 {
                    for e in self.fwd.edges(u) {
                        ctx.push(self.fwd.dst(e));
                    }
                }
                Ok(())
            },
        )
        .expect("arrival operators are infallible");
    }

    /// Pass 3: required times, one bulk pass per level from the outputs
    /// backward. Fanout required times are final when a level runs.
    fn compute_required(&self, rt: &Runtime, clock_period: f64) {
        let mut by_level: Vec<Vec<u32>> = Vec::new();
        for u in 0..self.num_pins() as u32 {
            let l = self.topo_level(u);
            if by_level.len() <= l {
                by_level.resize_with(l + 1, Vec::new);
            }
            by_level[l].push(u);
        }

        for level in by_level.into_iter().rev() {
            if level.is_empty() {
                continue;
            }
            rt.do_all(&LoopConfig::named("required"), level, |u| {
                let req = if self.fwd.degree(u) == 0 {
                    clock_period
                } else {
                    let mut req = f64::INFINITY;
                    for e in self.fwd.edges(u) {
                        let succ = self.fwd.dst(e);
                        req = req.min(self.required(succ) - self.fwd.edge(e));
                    }
                    req
                };
                self.required[u as usize].store(req.to_bits(), Ordering::Relaxed);
            });
        }
    }
}

/// Run all three passes and summarize.
pub fn analyze(rt: &Runtime, g: &TimingGraph, clock_period: f64) -> TimingReport {
    g.compute_levels(rt);
    g.compute_arrival(rt);
    g.compute_required(rt, clock_period);

    let mut critical_path: f64 = 0.0;
    let mut worst_slack = f64::INFINITY;
    for u in 0..g.num_pins() as u32 {
        if g.fwd.degree(u) == 0 {
            critical_path = critical_path.max(g.arrival(u));
        }
        worst_slack = worst_slack.min(g.slack(u));
    }
    TimingReport {
        critical_path,
        worst_slack,
    }
}

/// Compare the parallel results against a sequential longest-path
/// reference and check level/slack consistency.
pub fn verify_timing(g: &TimingGraph) -> Result<(), String> {
    let n = g.num_pins();

    // Kahn order.
    let mut indegree: Vec<usize> = (0..n as u32).map(|u| g.rev.degree(u)).collect();
    let mut order = Vec::with_capacity(n);
    let mut queue: std::collections::VecDeque<u32> = (0..n as u32)
        .filter(|&u| indegree[u as usize] == 0)
        .collect();
    while let Some(u) = queue.pop_front() {
        order.push(u);
        for e in g.fwd.edges(u) {
            let v = g.fwd.dst(e);
            indegree[v as usize] -= 1;
            if indegree[v as usize] == 0 {
                queue.push_back(v);
            }
        }
    }
    if order.len() != n {
        return Err("timing graph has a cycle".to_owned());
    }

    let mut reference = vec![0.0f64; n];
    for &u in &order {
        for e in g.fwd.edges(u) {
            let v = g.fwd.dst(e);
            let cand = reference[u as usize] + g.fwd.edge(e);
            if cand > reference[v as usize] {
                reference[v as usize] = cand;
            }
        }
    }

    for u in 0..n as u32 {
        let got = g.arrival(u);
        let want = reference[u as usize];
        if (got - want).abs() > 1e-9 {
            return Err(format!(
                "arrival mismatch at {}: got {got}, reference {want}",
                g.pin_name(u)
            ));
        }
        for e in g.fwd.edges(u) {
            let v = g.fwd.dst(e);
            if g.topo_level(u) >= g.topo_level(v) {
                return Err(format!(
                    "levels not topological: {} !< {}",
                    g.pin_name(u),
                    g.pin_name(v)
                ));
            }
        }
    }
    Ok(())
}
