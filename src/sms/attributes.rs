//! Node Attribute Computation (§4.4)
//!
//! ASAP, ALAP, MOB (mobility), Depth and Height, computed by memoized
//! traversal over the dependence graph with the recurrence ignore-set
//! (`recurrence::IgnoreSet`) edges removed — the remaining graph is acyclic
//! by construction of the ignore-set, so a plain topological order suffices.

use std::collections::HashMap;

use crate::sms::depgraph::{DepGraph, NodeId};
use crate::sms::recurrence::IgnoreSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeAttrs {
    pub asap: u32,
    pub alap: u32,
    pub mob: u32,
    pub depth: u32,
    pub height: u32,
}

/// All five attributes for every node, keyed by `NodeId`. Recomputed whenever
/// II changes (ASAP/ALAP depend on it; Depth/Height do not but are cheap
/// enough to recompute alongside).
pub fn compute(graph: &DepGraph, ignore: &IgnoreSet, ii: u32) -> HashMap<NodeId, NodeAttrs> {
    let order = topo_order(graph, ignore);
    let asap = compute_asap(graph, ignore, ii, &order);
    let max_asap = asap.values().copied().max().unwrap_or(0);
    let alap = compute_alap(graph, ignore, ii, &order, max_asap);
    let depth = compute_depth(graph, ignore, &order);
    let height = compute_height(graph, ignore, &order);

    let mut out = HashMap::with_capacity(graph.len());
    for i in 0..graph.len() {
        let n = NodeId(i);
        let a = asap[&n];
        let l = alap[&n];
        out.insert(
            n,
            NodeAttrs {
                asap: a,
                alap: l,
                mob: l.saturating_sub(a),
                depth: depth[&n],
                height: height[&n],
            },
        );
    }
    out
}

/// Topological order over the graph with `ignore` edges removed (Kahn's
/// algorithm). The ignore-set breaks every cycle by construction, so this
/// always covers all nodes.
fn topo_order(graph: &DepGraph, ignore: &IgnoreSet) -> Vec<NodeId> {
    let n = graph.len();
    let mut indeg = vec![0u32; n];
    for (idx, e) in graph.edges.iter().enumerate() {
        if ignore.contains(idx) {
            continue;
        }
        indeg[e.to.0] += 1;
    }
    let mut ready: Vec<NodeId> = (0..n).filter(|&i| indeg[i] == 0).map(NodeId).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(v) = ready.pop() {
        order.push(v);
        for &e_idx in &graph.nodes[v.0].out_edges {
            if ignore.contains(e_idx) {
                continue;
            }
            let to = graph.edges[e_idx].to;
            indeg[to.0] -= 1;
            if indeg[to.0] == 0 {
                ready.push(to);
            }
        }
    }
    order
}

fn compute_asap(
    graph: &DepGraph,
    ignore: &IgnoreSet,
    ii: u32,
    order: &[NodeId],
) -> HashMap<NodeId, u32> {
    let mut asap: HashMap<NodeId, u32> = HashMap::with_capacity(graph.len());
    for &v in order {
        let mut best: i64 = 0;
        for (idx, e) in graph.in_edges_indexed(v) {
            if ignore.contains(idx) {
                continue;
            }
            let u_latency = graph.nodes[e.from.0].latency as i64;
            let candidate = asap[&e.from] as i64 + u_latency - i64::from(e.delta) * i64::from(ii);
            best = best.max(candidate);
        }
        asap.insert(v, best.max(0) as u32);
    }
    asap
}

fn compute_alap(
    graph: &DepGraph,
    ignore: &IgnoreSet,
    ii: u32,
    order: &[NodeId],
    max_asap: u32,
) -> HashMap<NodeId, u32> {
    let mut alap: HashMap<NodeId, u32> = HashMap::with_capacity(graph.len());
    for &v in order.iter().rev() {
        let mut any_out = false;
        let mut best: i64 = i64::MAX;
        let latency = graph.nodes[v.0].latency as i64;
        for (idx, e) in graph.out_edges_indexed(v) {
            if ignore.contains(idx) {
                continue;
            }
            any_out = true;
            let candidate = alap[&e.to] as i64 - latency + i64::from(e.delta) * i64::from(ii);
            best = best.min(candidate);
        }
        let value = if any_out { best.max(0) } else { i64::from(max_asap) };
        alap.insert(v, value.max(0) as u32);
    }
    alap
}

fn compute_depth(graph: &DepGraph, ignore: &IgnoreSet, order: &[NodeId]) -> HashMap<NodeId, u32> {
    let mut depth: HashMap<NodeId, u32> = HashMap::with_capacity(graph.len());
    for &v in order {
        let mut best = 0u32;
        for (idx, e) in graph.in_edges_indexed(v) {
            if ignore.contains(idx) {
                continue;
            }
            best = best.max(depth[&e.from] + graph.nodes[e.from.0].latency);
        }
        depth.insert(v, best);
    }
    depth
}

fn compute_height(graph: &DepGraph, ignore: &IgnoreSet, order: &[NodeId]) -> HashMap<NodeId, u32> {
    let mut height: HashMap<NodeId, u32> = HashMap::with_capacity(graph.len());
    for &v in order.iter().rev() {
        let latency = graph.nodes[v.0].latency;
        let mut best = 0u32;
        let mut any_out = false;
        for (idx, e) in graph.out_edges_indexed(v) {
            if ignore.contains(idx) {
                continue;
            }
            any_out = true;
            best = best.max(height[&e.to] + latency);
        }
        height.insert(v, if any_out { best } else { latency });
    }
    height
}
