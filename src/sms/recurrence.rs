//! Recurrence Enumeration & Back-Edge Selection (§4.5)
//!
//! Finds every simple elementary circuit in the dependence graph, computes
//! each one's II contribution, and designates one edge per circuit as its
//! back-edge. The back-edges form the ignore-set that every later attribute
//! and scheduling pass skips to work over an acyclic view of the graph.
//!
//! Circuits are found by first partitioning the graph into strongly
//! connected components (Tarjan) and then enumerating simple cycles only
//! within each nontrivial component, rather than searching the whole graph —
//! the components here are small (one loop body), so a direct DFS enumerator
//! is used instead of a full Johnson's-algorithm implementation.

use std::collections::{HashMap, HashSet};

use crate::sms::depgraph::{DepGraph, NodeId};

/// One elementary circuit in the dependence graph.
#[derive(Debug, Clone)]
pub struct Recurrence {
    /// Nodes of the circuit, in traversal order.
    pub nodes: Vec<NodeId>,
    /// Edge indices of the circuit; `edges[i]` runs `nodes[i] -> nodes[(i+1) % len]`.
    pub edges: Vec<usize>,
    pub delay: u32,
    pub distance: u32,
    pub ii_contribution: u32,
}

/// Edge indices chosen to break every circuit, carried as data rather than
/// by mutating the graph so the original edge set stays available for
/// scheduling-time lookups.
#[derive(Debug, Clone, Default)]
pub struct IgnoreSet(HashSet<usize>);

impl IgnoreSet {
    pub fn insert(&mut self, edge_idx: usize) {
        self.0.insert(edge_idx);
    }

    #[must_use]
    pub fn contains(&self, edge_idx: usize) -> bool {
        self.0.contains(&edge_idx)
    }
}

/// Find every unique (by node-set) elementary circuit in `graph`.
#[must_use]
pub fn find_recurrences(graph: &DepGraph) -> Vec<Recurrence> {
    let mut recurrences = Vec::new();
    let mut seen_node_sets: HashSet<Vec<usize>> = HashSet::new();

    for scc in tarjan_scc(graph) {
        if !is_nontrivial(graph, &scc) {
            continue;
        }
        let scc_set: HashSet<usize> = scc.iter().map(|n| n.0).collect();
        for cycle in enumerate_simple_cycles(graph, &scc_set) {
            let mut key: Vec<usize> = cycle.nodes.iter().map(|n| n.0).collect();
            key.sort_unstable();
            if !seen_node_sets.insert(key) {
                continue;
            }
            recurrences.push(finish_recurrence(graph, cycle));
        }
    }
    recurrences
}

/// Pick one back-edge per recurrence: the first edge in the cycle with
/// δ = 1, falling back to the edge that closes the cycle (last → first).
#[must_use]
pub fn select_ignore_set(graph: &DepGraph, recurrences: &[Recurrence]) -> IgnoreSet {
    let mut ignore = IgnoreSet::default();
    for r in recurrences {
        let chosen = r
            .edges
            .iter()
            .copied()
            .find(|&e| graph.edges[e].delta == 1)
            .unwrap_or_else(|| *r.edges.last().expect("a circuit has at least one edge"));
        ignore.insert(chosen);
    }
    ignore
}

struct RawCycle {
    nodes: Vec<NodeId>,
    edges: Vec<usize>,
}

fn finish_recurrence(graph: &DepGraph, cycle: RawCycle) -> Recurrence {
    let delay: u32 = cycle.nodes.iter().map(|n| graph.nodes[n.0].latency).sum();
    let distance: u32 = cycle.edges.iter().map(|&e| graph.edges[e].delta).sum();
    let ii_contribution = div_ceil(delay, distance.max(1));
    Recurrence {
        nodes: cycle.nodes,
        edges: cycle.edges,
        delay,
        distance,
        ii_contribution,
    }
}

fn div_ceil(a: u32, b: u32) -> u32 {
    (a + b - 1) / b
}

fn is_nontrivial(graph: &DepGraph, scc: &[NodeId]) -> bool {
    if scc.len() > 1 {
        return true;
    }
    let only = scc[0];
    graph.out_edges(only).any(|e| e.to == only)
}

/// DFS enumeration of simple cycles confined to `within` (an SCC's node
/// set). Each cycle is reported once per distinct starting node visited
/// during the walk; the caller dedups by node-set.
fn enumerate_simple_cycles(graph: &DepGraph, within: &HashSet<usize>) -> Vec<RawCycle> {
    let mut cycles = Vec::new();
    for &start in within {
        let start = NodeId(start);
        let mut path_nodes = vec![start];
        let mut path_edges: Vec<usize> = Vec::new();
        let mut on_path: HashSet<usize> = HashSet::from([start.0]);
        walk(graph, within, start, start, &mut path_nodes, &mut path_edges, &mut on_path, &mut cycles);
    }
    cycles
}

#[allow(clippy::too_many_arguments)]
fn walk(
    graph: &DepGraph,
    within: &HashSet<usize>,
    start: NodeId,
    current: NodeId,
    path_nodes: &mut Vec<NodeId>,
    path_edges: &mut Vec<usize>,
    on_path: &mut HashSet<usize>,
    out: &mut Vec<RawCycle>,
) {
    for (idx, e) in graph.nodes[current.0]
        .out_edges
        .iter()
        .map(|&i| (i, &graph.edges[i]))
    {
        if !within.contains(&e.to.0) {
            continue;
        }
        if e.to == start {
            out.push(RawCycle {
                nodes: path_nodes.clone(),
                edges: {
                    let mut edges = path_edges.clone();
                    edges.push(idx);
                    edges
                },
            });
            continue;
        }
        if on_path.contains(&e.to.0) {
            continue;
        }
        on_path.insert(e.to.0);
        path_nodes.push(e.to);
        path_edges.push(idx);
        walk(graph, within, start, e.to, path_nodes, path_edges, on_path, out);
        path_nodes.pop();
        path_edges.pop();
        on_path.remove(&e.to.0);
    }
}

/// Tarjan's SCC algorithm; returns components in no particular order.
fn tarjan_scc(graph: &DepGraph) -> Vec<Vec<NodeId>> {
    struct State {
        index: u32,
        indices: HashMap<usize, u32>,
        lowlink: HashMap<usize, u32>,
        on_stack: HashSet<usize>,
        stack: Vec<usize>,
        sccs: Vec<Vec<NodeId>>,
    }

    fn strongconnect(graph: &DepGraph, v: usize, st: &mut State) {
        st.indices.insert(v, st.index);
        st.lowlink.insert(v, st.index);
        st.index += 1;
        st.stack.push(v);
        st.on_stack.insert(v);

        for e in graph.out_edges(NodeId(v)) {
            let w = e.to.0;
            if !st.indices.contains_key(&w) {
                strongconnect(graph, w, st);
                let w_low = st.lowlink[&w];
                let v_low = st.lowlink[&v];
                st.lowlink.insert(v, v_low.min(w_low));
            } else if st.on_stack.contains(&w) {
                let w_idx = st.indices[&w];
                let v_low = st.lowlink[&v];
                st.lowlink.insert(v, v_low.min(w_idx));
            }
        }

        if st.lowlink[&v] == st.indices[&v] {
            let mut component = Vec::new();
            loop {
                let w = st.stack.pop().expect("component root was pushed");
                st.on_stack.remove(&w);
                component.push(NodeId(w));
                if w == v {
                    break;
                }
            }
            st.sccs.push(component);
        }
    }

    let mut st = State {
        index: 0,
        indices: HashMap::new(),
        lowlink: HashMap::new(),
        on_stack: HashSet::new(),
        stack: Vec::new(),
        sccs: Vec::new(),
    };
    for v in 0..graph.len() {
        if !st.indices.contains_key(&v) {
            strongconnect(graph, v, &mut st);
        }
    }
    st.sccs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sms::depgraph::EdgeKind;

    #[test]
    fn self_loop_is_its_own_recurrence() {
        let mut g = DepGraph::with_nodes([1]);
        g.add_edge(NodeId(0), NodeId(0), EdgeKind::True, 1);
        let recs = find_recurrences(&g);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].delay, 1);
        assert_eq!(recs[0].distance, 1);
        assert_eq!(recs[0].ii_contribution, 1);
    }

    #[test]
    fn three_node_cycle_computes_delay_over_distance() {
        // load(3) -> add(1) -> store(1) -> [delta=1] -> load
        let mut g = DepGraph::with_nodes([3, 1, 1]);
        g.add_edge(NodeId(0), NodeId(1), EdgeKind::True, 0);
        g.add_edge(NodeId(1), NodeId(2), EdgeKind::True, 0);
        g.add_edge(NodeId(2), NodeId(0), EdgeKind::True, 1);
        let recs = find_recurrences(&g);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].delay, 5);
        assert_eq!(recs[0].distance, 1);
        assert_eq!(recs[0].ii_contribution, 5);
    }

    #[test]
    fn acyclic_graph_has_no_recurrences() {
        let mut g = DepGraph::with_nodes([1, 1]);
        g.add_edge(NodeId(0), NodeId(1), EdgeKind::True, 0);
        assert!(find_recurrences(&g).is_empty());
    }
}
