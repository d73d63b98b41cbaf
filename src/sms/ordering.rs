//! Partial Order Construction & Node Ordering (§4.7, §4.8)
//!
//! §4.7 groups the dependence graph's nodes into partial-order sets, one per
//! recurrence (highest II contribution first) plus a trailing set of
//! whatever is left over. §4.8 linearizes each set into the schedule
//! search's `FinalOrder`, alternating a TopDown sweep (by Height, ties by
//! MOB) and a BottomUp sweep (by Depth, ties by MOB) as the working frontier
//! runs dry.

use std::collections::HashMap;

use crate::sms::attributes::NodeAttrs;
use crate::sms::depgraph::{DepGraph, NodeId};
use crate::sms::recurrence::{IgnoreSet, Recurrence};

/// Group nodes into partial-order sets per §4.7.
#[must_use]
pub fn partial_order_sets(graph: &DepGraph, ignore: &IgnoreSet, recurrences: &[Recurrence]) -> Vec<Vec<NodeId>> {
    let mut sorted: Vec<&Recurrence> = recurrences.iter().collect();
    sorted.sort_by(|a, b| b.ii_contribution.cmp(&a.ii_contribution));

    let mut placed: Vec<bool> = vec![false; graph.len()];
    let mut sets = Vec::new();

    for (i, rec) in sorted.iter().enumerate() {
        let mut set: Vec<NodeId> = rec.nodes.iter().copied().filter(|n| !placed[n.0]).collect();
        if set.is_empty() {
            continue;
        }
        if i == 0 {
            let mut seeded = Vec::new();
            for &n in &set {
                for (idx, e) in graph.in_edges_indexed(n) {
                    if ignore.contains(idx) {
                        continue;
                    }
                    if !placed[e.from.0] && !set.contains(&e.from) && !seeded.contains(&e.from) {
                        seeded.push(e.from);
                    }
                }
            }
            set.extend(seeded);
        }
        for &n in &set {
            placed[n.0] = true;
        }
        sets.push(set);
    }

    let leftover: Vec<NodeId> = (0..graph.len()).filter(|&i| !placed[i]).map(NodeId).collect();
    if !leftover.is_empty() {
        sets.push(leftover);
    }
    sets
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    TopDown,
    BottomUp,
}

/// Linearize every partial-order set into one schedule-search order.
#[must_use]
pub fn linearize(
    graph: &DepGraph,
    ignore: &IgnoreSet,
    sets: &[Vec<NodeId>],
    attrs: &HashMap<NodeId, NodeAttrs>,
) -> Vec<NodeId> {
    let mut final_order: Vec<NodeId> = Vec::new();
    let mut in_final: Vec<bool> = vec![false; graph.len()];

    for set in sets {
        let membership: Vec<bool> = {
            let mut m = vec![false; graph.len()];
            for &n in set {
                m[n.0] = true;
            }
            m
        };
        let mut remaining: Vec<bool> = membership.clone();
        let mut remaining_count = set.len();

        let preds_of_final = nodes_feeding_final(graph, ignore, &in_final, &membership, true);
        let (mut direction, mut frontier) = if !preds_of_final.is_empty() {
            (Direction::BottomUp, preds_of_final)
        } else {
            let succs_of_final = nodes_feeding_final(graph, ignore, &in_final, &membership, false);
            if !succs_of_final.is_empty() {
                (Direction::TopDown, succs_of_final)
            } else {
                let best = set
                    .iter()
                    .copied()
                    .max_by_key(|n| attrs.get(n).map_or(0, |a| a.asap))
                    .expect("set is non-empty");
                (Direction::BottomUp, vec![best])
            }
        };

        while remaining_count > 0 {
            if frontier.is_empty() {
                direction = match direction {
                    Direction::TopDown => Direction::BottomUp,
                    Direction::BottomUp => Direction::TopDown,
                };
                frontier = nodes_feeding_final(graph, ignore, &in_final, &membership, direction == Direction::BottomUp);
                if frontier.is_empty() {
                    // Nothing left reachable from FinalOrder; pick any
                    // remaining node by ASAP to keep progress monotonic.
                    if let Some(&n) = set.iter().find(|n| remaining[n.0]) {
                        frontier.push(n);
                    } else {
                        break;
                    }
                }
            }

            let pick_idx = frontier
                .iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| compare_candidates(attrs, direction, **a, **b))
                .map(|(i, _)| i)
                .expect("frontier is non-empty here");
            let picked = frontier.remove(pick_idx);
            if !remaining[picked.0] {
                continue;
            }
            remaining[picked.0] = false;
            remaining_count -= 1;
            final_order.push(picked);
            in_final[picked.0] = true;

            let expand_successors = direction == Direction::TopDown;
            let next_nodes: Vec<NodeId> = if expand_successors {
                graph
                    .out_edges_indexed(picked)
                    .filter(|(idx, _)| !ignore.contains(*idx))
                    .map(|(_, e)| e.to)
                    .collect()
            } else {
                graph
                    .in_edges_indexed(picked)
                    .filter(|(idx, _)| !ignore.contains(*idx))
                    .map(|(_, e)| e.from)
                    .collect()
            };
            for n in next_nodes {
                if membership[n.0] && remaining[n.0] && !frontier.contains(&n) {
                    frontier.push(n);
                }
            }
        }
    }

    final_order
}

/// Nodes in `membership` that connect to something already in `final`:
/// predecessors of `final` (when `want_preds`) or successors (otherwise).
fn nodes_feeding_final(
    graph: &DepGraph,
    ignore: &IgnoreSet,
    in_final: &[bool],
    membership: &[bool],
    want_preds: bool,
) -> Vec<NodeId> {
    let mut out = Vec::new();
    for i in 0..graph.len() {
        if !in_final[i] {
            continue;
        }
        let node = NodeId(i);
        let candidates: Vec<NodeId> = if want_preds {
            graph
                .in_edges_indexed(node)
                .filter(|(idx, _)| !ignore.contains(*idx))
                .map(|(_, e)| e.from)
                .collect()
        } else {
            graph
                .out_edges_indexed(node)
                .filter(|(idx, _)| !ignore.contains(*idx))
                .map(|(_, e)| e.to)
                .collect()
        };
        for c in candidates {
            if membership[c.0] && !in_final[c.0] && !out.contains(&c) {
                out.push(c);
            }
        }
    }
    out
}

fn compare_candidates(
    attrs: &HashMap<NodeId, NodeAttrs>,
    direction: Direction,
    a: NodeId,
    b: NodeId,
) -> std::cmp::Ordering {
    let aa = attrs.get(&a).copied().unwrap_or_default();
    let ab = attrs.get(&b).copied().unwrap_or_default();
    let (primary_a, primary_b) = match direction {
        Direction::TopDown => (aa.height, ab.height),
        Direction::BottomUp => (aa.depth, ab.depth),
    };
    // Max primary, then min MOB — expressed as (primary, -mob) comparisons
    // so `max_by` picks the right candidate under a single ordering.
    primary_a
        .cmp(&primary_b)
        .then_with(|| ab.mob.cmp(&aa.mob))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sms::attributes;
    use crate::sms::depgraph::EdgeKind;
    use crate::sms::recurrence;

    #[test]
    fn partial_order_seeds_first_set_with_predecessors() {
        // chain 0 -> 1 -> 2, plus self-loop recurrence on node 1.
        let mut g = DepGraph::with_nodes([1, 1, 1]);
        g.add_edge(NodeId(0), NodeId(1), EdgeKind::True, 0);
        g.add_edge(NodeId(1), NodeId(1), EdgeKind::True, 1);
        g.add_edge(NodeId(1), NodeId(2), EdgeKind::True, 0);

        let recs = recurrence::find_recurrences(&g);
        let ignore = recurrence::select_ignore_set(&g, &recs);
        let sets = partial_order_sets(&g, &ignore, &recs);

        assert_eq!(sets[0].iter().filter(|&&n| n == NodeId(1)).count(), 1);
        assert!(sets[0].contains(&NodeId(0)));
    }

    #[test]
    fn linearize_covers_every_node_exactly_once() {
        let mut g = DepGraph::with_nodes([3, 1, 1]);
        g.add_edge(NodeId(0), NodeId(1), EdgeKind::True, 0);
        g.add_edge(NodeId(1), NodeId(2), EdgeKind::True, 0);
        g.add_edge(NodeId(2), NodeId(0), EdgeKind::MachineReg, 1);

        let recs = recurrence::find_recurrences(&g);
        let ignore = recurrence::select_ignore_set(&g, &recs);
        let attrs = attributes::compute(&g, &ignore, 5);
        let sets = partial_order_sets(&g, &ignore, &recs);
        let order = linearize(&g, &ignore, &sets, &attrs);

        assert_eq!(order.len(), 3);
        let mut sorted = order.iter().map(|n| n.0).collect::<Vec<_>>();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2]);
    }
}
