//! Dependence Graph Builder (DGB, §4.3)
//!
//! Builds one node per instruction in a (already eligibility-checked) loop
//! block, and emits True (def→use), Anti (use→def), and Output (def→def)
//! edges, each tagged with an iteration difference δ: 0 for an intra-
//! iteration edge, 1 for a loop-carried edge where the producer executes one
//! iteration before the consumer.
//!
//! # Physical registers, not SSA values
//! The block is post-register-allocation MIR (§6), so a `ValueId` names a
//! physical register slot that can be legally redefined multiple times
//! within the same block — each redefinition is a fresh def *site* (distinct
//! instruction position) for the same value id. Dependence edges are derived
//! purely from the def/use positions of each value id; no alias or liveness
//! information beyond "do these two instructions name the same value id" is
//! assumed. `EdgeKind::MachineReg` is reserved for implicit per-opcode
//! register effects (condition flags, stack pointer); the abstract
//! `TargetInfo` in §4.1 does not expose implicit defs/uses, so this builder
//! never emits that kind — a real target integration would extend the
//! interface to do so.

use std::collections::HashMap;

use smallvec::SmallVec;

use crate::mir::{BasicBlock, ValueId};
use crate::target::TargetInfo;

/// Index of a node within a `DepGraph`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    True,
    Anti,
    Output,
    MachineReg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepEdge {
    pub from: NodeId,
    pub to: NodeId,
    pub kind: EdgeKind,
    /// Iteration difference δ ≥ 0; 0 is intra-iteration, 1 is loop-carried
    /// by exactly one iteration.
    pub delta: u32,
}

/// One instruction of the loop block, wrapped with its scheduling latency
/// and adjacency into the edge list.
#[derive(Debug, Clone)]
pub struct DepNode {
    /// Position of the wrapped instruction within the loop block.
    pub instr_index: usize,
    pub latency: u32,
    pub out_edges: SmallVec<[usize; 4]>,
    pub in_edges: SmallVec<[usize; 4]>,
}

/// The dependence graph for one loop block.
#[derive(Debug, Clone, Default)]
pub struct DepGraph {
    pub nodes: Vec<DepNode>,
    pub edges: Vec<DepEdge>,
}

impl DepGraph {
    pub fn with_nodes(latencies: impl IntoIterator<Item = u32>) -> Self {
        let nodes = latencies
            .into_iter()
            .enumerate()
            .map(|(i, latency)| DepNode {
                instr_index: i,
                latency,
                out_edges: SmallVec::new(),
                in_edges: SmallVec::new(),
            })
            .collect();
        Self { nodes, edges: Vec::new() }
    }

    pub fn add_edge(&mut self, from: NodeId, to: NodeId, kind: EdgeKind, delta: u32) {
        let idx = self.edges.len();
        self.edges.push(DepEdge { from, to, kind, delta });
        self.nodes[from.0].out_edges.push(idx);
        self.nodes[to.0].in_edges.push(idx);
    }

    pub fn out_edges(&self, n: NodeId) -> impl Iterator<Item = &DepEdge> {
        self.nodes[n.0].out_edges.iter().map(move |&i| &self.edges[i])
    }

    pub fn in_edges(&self, n: NodeId) -> impl Iterator<Item = &DepEdge> {
        self.nodes[n.0].in_edges.iter().map(move |&i| &self.edges[i])
    }

    /// Same as `out_edges` but paired with each edge's index into `self.edges`,
    /// needed by callers that check an edge against an `IgnoreSet`.
    pub(crate) fn out_edges_indexed(&self, n: NodeId) -> impl Iterator<Item = (usize, &DepEdge)> {
        self.nodes[n.0].out_edges.iter().map(move |&i| (i, &self.edges[i]))
    }

    pub(crate) fn in_edges_indexed(&self, n: NodeId) -> impl Iterator<Item = (usize, &DepEdge)> {
        self.nodes[n.0].in_edges.iter().map(move |&i| (i, &self.edges[i]))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Instruction positions that define and use each value in `block`, in
/// program order. Shared between the DGB itself and the Loop Rewriter's
/// values-to-save analysis (§4.10), which needs the same "which def services
/// which use" reasoning but keyed by schedule stage rather than by edge.
pub(crate) fn defs_and_uses(block: &BasicBlock) -> (HashMap<ValueId, Vec<usize>>, HashMap<ValueId, Vec<usize>>) {
    let mut defs_by_value: HashMap<ValueId, Vec<usize>> = HashMap::new();
    let mut uses_by_value: HashMap<ValueId, Vec<usize>> = HashMap::new();
    for (idx, instr) in block.instructions.iter().enumerate() {
        for v in instr.defs() {
            defs_by_value.entry(v).or_default().push(idx);
        }
        for v in instr.uses() {
            uses_by_value.entry(v).or_default().push(idx);
        }
    }
    (defs_by_value, uses_by_value)
}

/// The def position (and iteration difference) servicing a use at `q`,
/// wrapping to the last def in `defs` (δ=1) if none precedes `q`.
pub(crate) fn true_source(defs: &[usize], q: usize) -> (usize, u32) {
    match defs.iter().rev().find(|&&d| d <= q) {
        Some(&d) => (d, 0),
        None => (*defs.last().expect("value has at least one def"), 1),
    }
}

/// Build the dependence graph for `block` (already confirmed eligible by
/// `eligibility::check_eligible`).
#[must_use]
pub fn build(block: &BasicBlock, ti: &dyn TargetInfo) -> DepGraph {
    let latencies = block.instructions.iter().map(|i| ti.cycle_cost(i));
    let mut graph = DepGraph::with_nodes(latencies);

    let (defs_by_value, uses_by_value) = defs_and_uses(block);

    for (value, uses) in &uses_by_value {
        let Some(defs) = defs_by_value.get(value) else {
            continue; // live-in to the loop, not produced inside it
        };
        let defs = defs.as_slice();

        // True edges: each use picks the nearest preceding def (wrapping to
        // the last def, δ=1, if none precedes it in program order).
        for &q in uses {
            let (src, delta) = true_source(defs, q);
            graph.add_edge(NodeId(src), NodeId(q), EdgeKind::True, delta);
        }

        // Anti and Output edges: walk consecutive def occurrences
        // (cyclically) and attach the uses serviced by the earlier def to
        // the later one.
        for (i, &p) in defs.iter().enumerate() {
            let (prev, wraps_to_p) = if i > 0 {
                (defs[i - 1], false)
            } else {
                (*defs.last().unwrap(), defs.len() > 0)
            };
            let output_delta = if i > 0 { 0 } else { u32::from(wraps_to_p) };
            if defs.len() > 1 || i == 0 {
                graph.add_edge(NodeId(prev), NodeId(p), EdgeKind::Output, output_delta);
            }

            for &q in uses {
                let (src, true_delta) = true_source(defs, q);
                if src != prev {
                    continue;
                }
                let anti_delta = if i > 0 {
                    0
                } else {
                    u32::from(true_delta == 0)
                };
                graph.add_edge(NodeId(q), NodeId(p), EdgeKind::Anti, anti_delta);
            }
        }
    }

    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::{BasicBlock, BlockId, Instruction, Operand, ValueId};
    use crate::testutil::{op, StubTarget};

    fn add(dst: ValueId, src: ValueId) -> Instruction {
        Instruction::new(op::ADD, [Operand::RegDef(dst), Operand::RegUse(src)])
    }

    #[test]
    fn single_accumulator_carries_true_and_anti_and_output_edges() {
        // r1 = r1 + 1 ; self-recurrence (scenario A2's shape)
        let ti = StubTarget::default().with_latency(op::ADD, 1);
        let mut b = BasicBlock::new(BlockId(0));
        let r1 = ValueId(1);
        b.instructions.push(add(r1, r1));
        b.instructions.push(ti.cbr(r1, BlockId(0), BlockId(1)));
        b.resync_successors_from_terminator();

        let g = build(&b, &ti);
        assert_eq!(g.len(), 2);

        let true_edges: Vec<_> = g.edges.iter().filter(|e| e.kind == EdgeKind::True).collect();
        assert!(true_edges.iter().any(|e| e.from == NodeId(0) && e.to == NodeId(0) && e.delta == 1));
        // the branch's condition use of r1 is serviced intra-iteration.
        assert!(true_edges.iter().any(|e| e.from == NodeId(0) && e.to == NodeId(1) && e.delta == 0));

        let anti_edges: Vec<_> = g.edges.iter().filter(|e| e.kind == EdgeKind::Anti).collect();
        assert!(anti_edges.iter().any(|e| e.from == NodeId(0) && e.to == NodeId(0) && e.delta == 1));

        let output_edges: Vec<_> = g.edges.iter().filter(|e| e.kind == EdgeKind::Output).collect();
        assert!(output_edges.iter().any(|e| e.from == NodeId(0) && e.to == NodeId(0) && e.delta == 1));
    }

    #[test]
    fn live_in_value_gets_no_edges() {
        let ti = StubTarget::default();
        let mut b = BasicBlock::new(BlockId(0));
        let live_in = ValueId(9);
        let dst = ValueId(1);
        b.instructions.push(add(dst, live_in));
        b.instructions.push(ti.cbr(dst, BlockId(0), BlockId(1)));
        b.resync_successors_from_terminator();

        let g = build(&b, &ti);
        assert!(g.in_edges(NodeId(0)).next().is_none());
    }
}
