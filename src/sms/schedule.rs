//! Schedule Search (§4.9)
//!
//! Places every node of the (fixed) node order into concrete cycles at the
//! current II, retrying at `II+1` whenever a node finds no free cycle in its
//! search window or the final kernel-compaction verification (I1/I2) fails.
//! The node order and its attributes are computed once at `II₀` (§4.7/§4.8)
//! and reused across every retry; only the window arithmetic and the
//! resource ledger depend on the II being attempted.

use std::collections::HashMap;

use crate::error::{PassError, PassResult};
use crate::mir::{BasicBlock, Opcode};
use crate::sms::attributes::NodeAttrs;
use crate::sms::depgraph::{DepGraph, NodeId};
use crate::sms::recurrence::IgnoreSet;
use crate::target::TargetInfo;

#[derive(Debug, Clone)]
pub struct Schedule {
    pub ii: u32,
    pub cycle_of: HashMap<NodeId, u32>,
    pub stage_of: HashMap<NodeId, u32>,
}

impl Schedule {
    #[must_use]
    pub fn max_stage(&self) -> u32 {
        self.stage_of.values().copied().max().unwrap_or(0)
    }
}

/// Run the II-increment search loop, starting at `initial_ii` and stopping at
/// `max_ii` (inclusive).
pub fn search(
    loop_block: &BasicBlock,
    graph: &DepGraph,
    ignore: &IgnoreSet,
    attrs: &HashMap<NodeId, NodeAttrs>,
    ti: &dyn TargetInfo,
    order: &[NodeId],
    initial_ii: u32,
    max_ii: u32,
) -> PassResult<Schedule> {
    let mut ii = initial_ii.max(1);
    while ii <= max_ii {
        log::trace!("sms: attempting II={ii}");
        if let Some(cycle_of) = attempt(loop_block, graph, ignore, attrs, ti, order, ii) {
            if verify(graph, &cycle_of, ii) {
                let (cycle_of, stage_of) = normalize(cycle_of, ii);
                return Ok(Schedule { ii, cycle_of, stage_of });
            }
        }
        ii += 1;
    }
    Err(PassError::ScheduleInfeasible {
        loop_block: loop_block.id.0,
        max_ii,
    })
}

fn attempt(
    loop_block: &BasicBlock,
    graph: &DepGraph,
    ignore: &IgnoreSet,
    attrs: &HashMap<NodeId, NodeAttrs>,
    ti: &dyn TargetInfo,
    order: &[NodeId],
    ii: u32,
) -> Option<HashMap<NodeId, i64>> {
    let mut cycle_of: HashMap<NodeId, i64> = HashMap::with_capacity(order.len());
    let mut ledger: ResourceLedger = ResourceLedger::default();

    for &v in order {
        let instr_idx = graph.nodes[v.0].instr_index;
        let opcode = loop_block.instructions[instr_idx].opcode;
        let latency_v = i64::from(graph.nodes[v.0].latency);

        if ti.is_branch(opcode) {
            let cyc = i64::from(ii) - 1;
            if !ledger.would_fit(ti, opcode, cyc, ii) {
                return None;
            }
            ledger.commit(ti, opcode, cyc, ii);
            cycle_of.insert(v, cyc);
            continue;
        }

        let mut early: Option<i64> = None;
        for (idx, e) in graph.in_edges_indexed(v) {
            if ignore.contains(idx) {
                continue;
            }
            if let Some(&cu) = cycle_of.get(&e.from) {
                let candidate = cu + i64::from(graph.nodes[e.from.0].latency) - i64::from(e.delta) * i64::from(ii);
                early = Some(early.map_or(candidate, |cur| cur.max(candidate)));
            }
        }
        let mut late: Option<i64> = None;
        for (idx, e) in graph.out_edges_indexed(v) {
            if ignore.contains(idx) {
                continue;
            }
            if let Some(&cw) = cycle_of.get(&e.to) {
                let candidate = cw - latency_v + i64::from(e.delta) * i64::from(ii);
                late = Some(late.map_or(candidate, |cur| cur.min(candidate)));
            }
        }

        let window: Vec<i64> = match (early, late) {
            (Some(es), None) => (es..=es + i64::from(ii) - 1).collect(),
            (None, Some(ls)) => {
                let mut w: Vec<i64> = (ls - i64::from(ii) + 1..=ls).collect();
                w.reverse();
                w
            }
            (Some(es), Some(ls)) => {
                let end = ls.min(es + i64::from(ii) - 1);
                if end < es {
                    Vec::new()
                } else {
                    (es..=end).collect()
                }
            }
            (None, None) => {
                let asap = i64::from(attrs.get(&v).map_or(0, |a| a.asap));
                (asap..=asap + i64::from(ii) - 1).collect()
            }
        };

        let placed = window.into_iter().find(|&cyc| ledger.would_fit(ti, opcode, cyc, ii));
        match placed {
            Some(cyc) => {
                log::trace!("sms: placed node {} at cycle {cyc}", v.0);
                ledger.commit(ti, opcode, cyc, ii);
                cycle_of.insert(v, cyc);
            }
            None => return None,
        }
    }

    Some(cycle_of)
}

/// I1 (no resource over-subscription mod II) is enforced incrementally by
/// the ledger during `attempt`; this checks I2 (dependence latency/δ) over
/// *every* edge, including ignore-set back-edges — those still have to hold
/// once a concrete cycle is chosen, the ignore-set only exempted them from
/// the ordering heuristic.
fn verify(graph: &DepGraph, cycle_of: &HashMap<NodeId, i64>, ii: u32) -> bool {
    for e in &graph.edges {
        let (Some(&cu), Some(&cv)) = (cycle_of.get(&e.from), cycle_of.get(&e.to)) else {
            return false;
        };
        let required = cu + i64::from(graph.nodes[e.from.0].latency) - i64::from(e.delta) * i64::from(ii);
        if cv < required {
            return false;
        }
    }
    true
}

fn normalize(cycle_of: HashMap<NodeId, i64>, ii: u32) -> (HashMap<NodeId, u32>, HashMap<NodeId, u32>) {
    let min_cycle = cycle_of.values().copied().min().unwrap_or(0);
    let mut cycles = HashMap::with_capacity(cycle_of.len());
    let mut stages = HashMap::with_capacity(cycle_of.len());
    for (node, cyc) in cycle_of {
        let shifted = (cyc - min_cycle) as u32;
        cycles.insert(node, shifted);
        stages.insert(node, shifted / ii);
    }
    (cycles, stages)
}

#[derive(Debug, Default)]
struct ResourceLedger {
    usage: HashMap<(u16, u32), u32>,
}

impl ResourceLedger {
    fn would_fit(&self, ti: &dyn TargetInfo, opcode: Opcode, cycle: i64, ii: u32) -> bool {
        for (offset, slot_resources) in ti.resource_usage(opcode).into_iter().enumerate() {
            let slot = rem_euclid(cycle + offset as i64, i64::from(ii));
            for res in slot_resources {
                let current = self.usage.get(&(res.0, slot)).copied().unwrap_or(0);
                if current + 1 > ti.resource_capacity(res) {
                    return false;
                }
            }
        }
        true
    }

    fn commit(&mut self, ti: &dyn TargetInfo, opcode: Opcode, cycle: i64, ii: u32) {
        for (offset, slot_resources) in ti.resource_usage(opcode).into_iter().enumerate() {
            let slot = rem_euclid(cycle + offset as i64, i64::from(ii));
            for res in slot_resources {
                *self.usage.entry((res.0, slot)).or_insert(0) += 1;
            }
        }
    }
}

fn rem_euclid(a: i64, b: i64) -> u32 {
    ((a % b + b) % b) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::{BlockId, Instruction, Operand, ValueId};
    use crate::sms::{attributes, depgraph, ii, ordering, recurrence};
    use crate::testutil::{op, StubTarget};

    fn scenario_a1_block(ti: &StubTarget) -> BasicBlock {
        let mut b = BasicBlock::new(BlockId(0));
        let r1 = ValueId(1);
        let r2 = ValueId(2);
        b.instructions.push(Instruction::new(op::LOAD, [Operand::RegDef(r1)]));
        b.instructions.push(Instruction::new(op::ADD, [Operand::RegDef(r2), Operand::RegUse(r1)]));
        b.instructions.push(Instruction::new(op::STORE, [Operand::RegUse(r2)]));
        b.instructions.push(ti.cbr(r2, BlockId(0), BlockId(1)));
        b.resync_successors_from_terminator();
        b
    }

    #[test]
    fn scenario_a1_converges_at_ii_five_with_three_stages() {
        let load_unit = crate::target::ResourceId(1);
        let alu = crate::target::ResourceId(2);
        let store_unit = crate::target::ResourceId(3);
        let ti = StubTarget::default()
            .with_latency(op::LOAD, 3)
            .with_latency(op::ADD, 1)
            .with_latency(op::STORE, 1)
            .with_resource(op::LOAD, load_unit)
            .with_resource(op::ADD, alu)
            .with_resource(op::STORE, store_unit)
            .with_capacity(load_unit, 1)
            .with_capacity(alu, 1)
            .with_capacity(store_unit, 1);
        let block = scenario_a1_block(&ti);

        let mut graph = depgraph::build(&block, &ti);
        graph.add_edge(depgraph::NodeId(2), depgraph::NodeId(0), depgraph::EdgeKind::MachineReg, 1);

        let recs = recurrence::find_recurrences(&graph);
        let ignore = recurrence::select_ignore_set(&graph, &recs);
        let ii0 = ii::initial_ii(&block, &ti, &recs);
        assert_eq!(ii0, 5);

        let attrs = attributes::compute(&graph, &ignore, ii0);
        let sets = ordering::partial_order_sets(&graph, &ignore, &recs);
        let order = ordering::linearize(&graph, &ignore, &sets, &attrs);

        let schedule = search(&block, &graph, &ignore, &attrs, &ti, &order, ii0, 64).unwrap();
        assert_eq!(schedule.ii, 5);
        // delay(=5) == II here, so the whole iteration fits in one II
        // window: zero pipeline overlap, one stage holding all three
        // instructions at distinct cycles.
        assert_eq!(schedule.max_stage(), 0);
        assert_eq!(schedule.cycle_of.len(), 4);
    }

    #[test]
    fn scenario_a2_self_recurrence_converges_at_ii_one() {
        let ti = StubTarget::default().with_latency(op::ADD, 1);
        let mut b = BasicBlock::new(BlockId(0));
        let r1 = ValueId(1);
        b.instructions.push(Instruction::new(op::ADD, [Operand::RegDef(r1), Operand::RegUse(r1)]));
        b.instructions.push(ti.cbr(r1, BlockId(0), BlockId(1)));
        b.resync_successors_from_terminator();

        let graph = depgraph::build(&b, &ti);
        let recs = recurrence::find_recurrences(&graph);
        let ignore = recurrence::select_ignore_set(&graph, &recs);
        let ii0 = ii::initial_ii(&b, &ti, &recs);
        assert_eq!(ii0, 1);

        let attrs = attributes::compute(&graph, &ignore, ii0);
        let sets = ordering::partial_order_sets(&graph, &ignore, &recs);
        let order = ordering::linearize(&graph, &ignore, &sets, &attrs);

        let schedule = search(&b, &graph, &ignore, &attrs, &ti, &order, ii0, 16).unwrap();
        assert_eq!(schedule.ii, 1);
        assert_eq!(schedule.max_stage(), 0);
    }
}
