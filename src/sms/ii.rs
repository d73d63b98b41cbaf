//! II Initialization (§4.6)
//!
//! `ResMII` from resource pressure, `RecMII` from the worst recurrence,
//! `II₀ = max(ResMII, RecMII)`. This is the true maximum contribution across
//! recurrences, not the bug in the ported-from implementation that returned
//! the caller's previous `MII` guess instead.

use std::collections::HashMap;

use crate::mir::BasicBlock;
use crate::sms::recurrence::Recurrence;
use crate::target::{ResourceId, TargetInfo};

/// `⌈use(r) / min(capacity(r), issue_slots)⌉`, maximized over every resource
/// touched by the loop body.
#[must_use]
pub fn res_mii(block: &BasicBlock, ti: &dyn TargetInfo) -> u32 {
    let mut uses: HashMap<ResourceId, u32> = HashMap::new();
    for instr in &block.instructions {
        for cycle in ti.resource_usage(instr.opcode) {
            for res in cycle {
                *uses.entry(res).or_insert(0) += 1;
            }
        }
    }
    uses
        .into_iter()
        .map(|(res, count)| {
            let denom = ti.resource_capacity(res).min(ti.issue_slots()).max(1);
            div_ceil(count, denom)
        })
        .max()
        .unwrap_or(1)
}

/// Max II contribution across all recurrences; 1 if the loop carries none
/// (a loop that is entirely resource-bound).
#[must_use]
pub fn rec_mii(recurrences: &[Recurrence]) -> u32 {
    recurrences.iter().map(|r| r.ii_contribution).max().unwrap_or(1)
}

#[must_use]
pub fn initial_ii(block: &BasicBlock, ti: &dyn TargetInfo, recurrences: &[Recurrence]) -> u32 {
    res_mii(block, ti).max(rec_mii(recurrences))
}

fn div_ceil(a: u32, b: u32) -> u32 {
    (a + b - 1) / b
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::{BlockId, Instruction, Operand, ValueId};
    use crate::sms::recurrence;
    use crate::sms::depgraph;
    use crate::testutil::{op, StubTarget};

    #[test]
    fn res_mii_from_single_contended_resource() {
        let alu = ResourceId(1);
        let ti = StubTarget::default()
            .with_resource(op::ADD, alu)
            .with_capacity(alu, 1);
        let mut b = BasicBlock::new(BlockId(0));
        b.instructions.push(Instruction::new(op::ADD, [Operand::RegDef(ValueId(1))]));
        b.instructions.push(Instruction::new(op::ADD, [Operand::RegDef(ValueId(2))]));
        b.instructions.push(ti.cbr(ValueId(2), BlockId(0), BlockId(1)));
        b.resync_successors_from_terminator();
        assert_eq!(res_mii(&b, &ti), 2);
    }

    #[test]
    fn scenario_a1_recmii_is_five() {
        let ti = StubTarget::default()
            .with_latency(op::LOAD, 3)
            .with_latency(op::ADD, 1)
            .with_latency(op::STORE, 1);
        let mut b = BasicBlock::new(BlockId(0));
        let r1 = ValueId(1);
        let r2 = ValueId(2);
        b.instructions.push(Instruction::new(op::LOAD, [Operand::RegDef(r1)]));
        b.instructions.push(Instruction::new(op::ADD, [Operand::RegDef(r2), Operand::RegUse(r1)]));
        b.instructions.push(Instruction::new(op::STORE, [Operand::RegUse(r2)]));
        b.instructions.push(ti.cbr(r2, BlockId(0), BlockId(1)));
        b.resync_successors_from_terminator();

        let mut graph = depgraph::build(&b, &ti);
        // the memory dependence closing store -> load is not visible to the
        // register-only builder; add it explicitly as the scenario requires.
        graph.add_edge(depgraph::NodeId(2), depgraph::NodeId(0), depgraph::EdgeKind::MachineReg, 1);

        let recs = recurrence::find_recurrences(&graph);
        assert_eq!(rec_mii(&recs), 5);
    }
}
