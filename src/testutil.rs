//! A minimal in-memory `TargetInfo` used by this crate's own unit tests and
//! by the integration tests under `tests/`. Not part of the crate's public
//! contract beyond "useful for testing against"; real targets implement
//! `TargetInfo` against their own opcode tables instead.

use std::collections::HashMap;

use smallvec::{smallvec, SmallVec};

use crate::mir::{BlockId, Instruction, Opcode, Operand, ValueId};
use crate::target::{ResourceCycle, ResourceId, TargetInfo};

/// Opcodes recognized by `StubTarget`. Any other `Opcode` value is treated
/// as an ordinary single-cycle, resource-free instruction.
pub mod op {
    use crate::mir::Opcode;

    pub const ADD: Opcode = Opcode(1);
    pub const LOAD: Opcode = Opcode(2);
    pub const STORE: Opcode = Opcode(3);
    pub const CALL: Opcode = Opcode(4);
    pub const BR: Opcode = Opcode(5);
    pub const CBR: Opcode = Opcode(6);
    pub const NOP: Opcode = Opcode(7);
    pub const COPY: Opcode = Opcode(8);
    pub const PHI: Opcode = Opcode(9);
    pub const MUL: Opcode = Opcode(10);
}

/// A configurable stand-in target: per-opcode latency and resource usage,
/// per-resource capacity, and a fixed issue width.
#[derive(Debug, Clone)]
pub struct StubTarget {
    pub latencies: HashMap<Opcode, u32>,
    pub resources: HashMap<Opcode, SmallVec<[ResourceCycle; 4]>>,
    pub capacities: HashMap<ResourceId, u32>,
    pub issue_slots: u32,
}

impl Default for StubTarget {
    fn default() -> Self {
        Self {
            latencies: HashMap::new(),
            resources: HashMap::new(),
            capacities: HashMap::new(),
            issue_slots: 4,
        }
    }
}

impl StubTarget {
    #[must_use]
    pub fn with_latency(mut self, op: Opcode, cycles: u32) -> Self {
        self.latencies.insert(op, cycles);
        self
    }

    #[must_use]
    pub fn with_resource(mut self, op: Opcode, res: ResourceId) -> Self {
        self.resources.entry(op).or_default().push(smallvec![res]);
        self
    }

    #[must_use]
    pub fn with_capacity(mut self, res: ResourceId, cap: u32) -> Self {
        self.capacities.insert(res, cap);
        self
    }

    pub fn cbr(&self, cond: ValueId, t: BlockId, f: BlockId) -> Instruction {
        Instruction::new(op::CBR, [Operand::ValueRef(cond), Operand::BlockRef(t), Operand::BlockRef(f)])
    }

    pub fn call(&self) -> Instruction {
        Instruction::new(op::CALL, [])
    }
}

impl TargetInfo for StubTarget {
    fn is_call(&self, op: Opcode) -> bool {
        op == op::CALL
    }

    fn is_branch(&self, op: Opcode) -> bool {
        op == op::BR || op == op::CBR
    }

    fn is_nop(&self, op: Opcode) -> bool {
        op == op::NOP
    }

    fn cycle_cost(&self, instr: &Instruction) -> u32 {
        self.latencies.get(&instr.opcode).copied().unwrap_or(1)
    }

    fn resource_usage(&self, op: Opcode) -> SmallVec<[ResourceCycle; 4]> {
        self.resources.get(&op).cloned().unwrap_or_default()
    }

    fn issue_slots(&self) -> u32 {
        self.issue_slots
    }

    fn resource_capacity(&self, res: ResourceId) -> u32 {
        self.capacities.get(&res).copied().unwrap_or(1)
    }

    fn nop_opcode(&self) -> Opcode {
        op::NOP
    }

    fn unconditional_branch(&self, target: BlockId) -> Instruction {
        Instruction::new(op::BR, [Operand::BlockRef(target)])
    }

    fn copy_register(&self, src: ValueId, dst: ValueId) -> Instruction {
        Instruction::new(op::COPY, [Operand::RegDef(dst), Operand::RegUse(src)])
    }

    fn phi(&self, inputs: &[(BlockId, ValueId)], dst: ValueId) -> Instruction {
        let mut operands: SmallVec<[Operand; 4]> = smallvec![Operand::RegDef(dst)];
        for &(b, v) in inputs {
            operands.push(Operand::BlockRef(b));
            operands.push(Operand::ValueRef(v));
        }
        Instruction {
            opcode: op::PHI,
            operands,
            debug_loc: None,
        }
    }
}
