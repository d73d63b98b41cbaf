//! Target Interface
//!
//! Abstract access to everything the scheduling and balancing cores need to
//! know about the concrete target machine: opcode classification, cycle
//! costs, resource usage, and a handful of instruction templates. Instruction
//! selection, register allocation, and the actual opcode tables are owned by
//! the surrounding compiler and never appear here — this trait is the only
//! seam the cores touch.
//!
//! No method here has side effects; implementations are expected to be
//! simple table lookups over the target's opcode space.

use smallvec::SmallVec;

use crate::mir::{BlockId, Instruction, Opcode, ValueId};

/// Identifier for a target resource (functional unit, issue port, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u16);

/// One cycle's worth of resource occupancy for an instruction: the set of
/// resources it holds during that cycle relative to its issue cycle.
pub type ResourceCycle = SmallVec<[ResourceId; 4]>;

/// Abstract description of the target machine.
///
/// Implementations are expected to be thin wrappers over a target's
/// instruction-description tables (itineraries, opcode enums); none of the
/// methods below allocate beyond what's needed to hand back a small vector.
pub trait TargetInfo {
    /// True if `op` transfers control to a callee and expects to return.
    fn is_call(&self, op: Opcode) -> bool;

    /// True if `op` is any kind of branch (conditional or unconditional).
    fn is_branch(&self, op: Opcode) -> bool;

    /// True if `op` has no architectural effect (a scheduling filler).
    fn is_nop(&self, op: Opcode) -> bool;

    /// Latency, in cycles, before `instr`'s results are available.
    fn cycle_cost(&self, instr: &Instruction) -> u32;

    /// Resource occupancy for one issue of `op`, one entry per cycle of its
    /// pipeline starting at the issue cycle. Empty means the opcode holds no
    /// tracked resource (e.g. a pure register move).
    fn resource_usage(&self, op: Opcode) -> SmallVec<[ResourceCycle; 4]>;

    /// Number of instructions that can issue in a single cycle.
    fn issue_slots(&self) -> u32;

    /// How many instances of resource `res` the target has.
    fn resource_capacity(&self, res: ResourceId) -> u32;

    /// The opcode used for cycle-padding filler instructions.
    fn nop_opcode(&self) -> Opcode;

    /// Build an unconditional branch instruction to `target`.
    fn unconditional_branch(&self, target: BlockId) -> Instruction;

    /// Build a register copy instruction `dst = src`.
    fn copy_register(&self, src: ValueId, dst: ValueId) -> Instruction;

    /// Build a φ-node with the given (incoming-block, incoming-value) pairs,
    /// producing `dst`.
    fn phi(&self, inputs: &[(BlockId, ValueId)], dst: ValueId) -> Instruction;

    /// Build a single NOP instruction.
    fn nop(&self) -> Instruction {
        Instruction::new(self.nop_opcode(), [])
    }
}
