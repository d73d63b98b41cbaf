//! Machine IR
//!
//! The in-memory control-flow graph that the scheduling and balancing passes
//! read and rewrite: functions own an ordered list of basic blocks, blocks own
//! an ordered list of instructions.
//!
//! # Terminator convention
//! Every block ends with exactly one terminator instruction (the last entry in
//! `instructions`). A terminator's `BlockRef` operands are, in order, its
//! control-flow targets; `successors` is always kept equal to that operand
//! list (duplicates allowed, e.g. a conditional branch whose true and false
//! targets coincide). There is no implicit fall-through: every edge is spelled
//! out as a `BlockRef` operand.

pub mod block;
pub mod function;
pub mod instruction;
pub mod operand;

pub use block::BasicBlock;
pub use function::Function;
pub use instruction::{DebugLoc, Instruction};
pub use operand::Operand;

/// Identifier for a basic block, unique within its owning function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct BlockId(pub u32);

/// Identifier for an SSA-ish value (a register, virtual or physical).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct ValueId(pub u32);

/// Opaque target-defined opcode. The cores never interpret the numeric value
/// directly; all classification goes through `TargetInfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Opcode(pub u16);

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

impl std::fmt::Display for ValueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "%{}", self.0)
    }
}
