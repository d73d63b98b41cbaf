//! Instruction operands
//!
//! Tagged variant rather than an inheritance hierarchy: every operand kind the
//! cores need to see (register use/def, immediate, block reference, value
//! reference for branch conditions) is one flat enum.

use super::{BlockId, ValueId};

/// A single instruction operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Operand {
    /// Use of a value (register read).
    RegUse(ValueId),
    /// Definition of a value (register write).
    RegDef(ValueId),
    /// A signed immediate.
    Imm(i64),
    /// Reference to a successor block (branch target).
    BlockRef(BlockId),
    /// Reference to a value used for something other than a plain register
    /// read, e.g. the condition of a conditional branch.
    ValueRef(ValueId),
}

impl Operand {
    #[must_use]
    pub fn as_value_def(&self) -> Option<ValueId> {
        match self {
            Operand::RegDef(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_value_use(&self) -> Option<ValueId> {
        match self {
            Operand::RegUse(v) | Operand::ValueRef(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_block_ref(&self) -> Option<BlockId> {
        match self {
            Operand::BlockRef(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_block_ref(&self) -> bool {
        matches!(self, Operand::BlockRef(_))
    }
}
