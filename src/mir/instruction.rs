//! Machine instructions
//!
//! Deliberately thin: the opcode's meaning (is it a call, a branch, how many
//! cycles it costs) lives entirely behind `TargetInfo` (see `crate::target`),
//! never here.

use smallvec::SmallVec;

use super::{BlockId, Opcode, Operand, ValueId};

/// Source-level debug tag. Carried through clones for traceability; the
/// passes make no promise about its fidelity across rewriting (debug-info
/// fidelity is explicitly out of scope).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub struct DebugLoc {
    pub line: u32,
    pub col: u32,
}

/// A single machine instruction: an opcode plus its ordered operands.
///
/// Most instructions have at most a handful of operands (two sources, one
/// destination, maybe an immediate), so `operands` inlines up to four before
/// spilling to the heap.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operands: SmallVec<[Operand; 4]>,
    pub debug_loc: Option<DebugLoc>,
}

impl Instruction {
    #[must_use]
    pub fn new(opcode: Opcode, operands: impl IntoIterator<Item = Operand>) -> Self {
        Self {
            opcode,
            operands: operands.into_iter().collect(),
            debug_loc: None,
        }
    }

    #[must_use]
    pub fn with_debug_loc(mut self, loc: DebugLoc) -> Self {
        self.debug_loc = Some(loc);
        self
    }

    /// All values this instruction defines (writes).
    pub fn defs(&self) -> impl Iterator<Item = ValueId> + '_ {
        self.operands.iter().filter_map(Operand::as_value_def)
    }

    /// All values this instruction uses (reads), including branch conditions.
    pub fn uses(&self) -> impl Iterator<Item = ValueId> + '_ {
        self.operands.iter().filter_map(Operand::as_value_use)
    }

    /// Block targets referenced by this instruction, in operand order.
    pub fn block_refs(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.operands.iter().filter_map(Operand::as_block_ref)
    }

    /// Rewrite every `BlockRef(old)` operand to `BlockRef(new)`. Used by both
    /// cores to redirect branch targets without touching anything else about
    /// the instruction.
    pub fn replace_block_ref(&mut self, old: BlockId, new: BlockId) -> bool {
        let mut changed = false;
        for op in &mut self.operands {
            if let Operand::BlockRef(b) = op {
                if *b == old {
                    *b = new;
                    changed = true;
                }
            }
        }
        changed
    }

    /// Rewrite every use of `old` to `new` (defs are left alone; renaming a
    /// def is a different operation — see `Instruction::rename_def`).
    pub fn rename_use(&mut self, old: ValueId, new: ValueId) -> bool {
        let mut changed = false;
        for op in &mut self.operands {
            match op {
                Operand::RegUse(v) | Operand::ValueRef(v) if *v == old => {
                    *v = new;
                    changed = true;
                }
                _ => {}
            }
        }
        changed
    }

    /// Rewrite the (single) def operand equal to `old` to `new`.
    pub fn rename_def(&mut self, old: ValueId, new: ValueId) -> bool {
        let mut changed = false;
        for op in &mut self.operands {
            if let Operand::RegDef(v) = op {
                if *v == old {
                    *v = new;
                    changed = true;
                }
            }
        }
        changed
    }
}
