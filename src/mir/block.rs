//! Basic blocks
//!
//! # Memory layout
//! - `successors` inlines up to two block ids (the common case: fall-through
//!   pairs and conditional branches); loops and switches spill to the heap.
//! - `predecessors` is derived from every other block's `successors` and is
//!   kept in sync by `Function` whenever a terminator is rewritten.

use smallvec::SmallVec;

use super::{BlockId, Instruction};

/// A basic block: an ordered, straight-line instruction sequence with a
/// single terminator.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    pub instructions: Vec<Instruction>,
    /// Targets of the terminator's `BlockRef` operands, in that order.
    /// Duplicates allowed (e.g. a conditional branch whose arms coincide).
    pub successors: SmallVec<[BlockId; 2]>,
    /// Derived: blocks whose terminator names this block as a successor.
    pub predecessors: SmallVec<[BlockId; 4]>,
    /// Back-pointer to a source-level block this was lowered from, if any.
    /// Carried for diagnostics only; the passes never read it.
    pub source_block: Option<u32>,
}

impl BasicBlock {
    #[must_use]
    pub fn new(id: BlockId) -> Self {
        Self {
            id,
            instructions: Vec::new(),
            successors: SmallVec::new(),
            predecessors: SmallVec::new(),
            source_block: None,
        }
    }

    /// The block's single terminator, if it has any instructions at all.
    #[must_use]
    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions.last()
    }

    #[must_use]
    pub fn terminator_mut(&mut self) -> Option<&mut Instruction> {
        self.instructions.last_mut()
    }

    /// Recompute `successors` from the terminator's `BlockRef` operands.
    /// Call after mutating the terminator directly.
    pub fn resync_successors_from_terminator(&mut self) {
        self.successors = self
            .terminator()
            .map(|t| t.block_refs().collect())
            .unwrap_or_default();
    }

    #[must_use]
    pub fn is_self_loop(&self) -> bool {
        self.successors.iter().any(|&s| s == self.id)
    }
}
