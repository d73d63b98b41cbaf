//! Functions: the top-level MIR unit the passes operate on.

use std::collections::HashMap;

use crate::error::{PassError, PassResult};

use super::{BasicBlock, BlockId, ValueId};

/// A function: an ordered list of basic blocks, entry first.
///
/// Block order is otherwise unconstrained — both cores insert new blocks
/// wherever is convenient (prologues/epilogues before/after the kernel,
/// dummy blocks next to the edge they sit on) and only ever rely on
/// `blocks[0]` being the entry.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub blocks: Vec<BasicBlock>,
    next_block_id: u32,
    next_value_id: u32,
}

impl Function {
    #[must_use]
    pub fn new(name: impl Into<String>, blocks: Vec<BasicBlock>) -> Self {
        let next_block_id = blocks.iter().map(|b| b.id.0).max().map_or(0, |m| m + 1);
        let mut f = Self {
            name: name.into(),
            blocks,
            next_block_id,
            next_value_id: 0,
        };
        f.recompute_next_value_id();
        f.rebuild_predecessors();
        f
    }

    fn recompute_next_value_id(&mut self) {
        let max = self
            .blocks
            .iter()
            .flat_map(|b| b.instructions.iter())
            .flat_map(|i| i.operands.iter())
            .filter_map(|op| match op {
                super::Operand::RegUse(v) | super::Operand::RegDef(v) | super::Operand::ValueRef(v) => {
                    Some(v.0)
                }
                _ => None,
            })
            .max();
        self.next_value_id = max.map_or(0, |m| m + 1);
    }

    #[must_use]
    pub fn entry_id(&self) -> Option<BlockId> {
        self.blocks.first().map(|b| b.id)
    }

    #[must_use]
    pub fn index_of(&self, id: BlockId) -> Option<usize> {
        self.blocks.iter().position(|b| b.id == id)
    }

    #[must_use]
    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.index_of(id).map(|i| &self.blocks[i])
    }

    #[must_use]
    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut BasicBlock> {
        let idx = self.index_of(id)?;
        Some(&mut self.blocks[idx])
    }

    /// Allocate a fresh block id, add an empty block with it at the end of
    /// the block list, and return the id. Callers reposition as needed.
    pub fn push_new_block(&mut self) -> BlockId {
        let id = BlockId(self.next_block_id);
        self.next_block_id += 1;
        self.blocks.push(BasicBlock::new(id));
        id
    }

    /// Insert a pre-built block right after `after`.
    pub fn insert_block_after(&mut self, after: BlockId, block: BasicBlock) -> PassResult<()> {
        let idx = self
            .index_of(after)
            .ok_or_else(|| PassError::InconsistentCfg(format!("insert after unknown block {after}")))?;
        self.blocks.insert(idx + 1, block);
        Ok(())
    }

    pub fn remove_block(&mut self, id: BlockId) -> Option<BasicBlock> {
        let idx = self.index_of(id)?;
        Some(self.blocks.remove(idx))
    }

    pub fn fresh_value(&mut self) -> ValueId {
        let v = ValueId(self.next_value_id);
        self.next_value_id += 1;
        v
    }

    /// Recompute every block's `predecessors` from the current successor
    /// lists. Call after any terminator rewrite or block insertion/removal.
    pub fn rebuild_predecessors(&mut self) {
        let mut preds: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
        for b in &self.blocks {
            for &s in &b.successors {
                preds.entry(s).or_default().push(b.id);
            }
        }
        for b in &mut self.blocks {
            b.predecessors = preds.remove(&b.id).unwrap_or_default().into();
        }
    }

    #[must_use]
    pub fn predecessors_of(&self, id: BlockId) -> &[BlockId] {
        self.block(id).map(|b| b.predecessors.as_slice()).unwrap_or(&[])
    }

    #[must_use]
    pub fn successors_of(&self, id: BlockId) -> &[BlockId] {
        self.block(id).map(|b| b.successors.as_slice()).unwrap_or(&[])
    }

    /// Redirect every terminator operand (and the cached successor list)
    /// that pointed at `old` to point at `new`, for every block in the
    /// function. Used to retarget all predecessors of a block in one step
    /// (e.g. redirecting the original loop header's predecessors to the new
    /// prologue entry).
    pub fn redirect_all_edges(&mut self, old: BlockId, new: BlockId) {
        for b in &mut self.blocks {
            if let Some(t) = b.terminator_mut() {
                t.replace_block_ref(old, new);
            }
            b.resync_successors_from_terminator();
        }
        self.rebuild_predecessors();
    }

    /// Check the invariant from the data model: every terminator `BlockRef`
    /// operand must be present in `successors`, and conversely.
    pub fn verify_consistency(&self) -> PassResult<()> {
        for b in &self.blocks {
            let from_term: Vec<BlockId> = b.terminator().map(|t| t.block_refs().collect()).unwrap_or_default();
            if from_term.len() != b.successors.len() || from_term.iter().any(|t| !b.successors.contains(t)) {
                return Err(PassError::InconsistentCfg(format!(
                    "block {} terminator targets {:?} disagree with successors {:?}",
                    b.id, from_term, b.successors
                )));
            }
            for &s in &b.successors {
                if self.block(s).is_none() {
                    return Err(PassError::InconsistentCfg(format!(
                        "block {} has successor {} which does not exist",
                        b.id, s
                    )));
                }
            }
        }
        Ok(())
    }
}
