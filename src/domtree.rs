//! Dominator-Tree Helper (DTH)
//!
//! Computes and maintains immediate-dominator and level information over a
//! `Function`'s MIR. Owned by whichever pass is running; `bpb` refreshes it
//! in place every time it adds a dummy block (`add_new_block`) rather than
//! recomputing the whole tree from scratch.
//!
//! # Algorithm
//! Classic iterative dominance: reverse-postorder the CFG, then repeatedly
//! intersect each block's predecessors' dominators until a fixed point
//! (Cooper, Harvey & Kennedy, "A Simple, Fast Dominance Algorithm"). This
//! converges in a small constant number of passes for the reducible,
//! structured CFGs both cores operate on.

use std::collections::HashMap;

use crate::error::{PassError, PassResult};
use crate::mir::{BlockId, Function};

/// A single dominator-tree node's externally visible shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomNode {
    pub level: u32,
    pub num_children: u32,
}

/// Dominator tree over a function's blocks.
#[derive(Debug, Clone)]
pub struct DomTree {
    entry: BlockId,
    idom: HashMap<BlockId, BlockId>,
    children: HashMap<BlockId, Vec<BlockId>>,
    level: HashMap<BlockId, u32>,
}

impl DomTree {
    /// Compute the dominator tree for `function` from scratch.
    pub fn compute(function: &Function) -> PassResult<Self> {
        let entry = function
            .entry_id()
            .ok_or_else(|| PassError::InconsistentCfg("function has no entry block".to_string()))?;

        let rpo = reverse_postorder(function, entry);
        let mut order_index: HashMap<BlockId, usize> = HashMap::new();
        for (i, &b) in rpo.iter().enumerate() {
            order_index.insert(b, i);
        }

        let mut idom: HashMap<BlockId, BlockId> = HashMap::new();
        idom.insert(entry, entry);

        let mut changed = true;
        while changed {
            changed = false;
            for &b in rpo.iter().skip(1) {
                let preds = function.predecessors_of(b);
                let mut new_idom: Option<BlockId> = None;
                for &p in preds {
                    if !idom.contains_key(&p) {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => p,
                        Some(cur) => intersect(&idom, &order_index, cur, p),
                    });
                }
                if let Some(ni) = new_idom {
                    if idom.get(&b) != Some(&ni) {
                        idom.insert(b, ni);
                        changed = true;
                    }
                }
            }
        }

        let mut tree = Self {
            entry,
            idom,
            children: HashMap::new(),
            level: HashMap::new(),
        };
        tree.rebuild_children_and_levels();
        Ok(tree)
    }

    fn rebuild_children_and_levels(&mut self) {
        self.children.clear();
        for (&b, &idom) in &self.idom {
            if b != idom {
                self.children.entry(idom).or_default().push(b);
            }
        }
        self.level.clear();
        let mut stack = vec![(self.entry, 0u32)];
        while let Some((b, lvl)) = stack.pop() {
            self.level.insert(b, lvl);
            if let Some(kids) = self.children.get(&b) {
                for &k in kids {
                    stack.push((k, lvl + 1));
                }
            }
        }
    }

    #[must_use]
    pub fn get_node(&self, block: BlockId) -> Option<DomNode> {
        let level = *self.level.get(&block)?;
        let num_children = self.children.get(&block).map_or(0, |c| c.len() as u32);
        Some(DomNode { level, num_children })
    }

    #[must_use]
    pub fn idom_of(&self, block: BlockId) -> Option<BlockId> {
        self.idom.get(&block).copied()
    }

    /// True iff `a` dominates `b` (every block dominates itself).
    #[must_use]
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        let mut cur = b;
        loop {
            if cur == a {
                return true;
            }
            let Some(&next) = self.idom.get(&cur) else {
                return false;
            };
            if next == cur {
                return cur == a;
            }
            cur = next;
        }
    }

    /// Register a freshly synthesized block with immediate dominator `idom`.
    /// Used by BPB every time it inserts a dummy block on a shortcut edge.
    pub fn add_new_block(&mut self, new_block: BlockId, idom: BlockId) {
        self.idom.insert(new_block, idom);
        self.children.entry(idom).or_default().push(new_block);
        let parent_level = self.level.get(&idom).copied().unwrap_or(0);
        self.level.insert(new_block, parent_level + 1);
    }

    /// Remove a block's node (e.g. the original loop header once SMS has
    /// replaced it). Reparents its children onto its own immediate
    /// dominator so the tree stays connected.
    pub fn erase_node(&mut self, block: BlockId) {
        let Some(idom) = self.idom.remove(&block) else {
            return;
        };
        if let Some(siblings) = self.children.get_mut(&idom) {
            siblings.retain(|&c| c != block);
        }
        if let Some(kids) = self.children.remove(&block) {
            for k in kids {
                self.idom.insert(k, idom);
                self.children.entry(idom).or_default().push(k);
            }
        }
        self.level.remove(&block);
        self.rebuild_children_and_levels();
    }
}

/// Intersect two dominator-tree paths by walking toward the root along
/// whichever side currently has the larger reverse-postorder index.
fn intersect(
    idom: &HashMap<BlockId, BlockId>,
    order_index: &HashMap<BlockId, usize>,
    mut a: BlockId,
    mut b: BlockId,
) -> BlockId {
    while a != b {
        while order_index[&a] > order_index[&b] {
            a = idom[&a];
        }
        while order_index[&b] > order_index[&a] {
            b = idom[&b];
        }
    }
    a
}

fn reverse_postorder(function: &Function, entry: BlockId) -> Vec<BlockId> {
    let mut visited = std::collections::HashSet::new();
    let mut postorder = Vec::new();
    let mut stack = vec![(entry, 0usize)];
    visited.insert(entry);

    while let Some((b, next_succ)) = stack.pop() {
        let succs = function.successors_of(b);
        if next_succ < succs.len() {
            let s = succs[next_succ];
            stack.push((b, next_succ + 1));
            if visited.insert(s) {
                stack.push((s, 0));
            }
        } else {
            postorder.push(b);
        }
    }
    postorder.reverse();
    postorder
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::{BasicBlock, Operand};
    use crate::testutil::op;

    fn br(target: BlockId) -> crate::mir::Instruction {
        crate::mir::Instruction::new(op::BR, [Operand::BlockRef(target)])
    }

    fn cond_br(t: BlockId, f: BlockId) -> crate::mir::Instruction {
        crate::mir::Instruction::new(op::CBR, [Operand::BlockRef(t), Operand::BlockRef(f)])
    }

    fn diamond() -> Function {
        let a = BlockId(0);
        let b = BlockId(1);
        let c = BlockId(2);
        let d = BlockId(3);
        let mut ba = BasicBlock::new(a);
        ba.instructions.push(cond_br(b, c));
        ba.resync_successors_from_terminator();
        let mut bb = BasicBlock::new(b);
        bb.instructions.push(br(d));
        bb.resync_successors_from_terminator();
        let mut bc = BasicBlock::new(c);
        bc.instructions.push(br(d));
        bc.resync_successors_from_terminator();
        let bd = BasicBlock::new(d);
        Function::new("diamond", vec![ba, bb, bc, bd])
    }

    #[test]
    fn diamond_dominance() {
        let f = diamond();
        let dt = DomTree::compute(&f).unwrap();
        assert!(dt.dominates(BlockId(0), BlockId(3)));
        assert!(!dt.dominates(BlockId(1), BlockId(3)));
        assert!(!dt.dominates(BlockId(2), BlockId(3)));
        assert_eq!(dt.get_node(BlockId(0)).unwrap().level, 0);
        assert_eq!(dt.get_node(BlockId(1)).unwrap().level, 1);
        assert_eq!(dt.get_node(BlockId(3)).unwrap().level, 1);
    }

    #[test]
    fn add_and_erase_block() {
        let f = diamond();
        let mut dt = DomTree::compute(&f).unwrap();
        dt.add_new_block(BlockId(4), BlockId(0));
        assert_eq!(dt.get_node(BlockId(4)).unwrap().level, 1);
        assert!(dt.dominates(BlockId(0), BlockId(4)));
        dt.erase_node(BlockId(4));
        assert!(dt.get_node(BlockId(4)).is_none());
    }
}
