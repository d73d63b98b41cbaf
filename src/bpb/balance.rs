//! Branch-Path Balancer (Core B, §4.11)
//!
//! Pads every branch so that, for any predecessor with multiple successors,
//! all paths toward their common reconvergence point cost the same number
//! of cycles — the property that makes a branch's timing independent of
//! which side is taken.
//!
//! Processed one predecessor block at a time, in decreasing order of the
//! predecessor's own dominator-tree depth, so an inner diamond is fully
//! balanced (and its cost folded into the surrounding chain) before the
//! outer one that contains it runs.

use std::collections::HashMap;

use crate::bpb::reconverge;
use crate::config::{Config, CycleReport};
use crate::domtree::DomTree;
use crate::error::PassResult;
use crate::mir::{BlockId, Function};
use crate::target::TargetInfo;

/// Balance every multi-way branch in `function`. Mutates `function` and
/// `domtree` in place (new dummy blocks are registered on both); returns a
/// `CycleReport` when `config.display_cycles_after_balance` is set.
pub fn balance_function(
    function: &mut Function,
    domtree: &mut DomTree,
    ti: &dyn TargetInfo,
    config: &Config,
) -> PassResult<Option<CycleReport>> {
    let mut order: Vec<BlockId> = function
        .blocks
        .iter()
        .map(|b| b.id)
        .filter(|&id| function.successors_of(id).len() >= 2)
        .collect();
    order.sort_by_key(|&id| std::cmp::Reverse(domtree.get_node(id).map_or(0, |n| n.level)));

    let mut cost_to_leaf: HashMap<BlockId, u32> = HashMap::new();

    for p in order {
        balance_predecessor(function, domtree, ti, p, &mut cost_to_leaf);
    }

    if config.display_cycles_after_balance {
        let mut entries: Vec<(BlockId, u32)> = cost_to_leaf.into_iter().collect();
        entries.sort_by_key(|&(b, _)| b.0);
        log::info!("bpb: balanced {} branch points", entries.len());
        Ok(Some(CycleReport { entries }))
    } else {
        Ok(None)
    }
}

fn balance_predecessor(
    function: &mut Function,
    domtree: &mut DomTree,
    ti: &dyn TargetInfo,
    p: BlockId,
    cost_to_leaf: &mut HashMap<BlockId, u32>,
) {
    let succs: Vec<BlockId> = function.successors_of(p).to_vec();
    if succs.len() < 2 {
        return;
    }

    // R(M) computed from the first successor; with a reducible, structured
    // CFG every successor's own reconvergence point is the same block.
    let m = succs[0];
    let Some(r) = reconverge::target(function, domtree, m) else {
        return;
    };

    let cost_of = |function: &Function, s: BlockId| -> Option<u32> {
        if reconverge::reaches(function, s, r) {
            reconverge::chain_cost(function, ti, s, r)
        } else {
            None
        }
    };

    let max_cost = succs.iter().filter_map(|&s| cost_of(function, s)).max().unwrap_or(0);
    log::debug!("bpb: {p} reconverges at {r}, maxCost={max_cost}");

    // Shortcut elimination: any other successor reachable from m bypasses m
    // on the direct P->S edge.
    for &s in &succs {
        if s == m {
            continue;
        }
        if reconverge::reaches(function, m, s) {
            log::trace!("bpb: {p}->{s} is a shortcut around {m}, synthesizing a dummy");
            insert_dummy(function, domtree, ti, p, s, max_cost);
        }
    }

    // Sibling padding over the (possibly just-redirected) current successors.
    let current: Vec<BlockId> = function.successors_of(p).to_vec();
    for s in current {
        if let Some(cost) = cost_of(function, s) {
            if cost < max_cost {
                pad_block_start(function, ti, s, max_cost - cost);
            }
        }
    }

    cost_to_leaf.insert(p, max_cost);
}

/// Splice a NOP-filled dummy block onto the `p -> s` edge, sized to
/// `target_cost`, and register it with the dominator tree.
fn insert_dummy(function: &mut Function, domtree: &mut DomTree, ti: &dyn TargetInfo, p: BlockId, s: BlockId, target_cost: u32) {
    let d = function.push_new_block();

    let branch = ti.unconditional_branch(s);
    let branch_cost = ti.cycle_cost(&branch);
    let budget = target_cost.saturating_sub(branch_cost);
    let nop_cost = ti.cycle_cost(&ti.nop()).max(1);
    let mut instrs = Vec::new();
    let mut cost = 0u32;
    while cost < budget {
        instrs.push(ti.nop());
        cost += nop_cost;
    }
    instrs.push(branch);

    {
        let blk = function.block_mut(d).expect("just allocated");
        blk.instructions = instrs;
        blk.resync_successors_from_terminator();
    }

    if let Some(b) = function.block_mut(p) {
        if let Some(t) = b.terminator_mut() {
            t.replace_block_ref(s, d);
        }
        b.resync_successors_from_terminator();
    }
    function.rebuild_predecessors();
    domtree.add_new_block(d, p);
}

/// Insert NOPs at the start of `block` until its own cycle cost has grown by
/// `deficit`.
fn pad_block_start(function: &mut Function, ti: &dyn TargetInfo, block: BlockId, deficit: u32) {
    let nop_cost = ti.cycle_cost(&ti.nop()).max(1);
    let mut added = 0u32;
    let mut pos = 0usize;
    let Some(b) = function.block_mut(block) else { return };
    while added < deficit {
        b.instructions.insert(pos, ti.nop());
        pos += 1;
        added += nop_cost;
    }
}
