//! Loop Rewriter (§4.10)
//!
//! Turns a converged `Schedule` back into MIR: `S_max` prologue blocks that
//! ramp up the pipeline, one kernel block that is the steady state, and
//! `S_max` epilogue blocks that drain it, wired together and spliced in
//! place of the original loop block.
//!
//! # Values-to-save and the kernel's internal φ chain
//! A value defined at stage `sd` and consumed at stage `su > sd` survives
//! `su - sd` additional kernel invocations before its last consumer runs, so
//! it needs `su - sd` levels of φ-carried temps at the top of the kernel
//! block — level `k`'s φ merges "value computed this kernel invocation"
//! (via the self back-edge, sourced from level `k-1`) with "value handed off
//! by the last prologue" (the entry edge). Resolving Open Question (b): the
//! condition-producing instruction itself is never a value-to-save target —
//! it is cloned whole into every prologue terminator alongside the branch
//! (see `condition_support`), so each copy re-evaluates the same condition
//! independently rather than trying to thread a condition value across
//! stages. Epilogue terminators never need this: they're always the
//! unconditional fall-through into the next epilogue or the real exit.

use std::collections::{HashMap, HashSet};

use crate::error::{PassError, PassResult};
use crate::mir::{BasicBlock, BlockId, Function, Instruction, ValueId};
use crate::sms::depgraph::{self, DepGraph};
use crate::sms::schedule::Schedule;
use crate::target::TargetInfo;

struct PendingPhi {
    block: BlockId,
    index: usize,
    dst: ValueId,
    inputs: Vec<(BlockId, ValueId)>,
}

/// Rewrite the loop headed by `loop_block_id` into prologue/kernel/epilogue
/// form per the converged `schedule`. Replaces the loop block in `function`.
pub fn rewrite_loop(
    function: &mut Function,
    loop_block_id: BlockId,
    graph: &DepGraph,
    schedule: &Schedule,
    ti: &dyn TargetInfo,
) -> PassResult<()> {
    let original = function
        .block(loop_block_id)
        .ok_or_else(|| PassError::InconsistentCfg(format!("loop block {loop_block_id} missing")))?
        .clone();
    let terminator = original
        .terminator()
        .ok_or_else(|| PassError::InconsistentCfg(format!("loop block {loop_block_id} has no terminator")))?
        .clone();
    let exit_targets: Vec<BlockId> = terminator.block_refs().filter(|&b| b != loop_block_id).collect();
    let exit_id = *exit_targets
        .first()
        .ok_or_else(|| PassError::InvalidOperand("loop terminator has no non-self exit target".to_string()))?;

    let external_preds: Vec<BlockId> = function
        .predecessors_of(loop_block_id)
        .iter()
        .copied()
        .filter(|&p| p != loop_block_id)
        .collect();

    let s_max = schedule.max_stage();
    let ii = schedule.ii;

    let (defs_by_value, uses_by_value) = depgraph::defs_and_uses(&original);
    let save_depth = values_to_save(&defs_by_value, &uses_by_value, schedule, graph);
    let condition_nodes = condition_support(&original, &defs_by_value, original.instructions.len() - 1);

    let non_branch: Vec<depgraph::NodeId> = (0..graph.len())
        .map(depgraph::NodeId)
        .filter(|n| !ti.is_branch(original.instructions[graph.nodes[n.0].instr_index].opcode))
        .collect();
    let mut kernel_order = non_branch;
    kernel_order.sort_by_key(|n| {
        let cycle = schedule.cycle_of.get(n).copied().unwrap_or(0);
        (cycle % ii, graph.nodes[n.0].instr_index)
    });
    let nodes_at_stage = |stage: u32| -> Vec<depgraph::NodeId> {
        kernel_order
            .iter()
            .copied()
            .filter(|n| schedule.stage_of.get(n).copied().unwrap_or(0) == stage)
            .collect()
    };

    // Pre-allocate every new block id so terminators can cross-reference
    // each other regardless of build order.
    let prologue_ids: Vec<BlockId> = (0..s_max).map(|_| function.push_new_block()).collect();
    let kernel_id = function.push_new_block();
    let epilogue_ids: Vec<BlockId> = (0..s_max).map(|_| function.push_new_block()).collect();

    let mut pending_phis: Vec<PendingPhi> = Vec::new();
    let mut prologue_temps: HashMap<(ValueId, u32), ValueId> = HashMap::new();

    for i in 0..s_max {
        let mut instrs = Vec::new();
        let mut included: HashSet<usize> = HashSet::new();
        for j in 0..i {
            for node in nodes_at_stage(j) {
                let instr_index = graph.nodes[node.0].instr_index;
                included.insert(instr_index);
                let instr = original.instructions[instr_index].clone();
                let defs: Vec<ValueId> = instr.defs().collect();
                instrs.push(instr);
                for def in defs {
                    if save_depth.contains_key(&def) {
                        let temp = function.fresh_value();
                        prologue_temps.insert((def, i), temp);
                        instrs.push(ti.copy_register(def, temp));
                    }
                }
            }
        }
        // The terminator's own condition is always computed at stage 0 (its
        // branch cycle is pinned to II-1, which normalizes to stage 0, and
        // I2 propagates that bound backward through every same-iteration
        // dependence the condition rests on). Prologue 0's `for j in 0..i`
        // range is empty, so without this the cloned terminator below would
        // reference a value with no def on the path into it.
        for &instr_index in &condition_nodes {
            if included.insert(instr_index) {
                instrs.push(original.instructions[instr_index].clone());
            }
        }
        let mut term = terminator.clone();
        let next = if i + 1 < s_max { prologue_ids[i as usize + 1] } else { kernel_id };
        term.replace_block_ref(loop_block_id, next);
        // Same index, not the textually "reverse" one: epilogue i's own φs
        // are wired to take their prologue-side input from prologue i (see
        // `values_to_save` / the epilogue loop below), so the control-flow
        // edge has to land there too for the two to agree.
        term.replace_block_ref(exit_id, epilogue_ids[i as usize]);
        instrs.push(term);

        let blk = function
            .block_mut(prologue_ids[i as usize])
            .expect("just allocated");
        blk.instructions = instrs;
        blk.resync_successors_from_terminator();
    }

    // Kernel: φ chain for every save value, then the walk itself.
    let mut kernel_temp0: HashMap<ValueId, ValueId> = HashMap::new();
    let mut phi_dst: HashMap<(ValueId, u32), ValueId> = HashMap::new();
    for (&v, &depth) in &save_depth {
        kernel_temp0.insert(v, function.fresh_value());
        for level in 1..=depth {
            phi_dst.insert((v, level), function.fresh_value());
        }
    }

    let mut kernel_instrs: Vec<Instruction> = Vec::new();
    for (&v, &depth) in &save_depth {
        for level in 1..=depth {
            let self_input = if level == 1 { kernel_temp0[&v] } else { phi_dst[&(v, level - 1)] };
            let entry_input = if s_max > 0 {
                prologue_temps.get(&(v, s_max - 1)).copied().unwrap_or(v)
            } else {
                v
            };
            let dst = phi_dst[&(v, level)];
            let entry_block = if s_max > 0 { prologue_ids[s_max as usize - 1] } else { kernel_id };
            let inputs = vec![(kernel_id, self_input), (entry_block, entry_input)];
            kernel_instrs.push(ti.phi(&inputs, dst));
            pending_phis.push(PendingPhi {
                block: kernel_id,
                index: kernel_instrs.len() - 1,
                dst,
                inputs,
            });
        }
    }

    for stage in 0..=s_max {
        for node in nodes_at_stage(stage) {
            let mut instr = original.instructions[graph.nodes[node.0].instr_index].clone();
            if stage == 0 {
                let defs: Vec<ValueId> = instr.defs().collect();
                kernel_instrs.push(instr);
                for def in defs {
                    if save_depth.contains_key(&def) {
                        kernel_instrs.push(ti.copy_register(def, kernel_temp0[&def]));
                    }
                }
            } else {
                for use_value in instr.uses().collect::<Vec<_>>() {
                    if let Some(def_pos) = defs_by_value.get(&use_value) {
                        let (p, _) = depgraph::true_source(def_pos, graph.nodes[node.0].instr_index);
                        let sd = schedule.stage_of.get(&depgraph::NodeId(p)).copied().unwrap_or(0);
                        if stage > sd {
                            let depth = stage - sd;
                            if let Some(&target) = phi_dst.get(&(use_value, depth)) {
                                instr.rename_use(use_value, target);
                            }
                        }
                    }
                }
                kernel_instrs.push(instr);
            }
        }
    }
    let mut kernel_term = terminator.clone();
    kernel_term.replace_block_ref(loop_block_id, kernel_id);
    kernel_term.replace_block_ref(exit_id, epilogue_ids.first().copied().unwrap_or(exit_id));
    kernel_instrs.push(kernel_term);
    {
        let blk = function.block_mut(kernel_id).expect("just allocated");
        blk.instructions = kernel_instrs;
        blk.resync_successors_from_terminator();
    }

    // Epilogue i drains exactly stage i+1, then falls through to epilogue
    // i+1 (or the real exit, at i = S_max-1). Each one's predecessors are
    // prologue i (direct exit) and either the kernel (i=0, the kernel's own
    // not-taken edge) or epilogue i-1 (fallthrough carrying the chain
    // forward) — so every save-value still live past stage i+1 needs a 2-in
    // φ here merging "value from the ramp" with "value from one invocation
    // further along the chain", regardless of whether stage i+1's own
    // instructions actually consume it (pass-through keeps later epilogues
    // fed).
    let mut epi_carry: HashMap<ValueId, ValueId> = HashMap::new();
    let mut epi_phi_dst: HashMap<(ValueId, u32), ValueId> = HashMap::new();
    for i in 0..s_max {
        let idx = i as usize;
        let mut instrs = Vec::new();
        for (&v, &maxdepth) in &save_depth {
            if i >= maxdepth {
                continue; // nothing past this epilogue still needs v
            }
            let prologue_side = prologue_temps.get(&(v, i)).copied().unwrap_or(v);
            let (other_block, other_value) = if i == 0 {
                (kernel_id, phi_dst.get(&(v, 1)).copied().unwrap_or(v))
            } else {
                (epilogue_ids[idx - 1], epi_carry.get(&v).copied().unwrap_or(v))
            };
            let dst = function.fresh_value();
            let inputs = vec![(prologue_ids[idx], prologue_side), (other_block, other_value)];
            instrs.push(ti.phi(&inputs, dst));
            pending_phis.push(PendingPhi {
                block: epilogue_ids[idx],
                index: instrs.len() - 1,
                dst,
                inputs,
            });
            epi_phi_dst.insert((v, i), dst);
        }

        for node in nodes_at_stage(i + 1) {
            let mut instr = original.instructions[graph.nodes[node.0].instr_index].clone();
            for use_value in instr.uses().collect::<Vec<_>>() {
                if let Some(def_pos) = defs_by_value.get(&use_value) {
                    let (p, _) = depgraph::true_source(def_pos, graph.nodes[node.0].instr_index);
                    let sd = schedule.stage_of.get(&depgraph::NodeId(p)).copied().unwrap_or(0);
                    if i + 1 > sd {
                        if let Some(&target) = epi_phi_dst.get(&(use_value, i)) {
                            instr.rename_use(use_value, target);
                        }
                    }
                }
            }
            instrs.push(instr);
        }

        let next = if i + 1 < s_max { epilogue_ids[idx + 1] } else { exit_id };
        instrs.push(ti.unconditional_branch(next));

        let blk = function.block_mut(epilogue_ids[idx]).expect("just allocated");
        blk.instructions = instrs;
        blk.resync_successors_from_terminator();

        epi_carry.clear();
        for ((v, ep), dst) in &epi_phi_dst {
            if *ep == i {
                epi_carry.insert(*v, *dst);
            }
        }
    }

    let entry_target = prologue_ids.first().copied().unwrap_or(kernel_id);
    for pred in external_preds {
        if let Some(b) = function.block_mut(pred) {
            if let Some(t) = b.terminator_mut() {
                t.replace_block_ref(loop_block_id, entry_target);
            }
            b.resync_successors_from_terminator();
        }
    }
    function.remove_block(loop_block_id);
    function.rebuild_predecessors();

    lower_phis(function, pending_phis, ti);
    function.verify_consistency()?;
    Ok(())
}

/// For each value-to-save, the maximum `su - sd` across every (def, use)
/// pair that crosses a stage boundary; absent entirely if never needed.
fn values_to_save(
    defs_by_value: &HashMap<ValueId, Vec<usize>>,
    uses_by_value: &HashMap<ValueId, Vec<usize>>,
    schedule: &Schedule,
    graph: &DepGraph,
) -> HashMap<ValueId, u32> {
    let mut out = HashMap::new();
    for (&value, uses) in uses_by_value {
        let Some(defs) = defs_by_value.get(&value) else {
            continue;
        };
        for &q in uses {
            let (p, _) = depgraph::true_source(defs, q);
            let sd = schedule.stage_of.get(&depgraph::NodeId(p)).copied().unwrap_or(0);
            let su = schedule.stage_of.get(&depgraph::NodeId(q)).copied().unwrap_or(0);
            if su > sd {
                let depth = su - sd;
                let entry = out.entry(value).or_insert(0u32);
                *entry = (*entry).max(depth);
            }
        }
    }
    let _ = graph;
    out
}

/// Instruction positions the terminator's own condition rests on within the
/// same iteration (δ=0 only — a loop-carried δ=1 dependence needs the φ
/// chain built in `rewrite_loop`, not a fresh clone), in ascending program
/// order so replaying them in that order reconstructs the value.
fn condition_support(
    original: &BasicBlock,
    defs_by_value: &HashMap<ValueId, Vec<usize>>,
    terminator_idx: usize,
) -> Vec<usize> {
    let mut needed = Vec::new();
    let mut seen: HashSet<usize> = HashSet::new();
    let mut stack: Vec<(ValueId, usize)> =
        original.instructions[terminator_idx].uses().map(|v| (v, terminator_idx)).collect();
    while let Some((v, q)) = stack.pop() {
        let Some(defs) = defs_by_value.get(&v) else {
            continue;
        };
        let (idx, delta) = depgraph::true_source(defs, q);
        if delta != 0 || !seen.insert(idx) {
            continue;
        }
        needed.push(idx);
        for u in original.instructions[idx].uses() {
            stack.push((u, idx));
        }
    }
    needed.sort_unstable();
    needed
}

fn lower_phis(function: &mut Function, pending: Vec<PendingPhi>, ti: &dyn TargetInfo) {
    for phi in pending {
        let shared = function.fresh_value();
        for (pred, val) in &phi.inputs {
            if let Some(b) = function.block_mut(*pred) {
                let at = b.instructions.len().saturating_sub(1);
                b.instructions.insert(at, ti.copy_register(*val, shared));
            }
        }
        if let Some(b) = function.block_mut(phi.block) {
            if let Some(slot) = b.instructions.get_mut(phi.index) {
                *slot = ti.copy_register(shared, phi.dst);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::{BlockId as Bid, Operand, ValueId as Vid};
    use crate::sms::{attributes, depgraph, ii, ordering, recurrence, schedule};
    use crate::testutil::{op, StubTarget};

    #[test]
    fn zero_stage_loop_collapses_to_a_single_kernel_block() {
        let ti = StubTarget::default().with_latency(op::ADD, 1);
        let mut b = BasicBlock::new(Bid(0));
        let r1 = Vid(1);
        b.instructions.push(Instruction::new(op::ADD, [Operand::RegDef(r1), Operand::RegUse(r1)]));
        b.instructions.push(ti.cbr(r1, Bid(0), Bid(1)));
        b.resync_successors_from_terminator();

        let mut entry = BasicBlock::new(Bid(10));
        entry.instructions.push(Instruction::new(op::BR, [Operand::BlockRef(Bid(0))]));
        entry.resync_successors_from_terminator();
        let exit = BasicBlock::new(Bid(1));

        let mut f = Function::new("loop", vec![entry, b, exit]);

        let graph = depgraph::build(f.block(Bid(0)).unwrap(), &ti);
        let recs = recurrence::find_recurrences(&graph);
        let ignore = recurrence::select_ignore_set(&graph, &recs);
        let ii0 = ii::initial_ii(f.block(Bid(0)).unwrap(), &ti, &recs);
        let attrs = attributes::compute(&graph, &ignore, ii0);
        let sets = ordering::partial_order_sets(&graph, &ignore, &recs);
        let order = ordering::linearize(&graph, &ignore, &sets, &attrs);
        let sched = schedule::search(f.block(Bid(0)).unwrap(), &graph, &ignore, &attrs, &ti, &order, ii0, 16).unwrap();

        rewrite_loop(&mut f, Bid(0), &graph, &sched, &ti).unwrap();

        assert!(f.block(Bid(0)).is_none());
        assert_eq!(f.blocks.len(), 3); // entry, kernel, exit
        f.verify_consistency().unwrap();
    }

    /// A hand-built two-stage schedule (`S_max == 1`): a dead load pushed out
    /// to stage 1 by a deliberately inflated latency, and a self-recurring
    /// counter (stage 0) whose value also feeds the branch. Built by hand
    /// rather than through `schedule::search` so the stage/cycle assignment
    /// is exactly controlled, letting this test both exercise the
    /// prologue/kernel/epilogue ramp and confirm the branch's condition
    /// def (the counter add) is actually present in prologue 0, not just
    /// the branch itself.
    #[test]
    fn two_stage_loop_builds_one_prologue_kernel_epilogue_and_replays_the_condition_def() {
        let ti = StubTarget::default().with_latency(op::ADD, 1);
        let mut b = BasicBlock::new(Bid(0));
        let dead = Vid(1);
        let ctr = Vid(2);
        b.instructions.push(Instruction::new(op::LOAD, [Operand::RegDef(dead)])); // idx 0, unused
        b.instructions.push(Instruction::new(op::ADD, [Operand::RegDef(ctr), Operand::RegUse(ctr)])); // idx 1
        b.instructions.push(ti.cbr(ctr, Bid(0), Bid(1))); // idx 2
        b.resync_successors_from_terminator();

        let mut entry = BasicBlock::new(Bid(10));
        entry.instructions.push(Instruction::new(op::BR, [Operand::BlockRef(Bid(0))]));
        entry.resync_successors_from_terminator();
        let exit = BasicBlock::new(Bid(1));

        let mut f = Function::new("loop", vec![entry, b, exit]);

        // Latencies: load=2 (pushes it to stage 1), add=1, branch=1 (unused).
        let mut graph = depgraph::DepGraph::with_nodes([2, 1, 1]);
        graph.add_edge(depgraph::NodeId(1), depgraph::NodeId(2), depgraph::EdgeKind::True, 0);
        graph.add_edge(depgraph::NodeId(1), depgraph::NodeId(1), depgraph::EdgeKind::True, 1);

        let mut cycle_of = HashMap::new();
        cycle_of.insert(depgraph::NodeId(0), 2);
        cycle_of.insert(depgraph::NodeId(1), 0);
        cycle_of.insert(depgraph::NodeId(2), 1);
        let mut stage_of = HashMap::new();
        stage_of.insert(depgraph::NodeId(0), 1);
        stage_of.insert(depgraph::NodeId(1), 0);
        stage_of.insert(depgraph::NodeId(2), 0);
        let sched = schedule::Schedule { ii: 2, cycle_of, stage_of };
        assert_eq!(sched.max_stage(), 1);

        rewrite_loop(&mut f, Bid(0), &graph, &sched, &ti).unwrap();

        assert!(f.block(Bid(0)).is_none());
        assert_eq!(f.blocks.len(), 5); // entry, prologue0, kernel, epilogue0, exit
        f.verify_consistency().unwrap();

        let prologue_id = f.successors_of(Bid(10))[0];
        let prologue = f.block(prologue_id).unwrap();
        // Without replicating the condition def, this would be 1 (just the
        // cloned branch); the counter add must be replayed alongside it.
        assert_eq!(prologue.instructions.len(), 2);
        assert!(prologue.instructions[0].defs().any(|v| v == ctr));
        assert!(prologue.instructions[1].uses().any(|v| v == ctr));

        let kernel = f.block(prologue.successors[0]).unwrap();
        assert_eq!(kernel.instructions.len(), 3); // ctr add, dead load, branch

        let epilogue = f.block(prologue.successors[1]).unwrap();
        assert_eq!(epilogue.instructions.len(), 2); // dead load, unconditional branch
    }
}
