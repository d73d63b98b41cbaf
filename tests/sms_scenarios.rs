//! Integration coverage for the swing modulo scheduler's literal scenarios.

use cfgloom::mir::{BasicBlock, BlockId, Instruction, Operand, ValueId};
use cfgloom::sms;
use cfgloom::testutil::{op, StubTarget};
use cfgloom::{Function, TargetInfo};

/// A preheader branching into the loop header, so the loop block is never
/// the function's own entry block once `rewrite_loop` removes it.
fn with_preheader(loop_block: BasicBlock, exit: BasicBlock) -> Function {
    let loop_id = loop_block.id;
    let mut preheader = BasicBlock::new(BlockId(100));
    preheader.instructions.push(Instruction::new(op::BR, [Operand::BlockRef(loop_id)]));
    preheader.resync_successors_from_terminator();
    Function::new("fn", vec![preheader, loop_block, exit])
}

/// A[1]=A[0]+1 style single-block loop: load, add, store, conditional
/// back-branch, with a true dependence chain load -> add -> store and a
/// loop-carried register feeding the branch back from the store.
fn scenario_a1_function(ti: &StubTarget) -> Function {
    let mut b = BasicBlock::new(BlockId(0));
    let r1 = ValueId(1);
    let r2 = ValueId(2);
    b.instructions.push(Instruction::new(op::LOAD, [Operand::RegDef(r1)]));
    b.instructions.push(Instruction::new(op::ADD, [Operand::RegDef(r2), Operand::RegUse(r1)]));
    b.instructions.push(Instruction::new(op::STORE, [Operand::RegUse(r2)]));
    b.instructions.push(ti.cbr(r2, BlockId(0), BlockId(1)));
    b.resync_successors_from_terminator();
    let exit = BasicBlock::new(BlockId(1));
    with_preheader(b, exit)
}

#[test]
fn a1_resource_bound_loop_converges_and_collapses_to_one_kernel_block() {
    let load_unit = cfgloom::target::ResourceId(1);
    let alu = cfgloom::target::ResourceId(2);
    let store_unit = cfgloom::target::ResourceId(3);
    let ti = StubTarget::default()
        .with_latency(op::LOAD, 3)
        .with_latency(op::ADD, 1)
        .with_latency(op::STORE, 1)
        .with_resource(op::LOAD, load_unit)
        .with_resource(op::ADD, alu)
        .with_resource(op::STORE, store_unit)
        .with_capacity(load_unit, 1)
        .with_capacity(alu, 1)
        .with_capacity(store_unit, 1);
    let mut f = scenario_a1_function(&ti);

    let schedule = sms::schedule_loop(&mut f, BlockId(0), &ti, 16).unwrap();
    assert_eq!(schedule.ii, 5);
    // delay(=5) == II, so the schedule has zero stage overlap: rewrite_loop
    // collapses to a single kernel block, no prologue/epilogue ramp.
    assert_eq!(schedule.max_stage(), 0);

    assert!(f.block(BlockId(0)).is_none());
    assert_eq!(f.blocks.len(), 3); // preheader, kernel, exit
    f.verify_consistency().unwrap();
}

#[test]
fn a2_single_cycle_self_recurrence_converges_at_ii_one() {
    let ti = StubTarget::default().with_latency(op::ADD, 1);
    let mut b = BasicBlock::new(BlockId(0));
    let r1 = ValueId(1);
    b.instructions.push(Instruction::new(op::ADD, [Operand::RegDef(r1), Operand::RegUse(r1)]));
    b.instructions.push(ti.cbr(r1, BlockId(0), BlockId(1)));
    b.resync_successors_from_terminator();
    let exit = BasicBlock::new(BlockId(1));
    let mut f = with_preheader(b, exit);

    let schedule = sms::schedule_loop(&mut f, BlockId(0), &ti, 16).unwrap();
    assert_eq!(schedule.ii, 1);
    assert_eq!(schedule.max_stage(), 0);
    f.verify_consistency().unwrap();
}

#[test]
fn a3_block_with_a_call_is_not_eligible() {
    let ti = StubTarget::default();
    let mut b = BasicBlock::new(BlockId(0));
    b.instructions.push(ti.call());
    b.instructions.push(ti.unconditional_branch(BlockId(0)));
    b.resync_successors_from_terminator();
    let mut f = Function::new("a3", vec![b]);

    let err = sms::schedule_loop(&mut f, BlockId(0), &ti, 16).unwrap_err();
    assert!(matches!(err, cfgloom::PassError::NotEligible(_)));
    assert!(err.is_recoverable());
}
