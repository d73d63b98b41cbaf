//! Loop Eligibility Filter (§4.2)
//!
//! The gate SMS runs before building a dependence graph at all: a block is a
//! candidate iff it is a single-block self-loop with no call instruction in
//! it. Anything else — multi-block loops, calls inside the loop — is outside
//! Core A's scope and the block is skipped silently.

use crate::error::{PassError, PassResult};
use crate::mir::{BasicBlock, BlockId};
use crate::target::TargetInfo;

/// Check whether `block` is eligible for modulo scheduling.
///
/// Returns `Ok(())` if eligible, `Err(PassError::NotEligible(..))` otherwise.
/// The error is the expected, recoverable outcome for most blocks in a
/// function — callers are expected to skip the block and move on, not to
/// treat this as exceptional.
pub fn check_eligible(block: &BasicBlock, ti: &dyn TargetInfo) -> PassResult<()> {
    if !block.successors.iter().any(|&s| s == block.id) {
        return Err(PassError::NotEligible(format!(
            "block {} is not a single-block self-loop",
            block.id
        )));
    }
    if block.instructions.iter().any(|i| ti.is_call(i.opcode)) {
        return Err(PassError::NotEligible(format!(
            "block {} contains a call instruction",
            block.id
        )));
    }
    Ok(())
}

#[must_use]
pub fn is_eligible(block: &BasicBlock, ti: &dyn TargetInfo) -> bool {
    check_eligible(block, ti).is_ok()
}

/// Find the block-relative loop header id if `block_id` names an eligible
/// loop in `function`'s blocks, else `None`.
#[must_use]
pub fn eligible_self_loop(block_id: BlockId, blocks: &[BasicBlock], ti: &dyn TargetInfo) -> bool {
    blocks
        .iter()
        .find(|b| b.id == block_id)
        .is_some_and(|b| is_eligible(b, ti))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::{Instruction, Operand};
    use crate::testutil::{op, StubTarget};

    #[test]
    fn self_loop_without_call_is_eligible() {
        let ti = StubTarget::default();
        let mut b = BasicBlock::new(BlockId(0));
        b.instructions.push(Instruction::new(op::ADD, []));
        b.instructions.push(ti.cbr(crate::mir::ValueId(0), BlockId(0), BlockId(1)));
        b.resync_successors_from_terminator();
        assert!(is_eligible(&b, &ti));
    }

    #[test]
    fn non_self_loop_is_not_eligible() {
        let ti = StubTarget::default();
        let mut b = BasicBlock::new(BlockId(0));
        b.instructions.push(Instruction::new(op::BR, [Operand::BlockRef(BlockId(1))]));
        b.resync_successors_from_terminator();
        assert!(!is_eligible(&b, &ti));
    }

    #[test]
    fn call_inside_loop_is_not_eligible() {
        let ti = StubTarget::default();
        let mut b = BasicBlock::new(BlockId(0));
        b.instructions.push(ti.call());
        b.instructions.push(ti.cbr(crate::mir::ValueId(0), BlockId(0), BlockId(1)));
        b.resync_successors_from_terminator();
        assert!(!is_eligible(&b, &ti));
    }
}
