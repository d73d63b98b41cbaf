//! Pass Error Handling
//!
//! This module provides the error types shared by the swing modulo scheduler
//! and the branch-path balancer.
//!
//! # Error Categories
//! - **Recoverable**: the pass abstains and the input `Function` is returned unchanged
//!   (`NotEligible`, `ScheduleInfeasible`, `DominatorStale`).
//! - **Fatal**: the surrounding pipeline has a bug in an earlier stage and compilation
//!   of the function should abort (`InconsistentCfg`, `InvalidOperand`).

use thiserror::Error;

/// Errors produced by the scheduling and balancing passes.
///
/// Uses `thiserror` for zero-cost error handling with detailed messages, matching
/// the recoverable/fatal split documented per-variant below.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PassError {
    /// A candidate loop block failed the eligibility filter (control flow inside the
    /// block, or a call instruction present). Recoverable: SMS abstains silently.
    #[error("loop not eligible for modulo scheduling: {0}")]
    NotEligible(String),

    /// The II-increment search exceeded its upper bound without finding a feasible
    /// schedule. Recoverable: SMS abstains and leaves the loop unchanged.
    #[error("no feasible schedule for loop in block {loop_block} up to II={max_ii}")]
    ScheduleInfeasible { loop_block: u32, max_ii: u32 },

    /// A terminator operand referenced a block absent from the successor list, or
    /// vice versa. Fatal: indicates a bug in an earlier pipeline stage.
    #[error("inconsistent CFG: {0}")]
    InconsistentCfg(String),

    /// A dominator-tree lookup found no node for a block that is still reachable.
    /// Recoverable during BPB iteration: the offending block is skipped this pass.
    #[error("stale dominator-tree entry for block {0}")]
    DominatorStale(u32),

    /// An operand of the wrong tagged-variant kind was supplied where a specific
    /// kind was required (e.g. the `BlockRef` of a non-branch terminator).
    #[error("invalid operand: {0}")]
    InvalidOperand(String),
}

impl PassError {
    /// True for error kinds the caller should treat as "abstain, function unchanged"
    /// rather than "abort compilation of this function".
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, PassError::InconsistentCfg(_))
    }
}

impl From<std::num::TryFromIntError> for PassError {
    #[cold] // error paths are cold
    fn from(err: std::num::TryFromIntError) -> Self {
        PassError::InvalidOperand(format!("integer conversion failed: {err}"))
    }
}

pub type PassResult<T> = Result<T, PassError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inconsistent_cfg_is_not_recoverable() {
        let err = PassError::InconsistentCfg("block 3 not in successors".to_string());
        assert!(!err.is_recoverable());
    }

    #[test]
    fn not_eligible_is_recoverable() {
        let err = PassError::NotEligible("contains call".to_string());
        assert!(err.is_recoverable());
    }

    #[test]
    fn dominator_stale_is_recoverable() {
        assert!(PassError::DominatorStale(7).is_recoverable());
    }
}
