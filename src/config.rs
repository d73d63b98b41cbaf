//! Pass configuration
//!
//! The only externally-documented knob is `display_cycles_after_balance`;
//! `max_ii_multiplier` exists so the §5 II search bound has a home without
//! hardcoding it, not as a user-facing flag.

use serde::{Deserialize, Serialize};

use crate::mir::BlockId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// When set, `bpb::balance_function` also returns a per-block cycle
    /// report on the side channel described in §6.
    pub display_cycles_after_balance: bool,
    /// The II search in `sms::schedule` aborts once
    /// `II > instructions_in_loop * max_ii_multiplier` (§5 timeout).
    pub max_ii_multiplier: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            display_cycles_after_balance: false,
            max_ii_multiplier: 1,
        }
    }
}

/// Per-block cycle-cost-to-reconvergence report, emitted when
/// `display_cycles_after_balance` is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleReport {
    pub entries: Vec<(BlockId, u32)>,
}
