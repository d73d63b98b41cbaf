//! Swing Modulo Scheduler (Core A)
//!
//! Pipelines a single-block loop into prologue/kernel/epilogue form at the
//! smallest initiation interval the loop's recurrences and resource pressure
//! allow. The pipeline stages of §4, in call order:
//!
//! 1. [`eligibility`] — is this block even a candidate.
//! 2. [`depgraph`] — True/Anti/Output dependence edges with iteration deltas.
//! 3. [`recurrence`] — elementary circuits, their II contribution, and the
//!    back-edge ignore-set that makes the graph acyclic for the rest of the
//!    pipeline.
//! 4. [`ii`] — `II₀ = max(ResMII, RecMII)`.
//! 5. [`attributes`] — ASAP/ALAP/MOB/Depth/Height over the acyclic view.
//! 6. [`ordering`] — partial-order sets and their linearization into a
//!    schedule-search order.
//! 7. [`schedule`] — cycle-by-cycle placement, incrementing II on failure.
//! 8. [`rewrite`] — materialize the converged schedule back into MIR.

pub mod attributes;
pub mod depgraph;
pub mod eligibility;
pub mod ii;
pub mod ordering;
pub mod recurrence;
pub mod rewrite;
pub mod schedule;

use crate::error::PassResult;
use crate::mir::{BlockId, Function};
use crate::target::TargetInfo;

/// Run the full pipeline against `loop_block_id` and splice the result into
/// `function` in place. `max_ii_multiplier` bounds how far II is allowed to
/// climb past `II₀` before the search gives up (see `Config`).
pub fn schedule_loop(
    function: &mut Function,
    loop_block_id: BlockId,
    ti: &dyn TargetInfo,
    max_ii_multiplier: u32,
) -> PassResult<schedule::Schedule> {
    let block = function
        .block(loop_block_id)
        .ok_or_else(|| crate::error::PassError::InconsistentCfg(format!("{loop_block_id} missing")))?;
    if let Err(err) = eligibility::check_eligible(block, ti) {
        log::warn!("sms: {loop_block_id} not eligible: {err}");
        return Err(err);
    }

    let graph = depgraph::build(block, ti);
    let recurrences = recurrence::find_recurrences(&graph);
    let ignore = recurrence::select_ignore_set(&graph, &recurrences);
    let ii0 = ii::initial_ii(block, ti, &recurrences);
    log::trace!("sms: {loop_block_id} II0={ii0}");
    let attrs = attributes::compute(&graph, &ignore, ii0);
    let sets = ordering::partial_order_sets(&graph, &ignore, &recurrences);
    let order = ordering::linearize(&graph, &ignore, &sets, &attrs);

    let max_ii = ii0.saturating_mul(max_ii_multiplier.max(1));
    let sched = match schedule::search(block, &graph, &ignore, &attrs, ti, &order, ii0, max_ii) {
        Ok(s) => s,
        Err(err) => {
            log::warn!("sms: {loop_block_id} gave up: {err}");
            return Err(err);
        }
    };
    log::debug!("sms: {loop_block_id} converged at II={} stages={}", sched.ii, sched.max_stage() + 1);

    rewrite::rewrite_loop(function, loop_block_id, &graph, &sched, ti)?;
    Ok(sched)
}
