//! The Constant Bandwidth Server: four pure functions on a
//! [`DeadlineEntity`] plus the current instant (spec 4.2).
//!
//! All four are pure except for writes to the given entity. Where a caller
//! supplies a priority-inheritance donor (`pi_top`), its `(C, D, P)` are
//! used in place of the entity's own for that call only (spec 4.2,
//! "Priority-inheritance hook"); the donor's lifetime is never entangled
//! with the primary entity (spec 9).

use crate::entity::DeadlineEntity;
use crate::error::RecoverableCondition;
use crate::time::{before, elapsed_since};
use crate::types::{DeadlineParams, EntityFlags};

fn effective_params(e: &DeadlineEntity, pi_top: Option<DeadlineParams>) -> DeadlineParams {
    pi_top.unwrap_or(e.params)
}

/// `setup_new(e, now)`: preconditions `e.is_new() && !e.is_throttled()`.
///
/// Assigns `deadline = now + D`, `runtime = C`, clears `NEW`.
pub fn setup_new(e: &mut DeadlineEntity, now: u64, pi_top: Option<DeadlineParams>) {
    debug_assert!(e.is_new());
    debug_assert!(!e.is_throttled());
    let p = effective_params(e, pi_top);
    e.deadline = now.wrapping_add(p.deadline);
    e.runtime = p.runtime as i64;
    e.flags.remove(EntityFlags::NEW);
    e.clear_regression_latch();
}

/// `replenish(e)`: while `runtime <= 0`, advance `deadline += P`,
/// `runtime += C`. If the deadline is still in the past afterwards, log
/// once and forcibly reset to `(now + D, C)`.
///
/// Terminates because each iteration adds `C > 0` to `runtime`.
pub fn replenish(e: &mut DeadlineEntity, now: u64, pi_top: Option<DeadlineParams>) {
    let p = effective_params(e, pi_top);
    while e.runtime <= 0 {
        e.deadline = e.deadline.wrapping_add(p.period);
        e.runtime += p.runtime as i64;
    }

    if before(e.deadline, now) {
        if !e.mark_regression_logged() {
            log::warn!(
                "{}: deadline={} now={}",
                RecoverableCondition::ClockRegressionOnReplenish,
                e.deadline,
                now
            );
        }
        e.deadline = now.wrapping_add(p.deadline);
        e.runtime = p.runtime as i64;
    } else {
        e.clear_regression_latch();
    }
}

/// `overflow(e, now)`: true iff using the remaining runtime against the
/// current deadline would exceed the declared bandwidth `C/P`.
///
/// Compared as `D * runtime vs (deadline - now) * C` using the circular
/// pre-order, to avoid unsigned wrap when `runtime` or `(deadline - now)`
/// is large.
pub fn overflow(e: &DeadlineEntity, now: u64, pi_top: Option<DeadlineParams>) -> bool {
    let p = effective_params(e, pi_top);
    let runtime = e.runtime.max(0) as u64;
    let left = p.bandwidth_denominator().saturating_mul(runtime);
    let time_left = e.deadline.wrapping_sub(now);
    let right = time_left.saturating_mul(p.runtime);
    before(right, left)
}

/// `update(e, now)`: materialise a new instance, or postpone the deadline
/// with full budget if it has passed or would overflow the reservation.
/// Otherwise leaves parameters unchanged.
pub fn update(e: &mut DeadlineEntity, now: u64, pi_top: Option<DeadlineParams>) {
    if e.is_new() {
        setup_new(e, now, pi_top);
        return;
    }

    if before(e.deadline, now) || overflow(e, now, pi_top) {
        let p = effective_params(e, pi_top);
        e.deadline = now.wrapping_add(p.deadline);
        e.runtime = p.runtime as i64;
    }
}

/// `runtime_exceeded(clock, e)`: called from tick / `update_curr`.
///
/// A `HEAD` entity is never budget-constrained and always returns false.
/// If the deadline has been missed, charges the overshoot to the budget so
/// a task that runs past its deadline doesn't steal bandwidth from the
/// next instance.
pub fn runtime_exceeded(e: &mut DeadlineEntity, clock: u64) -> bool {
    if e.is_head() {
        return false;
    }

    let dmiss = before(e.deadline, clock);
    let rorun = e.runtime <= 0;

    if !dmiss && !rorun {
        return false;
    }

    if dmiss {
        if !rorun {
            e.runtime = 0;
        }
        e.runtime -= (clock - e.deadline) as i64;
    }

    true
}

/// Charges elapsed execution time to the entity's budget. Returns the
/// clamped delta that was charged (spec: "clamp to >= 0", guarding clock
/// skew).
pub fn charge_exec(e: &mut DeadlineEntity, clock: u64) -> u64 {
    let delta = elapsed_since(clock, e.exec_start);
    e.runtime -= delta as i64;
    e.exec_start = clock;
    delta
}

/// Read-only `(C, D)` pair for diagnostics and the bandwidth-isolation
/// property test; not part of the original operation set.
#[must_use]
pub fn bandwidth_ratio(e: &DeadlineEntity) -> (u64, u64) {
    (e.params.runtime, e.params.period)
}
