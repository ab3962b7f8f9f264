//! In-band-recoverable conditions.
//!
//! None of these are fallible return paths in the scheduling fast path
//! (spec 7): the core never returns `Err` from `enqueue`/`dequeue`/`tick`.
//! This enum exists so the handful of logged, self-correcting conditions
//! format consistently at their `log::warn!`/`log::error!` call sites, and
//! so admission-time validation (`DeadlineParams::new`) has a real error
//! type instead of a bare `bool`.

use core::fmt;

/// Errors surfaced by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SchedDlError {
    /// `C <= D <= P` was violated when constructing [`crate::types::DeadlineParams`].
    #[error("invalid deadline parameters: require runtime <= deadline <= period")]
    InvalidParams,
    /// A CPU id referenced a run-queue outside the root domain's span.
    #[error("cpu {0} is not a member of this root domain")]
    CpuNotInDomain(usize),
    /// A task id was not found on the run-queue it was expected on.
    #[error("task not resident on the expected run-queue")]
    TaskNotResident,
}

/// The logged-but-non-fatal conditions of spec 7, reified purely for
/// structured logging - never propagated to a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverableCondition {
    /// `replenish` looped and the deadline was still in the past afterwards;
    /// forcibly reset to `(now + D, C)`.
    ClockRegressionOnReplenish,
    /// A measured execution delta was negative; clamped to zero.
    NegativeExecDelta,
    /// The throttling timer's computed fire instant was already past;
    /// skipped arming and re-enqueued immediately.
    TimerFiresInPast,
    /// `double_lock_balance` could not establish the paired lock within the
    /// retry budget; the migration attempt was abandoned.
    LockInversionRetriesExhausted,
    /// The timer callback observed the task had left the deadline class.
    TaskChangedClassDuringTimer,
}

impl fmt::Display for RecoverableCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClockRegressionOnReplenish => {
                write!(f, "deadline still in the past after replenishment, resetting")
            }
            Self::NegativeExecDelta => write!(f, "negative exec delta clamped to zero"),
            Self::TimerFiresInPast => write!(f, "throttling timer instant already past, re-enqueuing"),
            Self::LockInversionRetriesExhausted => {
                write!(f, "gave up on paired run-queue lock after retry budget")
            }
            Self::TaskChangedClassDuringTimer => {
                write!(f, "task left the deadline class before timer fired")
            }
        }
    }
}
