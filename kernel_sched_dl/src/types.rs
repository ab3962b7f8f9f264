//! Shared identifiers, parameters and flags.

extern crate alloc;

use bitflags::bitflags;

use crate::error::SchedDlError;

/// Identifies a task across its lifetime, independent of which run-queue
/// currently owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub u64);

/// A bitset of CPU ids. The crate supports up to 64 CPUs per root domain,
/// which comfortably covers every target this kernel boots on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuMask(pub u64);

impl CpuMask {
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn single(cpu: usize) -> Self {
        Self(1u64 << cpu)
    }

    #[must_use]
    pub const fn span(nr_cpus: usize) -> Self {
        if nr_cpus >= 64 {
            Self(u64::MAX)
        } else {
            Self((1u64 << nr_cpus) - 1)
        }
    }

    #[must_use]
    pub const fn contains(&self, cpu: usize) -> bool {
        self.0 & (1u64 << cpu) != 0
    }

    #[must_use]
    pub const fn intersection(&self, other: &Self) -> Self {
        Self(self.0 & other.0)
    }

    #[must_use]
    pub fn popcount(&self) -> u32 {
        self.0.count_ones()
    }

    /// Iterate set CPU ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        let mask = self.0;
        (0..64).filter(move |cpu| mask & (1u64 << cpu) != 0)
    }
}

/// Static task parameters: worst-case runtime, relative deadline, period
/// (all in nanoseconds). Invariant: `C <= D <= P`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineParams {
    pub runtime: u64,
    pub deadline: u64,
    pub period: u64,
}

impl DeadlineParams {
    /// # Errors
    /// Returns [`SchedDlError::InvalidParams`] if `C <= D <= P` is violated.
    pub fn new(runtime: u64, deadline: u64, period: u64) -> Result<Self, SchedDlError> {
        if runtime == 0 || runtime > deadline || deadline > period {
            return Err(SchedDlError::InvalidParams);
        }
        Ok(Self {
            runtime,
            deadline,
            period,
        })
    }

    /// The denominator used for bandwidth comparisons: `D`, except when
    /// `D == P` it is equivalent to use either (spec 4.2).
    #[must_use]
    pub fn bandwidth_denominator(&self) -> u64 {
        self.deadline
    }
}

bitflags! {
    /// Flags recognised on [`crate::class`] enqueue calls.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EnqueueFlags: u32 {
        /// Invoked from the throttling timer callback: force a replenishment
        /// rather than an arrival/wake-up update.
        const REPLENISH = 1 << 0;
        /// Coming back from a blocked (non-runnable) state.
        const WAKEUP = 1 << 1;
    }
}

bitflags! {
    /// Per-entity scheduling flags (spec 3, 6).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EntityFlags: u32 {
        /// Parameters not yet materialised against the clock.
        const NEW = 1 << 0;
        /// Budget exhausted, awaiting the throttling timer.
        const THROTTLED = 1 << 1;
        /// Priority-inherited via an external donor entity.
        const BOOSTED = 1 << 2;
        /// Absolute-priority system entity; always preempts non-head.
        const HEAD = 1 << 3;
        /// On budget exhaustion, demote to the RT class.
        const BWRECL_RT = 1 << 4;
        /// On budget exhaustion, demote to the default (non-RT) class.
        const BWRECL_NR = 1 << 5;
        /// On budget exhaustion, remain deadline and overrun into the next instance.
        const BWRECL_DL = 1 << 6;
    }
}

/// Names the class operation vector consumed by the host scheduler
/// (spec 6). Purely documentary / used for log tagging - this crate
/// implements one fixed class, not an open hierarchy (spec 9, "tagged
/// variants, not inheritance").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassOp {
    EnqueueTask,
    DequeueTask,
    YieldTask,
    CheckPreemptCurr,
    PickNextTask,
    PutPrevTask,
    SetCurrTask,
    TaskTick,
    TaskFork,
    TaskDead,
    SelectTaskRq,
    SetCpusAllowed,
    RqOnline,
    RqOffline,
    PreSchedule,
    PostSchedule,
    TaskWoken,
    PrioChanged,
    SwitchedFrom,
    SwitchedTo,
    WaitInterval,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_mask_basics() {
        let m = CpuMask::span(4);
        assert!(m.contains(0));
        assert!(m.contains(3));
        assert!(!m.contains(4));
        assert_eq!(m.popcount(), 4);
        assert_eq!(m.iter().collect::<alloc::vec::Vec<_>>(), alloc::vec![0, 1, 2, 3]);
    }

    #[test]
    fn params_validate_ordering() {
        assert!(DeadlineParams::new(5, 10, 10).is_ok());
        assert!(DeadlineParams::new(10, 5, 10).is_err());
        assert!(DeadlineParams::new(5, 10, 5).is_err());
        assert!(DeadlineParams::new(0, 10, 10).is_err());
    }
}
