//! Per-task deadline scheduling state.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::types::{CpuMask, DeadlineParams, EntityFlags};

/// Dynamic scheduling state for one task under this class (spec 3).
///
/// Invariant: exactly one of `{off-queue, on active tree}`; `throttled =>`
/// off the active tree and a pending timer.
#[derive(Debug)]
pub struct DeadlineEntity {
    pub params: DeadlineParams,
    /// Absolute deadline, monotonic ns.
    pub deadline: u64,
    /// Remaining budget; may go transiently negative to record overrun debt.
    pub runtime: i64,
    pub flags: EntityFlags,
    /// Hard affinity mask.
    pub cpus_allowed: CpuMask,
    /// Cached popcount of the affinity mask.
    pub nr_cpus_allowed: u32,
    /// Wall-clock instant this entity last started running.
    pub exec_start: u64,
    /// Monotonic insertion sequence, used only to break same-deadline ties.
    pub(crate) seq: u64,
    /// Latches the "deadline still in the past after replenish" log once
    /// per occurrence rather than every call (spec 7).
    regression_logged: AtomicBool,
}

impl Clone for DeadlineEntity {
    fn clone(&self) -> Self {
        Self {
            params: self.params,
            deadline: self.deadline,
            runtime: self.runtime,
            flags: self.flags,
            cpus_allowed: self.cpus_allowed,
            nr_cpus_allowed: self.nr_cpus_allowed,
            exec_start: self.exec_start,
            seq: self.seq,
            regression_logged: AtomicBool::new(self.regression_logged.load(Ordering::Relaxed)),
        }
    }
}

impl DeadlineEntity {
    /// A freshly forked entity: throttled, not yet materialised, off-queue.
    #[must_use]
    pub fn new(params: DeadlineParams, cpus_allowed: CpuMask) -> Self {
        Self {
            params,
            deadline: 0,
            runtime: 0,
            flags: EntityFlags::NEW,
            nr_cpus_allowed: cpus_allowed.popcount(),
            cpus_allowed,
            exec_start: 0,
            seq: 0,
            regression_logged: AtomicBool::new(false),
        }
    }

    /// Replace the affinity mask, refreshing the cached popcount.
    pub fn set_cpus_allowed(&mut self, mask: CpuMask) {
        self.cpus_allowed = mask;
        self.nr_cpus_allowed = mask.popcount();
    }

    #[must_use]
    pub fn is_migratory(&self) -> bool {
        self.nr_cpus_allowed > 1
    }

    #[must_use]
    pub fn is_new(&self) -> bool {
        self.flags.contains(EntityFlags::NEW)
    }

    #[must_use]
    pub fn is_throttled(&self) -> bool {
        self.flags.contains(EntityFlags::THROTTLED)
    }

    #[must_use]
    pub fn is_head(&self) -> bool {
        self.flags.contains(EntityFlags::HEAD)
    }

    #[must_use]
    pub fn is_boosted(&self) -> bool {
        self.flags.contains(EntityFlags::BOOSTED)
    }

    pub(crate) fn mark_regression_logged(&self) -> bool {
        self.regression_logged.swap(true, Ordering::Relaxed)
    }

    pub(crate) fn clear_regression_latch(&self) {
        self.regression_logged.store(false, Ordering::Relaxed);
    }
}
