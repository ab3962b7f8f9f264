//! Abstraction over the host's high-resolution timer, so the throttling
//! timer (spec 4.4) can be driven by a real hrtimer in production and by a
//! deterministic fake in tests and the trace demo.

extern crate alloc;

use crate::types::TaskId;

/// A single pending fire: which task's budget replenishment it drives and
/// the absolute instant it is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerHandle {
    pub task: TaskId,
    pub fire_at: u64,
}

/// What the host scheduler must provide to arm/cancel the per-task
/// throttling timer (spec 4.4, "the timer is the sole path back onto the
/// active tree for a throttled entity").
///
/// Implementors decide how "fire" is delivered back to the class (an
/// interrupt callback, a channel, a poll loop); this trait only covers
/// arming and cancelling.
pub trait TimerDriver {
    /// Arms (or re-arms) the timer for `task` to fire at `fire_at`. A
    /// second `arm` for the same task before it fires replaces the
    /// pending one rather than stacking two.
    fn arm(&mut self, task: TaskId, fire_at: u64);

    /// Cancels any pending timer for `task`. A no-op if none is pending
    /// (e.g. the task changed class before the timer fired, spec 7
    /// `TaskChangedClassDuringTimer`).
    fn cancel(&mut self, task: TaskId);
}

/// A deterministic timer double: fires are recorded, not delivered
/// asynchronously. Callers advance a virtual clock and drain due timers
/// themselves, which is what the trace demo and the integration tests do.
#[derive(Debug, Default)]
pub struct SimTimerDriver {
    pending: alloc::vec::Vec<TimerHandle>,
}

impl SimTimerDriver {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: alloc::vec::Vec::new(),
        }
    }

    /// Removes and returns every handle due at or before `clock`, earliest
    /// first.
    pub fn drain_due(&mut self, clock: u64) -> alloc::vec::Vec<TimerHandle> {
        let mut due = alloc::vec::Vec::new();
        let mut i = 0;
        while i < self.pending.len() {
            if !crate::time::before(clock, self.pending[i].fire_at) {
                due.push(self.pending.remove(i));
            } else {
                i += 1;
            }
        }
        due.sort_by_key(|h| h.fire_at);
        due
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_pending(&self, task: TaskId) -> bool {
        self.pending.iter().any(|h| h.task == task)
    }
}

impl TimerDriver for SimTimerDriver {
    fn arm(&mut self, task: TaskId, fire_at: u64) {
        self.pending.retain(|h| h.task != task);
        self.pending.push(TimerHandle { task, fire_at });
    }

    fn cancel(&mut self, task: TaskId) {
        self.pending.retain(|h| h.task != task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arm_replaces_previous_pending() {
        let mut timer = SimTimerDriver::new();
        timer.arm(TaskId(1), 100);
        timer.arm(TaskId(1), 200);
        assert_eq!(timer.pending_count(), 1);
        assert!(timer.is_pending(TaskId(1)));
    }

    #[test]
    fn cancel_removes_pending() {
        let mut timer = SimTimerDriver::new();
        timer.arm(TaskId(1), 100);
        timer.cancel(TaskId(1));
        assert!(!timer.is_pending(TaskId(1)));
    }

    #[test]
    fn drain_due_is_ordered_and_partial() {
        let mut timer = SimTimerDriver::new();
        timer.arm(TaskId(1), 300);
        timer.arm(TaskId(2), 100);
        timer.arm(TaskId(3), 500);
        let due = timer.drain_due(300);
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].task, TaskId(2));
        assert_eq!(due[1].task, TaskId(1));
        assert_eq!(timer.pending_count(), 1);
    }
}
