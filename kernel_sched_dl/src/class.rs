//! The class operation vector consumed by the outer scheduler (spec 6).
//!
//! Each operation here is a thin, named wrapper around [`RootDomain`] and
//! [`DeadlineRunQueue`] calls, invoked with the relevant run-queue lock
//! held by the host framework except `task_fork`, `task_dead` and
//! `wait_interval`, which manage their own locking (spec 6).

use crate::balancer::RootDomain;
use crate::entity::DeadlineEntity;
use crate::error::SchedDlError;
use crate::timer::TimerDriver;
use crate::types::{CpuMask, DeadlineParams, EnqueueFlags, EntityFlags, TaskId};

/// What the host framework should do after a class operation returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reschedule {
    /// No change to who should run next.
    None,
    /// The local CPU should re-run `pick_next_task`.
    Local,
}

/// `enqueue_task` (spec 6).
pub fn enqueue_task<T: TimerDriver>(rd: &RootDomain<T>, cpu: usize, id: TaskId, flags: EnqueueFlags) {
    rd.enqueue_task(cpu, id, flags);
}

/// `dequeue_task` (spec 6).
pub fn dequeue_task<T: TimerDriver>(rd: &RootDomain<T>, cpu: usize, id: TaskId) {
    rd.dequeue_task(cpu, id);
}

/// `yield_task` (spec 4.3, 6): forces the running task to throttle until
/// the next period boundary.
pub fn yield_task<T: TimerDriver>(rd: &RootDomain<T>, cpu: usize) {
    rd.yield_task(cpu);
}

/// `check_preempt_curr` (spec 4.3, 6): does `candidate` preempt the
/// currently running task on `cpu`?
///
/// # Errors
/// [`SchedDlError::CpuNotInDomain`] if `cpu` is outside the domain.
pub fn check_preempt_curr<T: TimerDriver>(
    rd: &RootDomain<T>,
    cpu: usize,
    candidate: TaskId,
) -> Result<Reschedule, SchedDlError> {
    let rq = rd.runqueue(cpu)?.lock();
    Ok(if rq.would_preempt(candidate) {
        Reschedule::Local
    } else {
        Reschedule::None
    })
}

/// `pick_next_task` (spec 4.3, 6).
///
/// # Errors
/// [`SchedDlError::CpuNotInDomain`] if `cpu` is outside the domain.
pub fn pick_next_task<T: TimerDriver>(rd: &RootDomain<T>, cpu: usize) -> Result<Option<TaskId>, SchedDlError> {
    Ok(rd.runqueue(cpu)?.lock().pick_next_task())
}

/// `put_prev_task` (spec 4.3, 6).
///
/// # Errors
/// [`SchedDlError::CpuNotInDomain`] if `cpu` is outside the domain.
pub fn put_prev_task<T: TimerDriver>(rd: &RootDomain<T>, cpu: usize, id: TaskId) -> Result<(), SchedDlError> {
    rd.runqueue(cpu)?.lock().put_prev_task(id);
    Ok(())
}

/// `set_curr_task` (spec 6): used when a task switches into this class
/// while already executing (e.g. `switched_to`).
///
/// # Errors
/// [`SchedDlError::CpuNotInDomain`] if `cpu` is outside the domain.
pub fn set_curr_task<T: TimerDriver>(rd: &RootDomain<T>, cpu: usize, id: TaskId) -> Result<(), SchedDlError> {
    rd.runqueue(cpu)?.lock().set_curr_task(id);
    Ok(())
}

/// `task_tick` (spec 4.3, 6): the per-tick `update_curr` accounting pass.
pub fn task_tick<T: TimerDriver>(rd: &RootDomain<T>, cpu: usize, now: u64) {
    rd.task_tick(cpu, now);
}

/// `task_fork` (spec 6): creates a new, throttled entity and admits it to
/// the least-loaded eligible CPU. Manages its own locking.
///
/// # Errors
/// [`SchedDlError::InvalidParams`] if no CPU in `cpus_allowed` is part of
/// this domain, or bandwidth admission is refused.
pub fn task_fork<T: TimerDriver>(
    rd: &RootDomain<T>,
    id: TaskId,
    params: DeadlineParams,
    cpus_allowed: CpuMask,
) -> Result<usize, SchedDlError> {
    rd.task_fork(id, params, cpus_allowed)
}

/// `task_dead` (spec 6): cancels the timer, evicts the task, returns its
/// bandwidth. Manages its own locking.
///
/// # Errors
/// [`SchedDlError::TaskNotResident`] if the task was not on `cpu`.
pub fn task_dead<T: TimerDriver>(rd: &RootDomain<T>, cpu: usize, id: TaskId) -> Result<(), SchedDlError> {
    rd.task_dead(cpu, id)
}

/// `select_task_rq` (spec 6): the least-loaded CPU in `cpus_allowed`.
#[must_use]
pub fn select_task_rq<T: TimerDriver>(rd: &RootDomain<T>, cpus_allowed: CpuMask) -> Option<usize> {
    rd.select_task_rq(cpus_allowed)
}

/// `set_cpus_allowed` (spec 6): narrows or widens a resident task's
/// affinity mask and refreshes its pushable-tree membership accordingly
/// (spec 4.5, "Maintained on ... affinity changes").
///
/// # Errors
/// [`SchedDlError::TaskNotResident`] if the task was not on `cpu`.
pub fn set_cpus_allowed<T: TimerDriver>(
    rd: &RootDomain<T>,
    cpu: usize,
    id: TaskId,
    mask: CpuMask,
) -> Result<(), SchedDlError> {
    rd.set_cpus_allowed(cpu, id, mask)
}

/// `rq_online` (spec 6, out-of-scope hot-plug plumbing at the framework
/// level): marks `cpu` eligible for the balancer's `find_later_rq` and
/// `pull_dl_task` scans again. Does not move any task; the framework is
/// expected to have already drained `cpu` before taking it offline and to
/// repopulate it through ordinary `task_fork`/migration afterwards.
pub fn rq_online<T: TimerDriver>(rd: &RootDomain<T>, cpu: usize) {
    rd.set_cpu_online(cpu, true);
}

/// `rq_offline` (spec 6): excludes `cpu` from balancer target selection.
pub fn rq_offline<T: TimerDriver>(rd: &RootDomain<T>, cpu: usize) {
    rd.set_cpu_online(cpu, false);
}

/// `pre_schedule` hook (spec 4.6, 6).
pub fn pre_schedule<T: TimerDriver>(rd: &RootDomain<T>, cpu: usize) {
    rd.pre_schedule(cpu);
}

/// `post_schedule` hook (spec 4.6, 6).
pub fn post_schedule<T: TimerDriver>(rd: &RootDomain<T>, cpu: usize) {
    rd.post_schedule(cpu);
}

/// `task_woken` hook (spec 4.6, 6).
pub fn task_woken<T: TimerDriver>(rd: &RootDomain<T>, cpu: usize, woken: TaskId) {
    rd.task_woken(cpu, woken);
}

/// `prio_changed` (spec 6): applies a `HEAD`/`BOOSTED` flag change and
/// re-checks preemption against the new priority.
///
/// # Errors
/// [`SchedDlError::CpuNotInDomain`] if `cpu` is outside the domain.
pub fn prio_changed<T: TimerDriver>(
    rd: &RootDomain<T>,
    cpu: usize,
    id: TaskId,
    head: bool,
    boosted: bool,
) -> Result<Reschedule, SchedDlError> {
    let mut rq = rd.runqueue(cpu)?.lock();
    if let Some(task) = rq.get_mut(id) {
        task.entity.flags.set(EntityFlags::HEAD, head);
        task.entity.flags.set(EntityFlags::BOOSTED, boosted);
    }
    Ok(if rq.would_preempt(id) {
        Reschedule::Local
    } else {
        Reschedule::None
    })
}

/// `switched_from` (spec 4.6, 6): the task just left the deadline class
/// (`switched_from_dl`); the vacated queue may now pull work.
pub fn switched_from<T: TimerDriver>(rd: &RootDomain<T>, cpu: usize) {
    rd.switched_from_dl(cpu);
}

/// `switched_to` (spec 4.6, 6): the task just entered the deadline class;
/// materialise its parameters against the live clock and push if this
/// leaves `cpu` overloaded.
///
/// # Errors
/// [`SchedDlError::CpuNotInDomain`] if `cpu` is outside the domain.
pub fn switched_to<T: TimerDriver>(
    rd: &RootDomain<T>,
    cpu: usize,
    id: TaskId,
    params: DeadlineParams,
    cpus_allowed: CpuMask,
) -> Result<(), SchedDlError> {
    {
        let mut rq = rd.runqueue(cpu)?.lock();
        if !rq.contains(id) {
            rq.admit(crate::rq::Task {
                id,
                entity: DeadlineEntity::new(params, cpus_allowed),
            });
        }
        rq.enqueue_task(id, EnqueueFlags::empty(), None);
    }
    rd.switched_to_dl(cpu);
    Ok(())
}

/// `timer_fired` (spec 4.4): the throttling timer's fire callback. Clears
/// the throttle, re-enqueues with `REPLENISH`, pushes if this leaves `cpu`
/// overloaded, and reports whether the newly-ready task now preempts
/// whatever is running. Manages its own locking.
///
/// # Errors
/// [`SchedDlError::CpuNotInDomain`] if `cpu` is outside the domain.
pub fn timer_fired<T: TimerDriver>(rd: &RootDomain<T>, cpu: usize, id: TaskId) -> Result<Reschedule, SchedDlError> {
    rd.timer_fired(cpu, id);
    let rq = rd.runqueue(cpu)?.lock();
    Ok(if rq.would_preempt(id) {
        Reschedule::Local
    } else {
        Reschedule::None
    })
}

/// `wait_interval` (spec 4.3, 6): suspends `id` until a caller-supplied
/// instant, or the next period boundary, delaying the wake-up if it would
/// still overflow the bandwidth envelope. Manages its own locking.
///
/// # Errors
/// [`SchedDlError::CpuNotInDomain`] if `cpu` is outside the domain.
pub fn wait_interval<T: TimerDriver>(
    rd: &RootDomain<T>,
    cpu: usize,
    id: TaskId,
    until: Option<u64>,
) -> Result<u64, SchedDlError> {
    Ok(rd.runqueue(cpu)?.lock().wait_interval(id, until))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedDlConfig;

    fn domain(nr_cpus: usize) -> RootDomain {
        RootDomain::new(SchedDlConfig::new(nr_cpus))
    }

    fn params() -> DeadlineParams {
        DeadlineParams::new(2_000_000, 10_000_000, 10_000_000).unwrap()
    }

    #[test]
    fn fork_then_pick_next_returns_the_task() {
        let rd = domain(1);
        let id = TaskId(1);
        let cpu = task_fork(&rd, id, params(), CpuMask::single(0)).unwrap();
        enqueue_task(&rd, cpu, id, EnqueueFlags::empty());
        assert_eq!(pick_next_task(&rd, cpu).unwrap(), Some(id));
    }

    #[test]
    fn set_cpus_allowed_updates_pushable_membership() {
        let rd = domain(2);
        let id = TaskId(1);
        let cpu = task_fork(&rd, id, params(), CpuMask::single(0)).unwrap();
        enqueue_task(&rd, cpu, id, EnqueueFlags::empty());
        set_cpus_allowed(&rd, cpu, id, CpuMask::span(2)).unwrap();
        assert!(rd.runqueue(cpu).unwrap().lock().get(id).unwrap().entity.is_migratory());
    }

    #[test]
    fn prio_changed_head_forces_preemption() {
        let rd = domain(1);
        let running = TaskId(1);
        let cpu = task_fork(&rd, running, params(), CpuMask::single(0)).unwrap();
        enqueue_task(&rd, cpu, running, EnqueueFlags::empty());
        pick_next_task(&rd, cpu).unwrap();

        let other = TaskId(2);
        task_fork(&rd, other, params(), CpuMask::single(cpu)).unwrap();
        let verdict = prio_changed(&rd, cpu, other, true, false).unwrap();
        assert_eq!(verdict, Reschedule::Local);
    }

    #[test]
    fn timer_fired_clears_throttle_and_re_enqueues() {
        let rd = domain(1);
        let id = TaskId(1);
        let cpu = task_fork(&rd, id, params(), CpuMask::single(0)).unwrap();
        enqueue_task(&rd, cpu, id, EnqueueFlags::empty());
        pick_next_task(&rd, cpu).unwrap();

        {
            let mut rq = rd.runqueue(cpu).unwrap().lock();
            rq.advance_clock(10_000_000); // blow through the 2ms budget
            rq.update_curr();
            assert!(rq.get(id).unwrap().entity.is_throttled());
        }

        timer_fired(&rd, cpu, id).unwrap();
        let rq = rd.runqueue(cpu).unwrap().lock();
        assert!(!rq.get(id).unwrap().entity.is_throttled());
        assert!(rq.has_running_candidate());
    }
}
