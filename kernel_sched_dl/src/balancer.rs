//! The root domain: one run-queue per CPU plus the push/pull balancer that
//! keeps migratable work spread across an overloaded fleet (spec 4.6).

extern crate alloc;

use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use alloc::vec::Vec;
use spin::{Mutex, MutexGuard};

use crate::config::SchedDlConfig;
use crate::entity::DeadlineEntity;
use crate::error::{RecoverableCondition, SchedDlError};
use crate::rq::{DeadlineRunQueue, Task};
use crate::stats::BalancerStats;
use crate::time::before;
use crate::timer::{SimTimerDriver, TimerDriver};
use crate::types::{CpuMask, DeadlineParams, EnqueueFlags, EntityFlags, TaskId};

/// A partition of CPUs that share a balancer scope (spec 3, "RootDomain").
///
/// `T` is the timer driver used to arm/cancel the per-task throttling
/// timer; it defaults to the in-memory simulation driver used by this
/// crate's own tests and trace demo.
pub struct RootDomain<T: TimerDriver = SimTimerDriver> {
    runqueues: Vec<Mutex<DeadlineRunQueue>>,
    config: SchedDlConfig,
    span: CpuMask,
    dlo_mask: AtomicU64,
    dlo_count: AtomicU32,
    /// CPUs currently participating in balancer target selection (spec 6,
    /// `rq_online`/`rq_offline`). Hot-plug itself is an external
    /// collaborator (spec 1); this only gates whether `find_later_rq` and
    /// `pull_dl_task` may pick `cpu` as a source or destination.
    online_mask: AtomicU64,
    total_bw_permille: AtomicU64,
    stats: BalancerStats,
    timer: Mutex<T>,
}

impl RootDomain<SimTimerDriver> {
    #[must_use]
    pub fn new(config: SchedDlConfig) -> Self {
        Self::with_timer_driver(config, SimTimerDriver::new())
    }
}

impl<T: TimerDriver> RootDomain<T> {
    #[must_use]
    pub fn with_timer_driver(config: SchedDlConfig, timer: T) -> Self {
        let runqueues = (0..config.nr_cpus).map(DeadlineRunQueue::new).map(Mutex::new).collect();
        Self {
            runqueues,
            span: CpuMask::span(config.nr_cpus),
            config,
            dlo_mask: AtomicU64::new(0),
            dlo_count: AtomicU32::new(0),
            online_mask: AtomicU64::new(CpuMask::span(config.nr_cpus).0),
            total_bw_permille: AtomicU64::new(0),
            stats: BalancerStats::new(),
            timer: Mutex::new(timer),
        }
    }

    /// `rq_online`/`rq_offline` (spec 6): toggles `cpu`'s eligibility as a
    /// push/pull target. Does not itself move any resident task.
    pub fn set_cpu_online(&self, cpu: usize, online: bool) {
        let bit = 1u64 << cpu;
        if online {
            self.online_mask.fetch_or(bit, Ordering::Relaxed);
        } else {
            self.online_mask.fetch_and(!bit, Ordering::Relaxed);
        }
    }

    #[must_use]
    pub fn online_mask(&self) -> CpuMask {
        CpuMask(self.online_mask.load(Ordering::Relaxed))
    }

    #[must_use]
    pub fn config(&self) -> SchedDlConfig {
        self.config
    }

    #[must_use]
    pub fn span(&self) -> CpuMask {
        self.span
    }

    #[must_use]
    pub fn stats(&self) -> &BalancerStats {
        &self.stats
    }

    /// # Errors
    /// [`SchedDlError::CpuNotInDomain`] if `cpu` is outside `0..nr_cpus`.
    pub fn runqueue(&self, cpu: usize) -> Result<&Mutex<DeadlineRunQueue>, SchedDlError> {
        self.runqueues.get(cpu).ok_or(SchedDlError::CpuNotInDomain(cpu))
    }

    fn lock(&self, cpu: usize) -> MutexGuard<'_, DeadlineRunQueue> {
        self.runqueues[cpu].lock()
    }

    /// Acquires two distinct run-queue locks, always in ascending CPU-id
    /// order on the underlying mutexes to avoid inversion, but returns the
    /// guards back as `(guard_a, guard_b)` matching the caller's argument
    /// order regardless of which id is numerically lower (spec 4.6, "Lock
    /// discipline"; 9, "Paired locking"). Acquisition always starts fresh
    /// here rather than upgrading a lock the caller already holds, so the
    /// try-lock/backoff dance `double_lock_balance` needs under real
    /// concurrent callers collapses to a plain ordered double acquire;
    /// callers still re-validate task residency after the fact, as the
    /// protocol requires regardless of how the locks were obtained.
    fn lock_pair(&self, a: usize, b: usize) -> (MutexGuard<'_, DeadlineRunQueue>, MutexGuard<'_, DeadlineRunQueue>) {
        debug_assert_ne!(a, b);
        if a < b {
            let ga = self.runqueues[a].lock();
            let gb = self.runqueues[b].lock();
            (ga, gb)
        } else {
            let gb = self.runqueues[b].lock();
            let ga = self.runqueues[a].lock();
            (ga, gb)
        }
    }

    /// Publishes `cpu`'s overload membership into `dlo_mask`/`dlo_count`.
    /// Set-bit-then-increment on entry into overload, decrement-then-clear
    /// on exit, so a reader observing a non-zero count is guaranteed a set
    /// bit (spec 3, 4.6).
    fn sync_overload(&self, cpu: usize, overloaded: bool) {
        let bit = 1u64 << cpu;
        let was_set = self.dlo_mask.load(Ordering::Relaxed) & bit != 0;
        if overloaded && !was_set {
            self.dlo_mask.fetch_or(bit, Ordering::Release);
            self.dlo_count.fetch_add(1, Ordering::Release);
        } else if !overloaded && was_set {
            self.dlo_count.fetch_sub(1, Ordering::Release);
            self.dlo_mask.fetch_and(!bit, Ordering::Release);
        }
    }

    #[must_use]
    pub fn overloaded_mask(&self) -> CpuMask {
        CpuMask(self.dlo_mask.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn overloaded_count(&self) -> u32 {
        self.dlo_count.load(Ordering::Acquire)
    }

    fn bandwidth_permille(params: DeadlineParams) -> u64 {
        params.runtime.saturating_mul(1000) / params.period.max(1)
    }

    /// Admission-time bandwidth check (spec 5, "total_bw"). No-op if the
    /// config's limit is `0`.
    ///
    /// # Errors
    /// [`SchedDlError::InvalidParams`] if admitting would exceed the
    /// domain's configured bandwidth ceiling.
    pub fn reserve_bandwidth(&self, params: DeadlineParams) -> Result<(), SchedDlError> {
        let limit = self.config.bandwidth_limit_permille as u64 * self.config.nr_cpus as u64;
        if limit == 0 {
            return Ok(());
        }
        let added = Self::bandwidth_permille(params);
        let prev = self.total_bw_permille.fetch_add(added, Ordering::Relaxed);
        if prev + added > limit {
            self.total_bw_permille.fetch_sub(added, Ordering::Relaxed);
            return Err(SchedDlError::InvalidParams);
        }
        Ok(())
    }

    /// Releases bandwidth reserved by [`Self::reserve_bandwidth`] (spec 3,
    /// "`total_bw`: ... reduced on `task_dead`").
    pub fn release_bandwidth(&self, params: DeadlineParams) {
        let removed = Self::bandwidth_permille(params);
        self.total_bw_permille.fetch_sub(removed, Ordering::Relaxed);
    }

    /// `task_fork` (spec 6): admits a freshly created, throttled entity
    /// onto whichever CPU in `cpus_allowed` currently carries the fewest
    /// resident tasks. Not yet on any tree; materialises on first
    /// `enqueue_task`.
    ///
    /// # Errors
    /// [`SchedDlError::InvalidParams`] if no CPU in `cpus_allowed` is part
    /// of this domain, or the bandwidth reservation is refused.
    pub fn task_fork(&self, id: TaskId, params: DeadlineParams, cpus_allowed: CpuMask) -> Result<usize, SchedDlError> {
        let cpu = self.select_task_rq(cpus_allowed).ok_or(SchedDlError::InvalidParams)?;
        self.reserve_bandwidth(params)?;
        let entity = DeadlineEntity::new(params, cpus_allowed);
        self.lock(cpu).admit(Task { id, entity });
        Ok(cpu)
    }

    /// `select_task_rq` (spec 6): the least-loaded eligible CPU.
    #[must_use]
    pub fn select_task_rq(&self, cpus_allowed: CpuMask) -> Option<usize> {
        cpus_allowed
            .intersection(&self.span)
            .iter()
            .min_by_key(|&cpu| self.lock(cpu).nr_total())
    }

    /// `task_dead` (spec 6): cancels the pending timer, evicts the task
    /// from its run-queue, and returns its bandwidth to the domain.
    ///
    /// # Errors
    /// [`SchedDlError::TaskNotResident`] if the task was not on `cpu`.
    pub fn task_dead(&self, cpu: usize, id: TaskId) -> Result<(), SchedDlError> {
        self.timer.lock().cancel(id);
        let mut rq = self.lock(cpu);
        rq.dequeue_task(id);
        let task = rq.evict(id).ok_or(SchedDlError::TaskNotResident)?;
        let overloaded = rq.is_overloaded();
        drop(rq);
        self.sync_overload(cpu, overloaded);
        self.release_bandwidth(task.entity.params);
        Ok(())
    }

    /// `enqueue_task` (spec 4.3, 6). Arms the throttling timer if
    /// `update_curr` (invoked transitively when re-enqueueing a running
    /// task) reports the task should throttle; this only happens when
    /// called with `REPLENISH` against an already-running id, which
    /// callers should route through [`Self::task_tick`] instead.
    pub fn enqueue_task(&self, cpu: usize, id: TaskId, flags: EnqueueFlags) {
        let mut rq = self.lock(cpu);
        rq.enqueue_task(id, flags, None);
        self.timer.lock().cancel(id);
        let overloaded = rq.is_overloaded();
        drop(rq);
        self.sync_overload(cpu, overloaded);
    }

    /// `set_cpus_allowed` (spec 4.5, 6): narrows or widens a resident
    /// task's affinity mask and re-syncs pushable-tree membership and the
    /// domain's overload mask accordingly.
    ///
    /// # Errors
    /// [`SchedDlError::TaskNotResident`] if the task was not on `cpu`.
    pub fn set_cpus_allowed(&self, cpu: usize, id: TaskId, mask: CpuMask) -> Result<(), SchedDlError> {
        let mut rq = self.lock(cpu);
        let task = rq.get_mut(id).ok_or(SchedDlError::TaskNotResident)?;
        task.entity.set_cpus_allowed(mask);
        rq.refresh_pushable_membership(id);
        let overloaded = rq.is_overloaded();
        drop(rq);
        self.sync_overload(cpu, overloaded);
        Ok(())
    }

    /// `dequeue_task` (spec 4.3, 6).
    pub fn dequeue_task(&self, cpu: usize, id: TaskId) {
        let mut rq = self.lock(cpu);
        rq.dequeue_task(id);
        let overloaded = rq.is_overloaded();
        drop(rq);
        self.sync_overload(cpu, overloaded);
    }

    /// `task_tick` / `update_curr` (spec 4.3, 6). Charges elapsed runtime
    /// to the running task and, if it throttles, arms the replenishment
    /// timer. `update_curr` itself already collapses the "fire instant
    /// already past" case (spec 7 `TimerFiresInPast`) into an immediate
    /// `REPLENISH` re-enqueue, so a `Some` return here always carries a
    /// fire instant at or after `now`. `rq.running()` still names the
    /// throttled task: it stays "current" until the framework's own
    /// reschedule calls `put_prev_task`/`pick_next_task`.
    pub fn task_tick(&self, cpu: usize, now: u64) {
        let mut rq = self.lock(cpu);
        rq.advance_clock(now);
        let running_id = rq.running().map(|t| t.id);
        if let (Some(fire_at), Some(id)) = (rq.update_curr(), running_id) {
            if rq.get(id).is_some_and(Self::arms_throttling_timer) {
                self.timer.lock().arm(id, fire_at);
            }
        }
        let overloaded = rq.is_overloaded();
        drop(rq);
        self.sync_overload(cpu, overloaded);
    }

    /// `yield_task` (spec 4.3, 6): forces the running task to throttle
    /// until the next period boundary, arming the replenishment timer for
    /// it just like a budget-driven throttle would.
    pub fn yield_task(&self, cpu: usize) {
        let mut rq = self.lock(cpu);
        let running_id = rq.running().map(|t| t.id);
        if let (Some(fire_at), Some(id)) = (rq.yield_task(), running_id) {
            if rq.get(id).is_some_and(Self::arms_throttling_timer) {
                self.timer.lock().arm(id, fire_at);
            }
        }
    }

    /// Whether `task`'s throttle should actually arm the replenishment
    /// timer: not while priority-boosted, and not while bandwidth
    /// reclamation is configured to let the entity overrun into its next
    /// instance instead of being timer-replenished (spec 4.4, "not started
    /// when the entity is boosted or reclaim_dl").
    fn arms_throttling_timer(task: &Task) -> bool {
        !task.entity.is_boosted() && !task.entity.flags.contains(EntityFlags::BWRECL_DL)
    }

    /// `find_later_rq` (spec 4.6): a CPU in `cpus_allowed ∩ span` whose
    /// queue is empty or whose `earliest.curr` is later than `deadline`.
    /// Prefers an empty queue, then the latest `earliest.curr`, then
    /// `task_cpu` if it qualifies.
    #[must_use]
    pub fn find_later_rq(&self, deadline: u64, cpus_allowed: CpuMask, task_cpu: usize) -> Option<usize> {
        let mut best_empty: Option<usize> = None;
        let mut qualifying_contains_task_cpu = false;
        let mut best_latest: Option<(usize, u64)> = None;

        let eligible = cpus_allowed.intersection(&self.span).intersection(&self.online_mask());
        for cpu in eligible.iter() {
            let rq = self.lock(cpu);
            if rq.nr_total() == 0 {
                if best_empty.is_none() {
                    best_empty = Some(cpu);
                }
                continue;
            }
            let curr = rq.earliest().curr;
            if curr != 0 && before(deadline, curr) {
                if cpu == task_cpu {
                    qualifying_contains_task_cpu = true;
                }
                match best_latest {
                    Some((_, best_curr)) if !before(best_curr, curr) => {}
                    _ => best_latest = Some((cpu, curr)),
                }
            }
        }

        if let Some(cpu) = best_empty {
            return Some(cpu);
        }
        if qualifying_contains_task_cpu {
            return Some(task_cpu);
        }
        best_latest.map(|(cpu, _)| cpu)
    }

    /// Moves `id` from `from_cpu` to `to_cpu` under paired locks,
    /// re-validating that it is still resident, still not running, and
    /// still permitted on `to_cpu` before committing (spec 4.6, "Paired
    /// locking"; 7, "Lock-inversion on migration").
    fn migrate(&self, id: TaskId, from_cpu: usize, to_cpu: usize) -> bool {
        let mut retries = 0;
        loop {
            let (mut from, mut to) = self.lock_pair(from_cpu, to_cpu);

            let still_valid = from.get(id).is_some_and(|t| {
                from.running().map(|r| r.id) != Some(id) && t.entity.cpus_allowed.contains(to_cpu)
            });

            if !still_valid {
                retries += 1;
                if retries >= self.config.max_lock_retries {
                    self.stats.record_lock_retries_exhausted();
                    log::warn!("{}", RecoverableCondition::LockInversionRetriesExhausted);
                    return false;
                }
                continue;
            }

            from.dequeue_task(id);
            let Some(task) = from.evict(id) else { return false };
            let from_overloaded = from.is_overloaded();
            to.admit(task);
            to.enqueue_task(id, EnqueueFlags::empty(), None);
            let to_overloaded = to.is_overloaded();
            drop(from);
            drop(to);
            self.sync_overload(from_cpu, from_overloaded);
            self.sync_overload(to_cpu, to_overloaded);
            return true;
        }
    }

    /// `push_dl_task` (spec 4.6): migrates the pushable tree's leftmost
    /// task off `cpu` if it is overloaded. Returns `true` if a migration
    /// occurred; `push_dl_tasks` loops this until it returns `false`.
    pub fn push_dl_task(&self, cpu: usize) -> bool {
        let (next, task_cpu_deadline, cpus_allowed) = {
            let rq = self.lock(cpu);
            if !rq.is_overloaded() {
                return false;
            }
            let Some(next) = rq.pushable_leftmost() else {
                return false;
            };
            if rq.running().map(|t| t.id) == Some(next) {
                log::warn!("pushable leftmost was the running task");
                return false;
            }
            let Some(task) = rq.get(next) else { return false };
            if let Some(running) = rq.running() {
                if rq.would_preempt(next) && running.entity.is_migratory() {
                    // Reschedule locally instead of migrating (spec 4.6).
                    return false;
                }
            }
            (next, task.entity.deadline, task.entity.cpus_allowed)
        };

        let Some(target) = self.find_later_rq(task_cpu_deadline, cpus_allowed, cpu) else {
            self.stats.record_push_failure();
            return false;
        };

        let migrated = self.migrate(next, cpu, target);
        if migrated {
            self.stats.record_push();
        } else {
            self.stats.record_push_failure();
        }
        migrated
    }

    /// Pushes every eligible task off `cpu` (spec 4.6, "the caller loops
    /// until it returns false").
    pub fn push_dl_tasks(&self, cpu: usize) {
        while self.push_dl_task(cpu) {}
    }

    /// `pull_dl_task` (spec 4.6): scans `dlo_mask` for a better task to
    /// steal onto `cpu`, ratcheting the acceptance bar (`dmin`) down with
    /// every successful pull so later candidates in the same scan must
    /// beat the best one found so far.
    pub fn pull_dl_task(&self, cpu: usize) -> bool {
        let mut pulled_any = false;
        let mut dmin = self.lock(cpu).earliest().curr;
        let mut dmin_set = dmin != 0;

        let mask = self.overloaded_mask();
        for other in mask.iter() {
            if other == cpu || !self.span.contains(other) || !self.online_mask().contains(other) {
                continue;
            }

            let this_earliest_curr = self.lock(cpu).earliest().curr;
            let other_earliest_next = self.lock(other).earliest().next;
            if this_earliest_curr != 0 && other_earliest_next != 0 && before(this_earliest_curr, other_earliest_next)
            {
                continue;
            }

            let (mut this, mut donor) = self.lock_pair(cpu, other);

            if donor.nr_total() <= 1 {
                continue;
            }

            let Some((candidate, candidate_deadline)) = donor.second_earliest() else {
                continue;
            };

            let beats_this = !dmin_set || before(candidate_deadline, dmin);
            let beats_running = donor
                .running()
                .map_or(true, |r| before(candidate_deadline, r.entity.deadline));

            if beats_this && beats_running {
                donor.dequeue_task(candidate);
                let Some(task) = donor.evict(candidate) else {
                    continue;
                };
                this.admit(task);
                this.enqueue_task(candidate, EnqueueFlags::empty(), None);
                dmin = candidate_deadline;
                dmin_set = true;
                pulled_any = true;
                let this_overloaded = this.is_overloaded();
                let donor_overloaded = donor.is_overloaded();
                drop(this);
                drop(donor);
                self.sync_overload(cpu, this_overloaded);
                self.sync_overload(other, donor_overloaded);
            }
        }

        if pulled_any {
            self.stats.record_pull();
        } else {
            self.stats.record_pull_failure();
        }
        pulled_any
    }

    /// Throttling timer fire callback (spec 4.4): clears `THROTTLED`,
    /// re-enqueues with `REPLENISH`, and attempts a push if this leaves
    /// `cpu` overloaded. The "task already left the deadline class"
    /// no-op case is detected by the task no longer being resident on
    /// `cpu` - the caller's timer-cancel-on-`switched_from`/`task_dead`
    /// discipline (spec 4.4, "Cancellation/timeout") keeps that in sync.
    pub fn timer_fired(&self, cpu: usize, id: TaskId) {
        let overloaded = {
            let mut rq = self.lock(cpu);
            if !rq.contains(id) {
                log::warn!("{}", RecoverableCondition::TaskChangedClassDuringTimer);
                return;
            }
            rq.get_mut(id).unwrap().entity.flags.remove(EntityFlags::THROTTLED);
            rq.enqueue_task(id, EnqueueFlags::REPLENISH, None);
            rq.is_overloaded()
        };
        self.sync_overload(cpu, overloaded);
        if overloaded {
            self.push_dl_task(cpu);
        }
    }

    /// `pre_schedule` hook (spec 4.6): pull before picking next.
    pub fn pre_schedule(&self, cpu: usize) {
        self.pull_dl_task(cpu);
    }

    /// `post_schedule` hook (spec 4.6): push-loop after picking next.
    pub fn post_schedule(&self, cpu: usize) {
        self.push_dl_tasks(cpu);
    }

    /// `task_woken` hook (spec 4.6): push if the wakee cannot preempt the
    /// currently running task.
    pub fn task_woken(&self, cpu: usize, woken: TaskId) {
        let cannot_preempt = {
            let rq = self.lock(cpu);
            !rq.would_preempt(woken)
        };
        if cannot_preempt {
            self.push_dl_task(cpu);
        }
    }

    /// `switched_from_dl` hook (spec 4.6): the queue may now be
    /// underused, so try a pull.
    pub fn switched_from_dl(&self, cpu: usize) {
        self.pull_dl_task(cpu);
    }

    /// `switched_to_dl` hook (spec 4.6): push if the arriving task leaves
    /// `cpu` overloaded.
    pub fn switched_to_dl(&self, cpu: usize) {
        if self.lock(cpu).is_overloaded() {
            self.push_dl_task(cpu);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(c: u64, d: u64, p: u64) -> DeadlineParams {
        DeadlineParams::new(c, d, p).unwrap()
    }

    fn domain(nr_cpus: usize) -> RootDomain<SimTimerDriver> {
        RootDomain::new(SchedDlConfig::new(nr_cpus))
    }

    #[test]
    fn task_fork_picks_least_loaded_cpu() {
        let rd = domain(2);
        let a = rd.task_fork(TaskId(1), params(2, 10, 10), CpuMask::span(2)).unwrap();
        let b = rd.task_fork(TaskId(2), params(2, 10, 10), CpuMask::span(2)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn overload_mask_tracks_queue_state() {
        let rd = domain(2);
        let cpu = rd.task_fork(TaskId(1), params(2, 5, 5), CpuMask::single(0)).unwrap();
        rd.enqueue_task(cpu, TaskId(1), EnqueueFlags::empty());
        assert_eq!(rd.overloaded_count(), 0); // one task, not migratory

        let id2 = TaskId(2);
        rd.task_fork(id2, params(1, 4, 4), CpuMask::single(cpu)).unwrap();
        rd.enqueue_task(cpu, id2, EnqueueFlags::empty());
        assert_eq!(rd.overloaded_count(), 0); // two tasks, neither migratory

        rd.task_dead(cpu, id2).unwrap();
        let id3 = TaskId(3);
        rd.task_fork(id3, params(1, 4, 4), CpuMask::span(2)).unwrap();
        // task_fork's least-loaded heuristic may have placed id3
        // elsewhere; force it onto `cpu` to exercise overload here.
        rd.task_dead(0, id3).ok();
        rd.task_dead(1, id3).ok();
        let entity = DeadlineEntity::new(params(1, 4, 4), CpuMask::span(2));
        rd.lock(cpu).admit(Task { id: id3, entity });
        rd.enqueue_task(cpu, id3, EnqueueFlags::empty());

        assert!(rd.overloaded_mask().contains(cpu));
        assert_eq!(rd.overloaded_count(), 1);
    }

    #[test]
    fn push_migrates_to_empty_cpu() {
        let rd = domain(2);
        // Pin both onto cpu 0 explicitly so placement doesn't depend on
        // the least-loaded fork heuristic; both allow migration to cpu 1.
        rd.task_fork(TaskId(1), params(2, 5, 5), CpuMask::single(0)).unwrap();
        let y = TaskId(2);
        rd.task_fork(y, params(1, 4, 4), CpuMask::span(2)).unwrap();
        // Force task 2's initial placement onto cpu 0 too: re-fork after
        // evicting, now that cpu 0 already carries one task so it no
        // longer looks like the least-loaded choice.
        rd.task_dead(0, y).ok();
        rd.task_dead(1, y).ok();
        {
            let entity = DeadlineEntity::new(params(1, 4, 4), CpuMask::span(2));
            rd.lock(0).admit(Task { id: y, entity });
        }

        rd.enqueue_task(0, TaskId(1), EnqueueFlags::empty());
        rd.enqueue_task(0, y, EnqueueFlags::empty());

        assert!(rd.overloaded_mask().contains(0));
        rd.post_schedule(0);

        // The migratable, non-running task should have moved to the
        // empty cpu 1; the domain-wide task count is conserved.
        assert!(rd.lock(1).contains(y));
        let total: u32 = (0..2).map(|c| rd.lock(c).nr_total()).sum();
        assert_eq!(total, 2);
    }

    #[test]
    fn reserve_bandwidth_respects_limit() {
        let rd = RootDomain::new(SchedDlConfig::new(1).with_bandwidth_limit_permille(500));
        assert!(rd.reserve_bandwidth(params(4, 10, 10)).is_ok()); // 400 permille
        assert!(rd.reserve_bandwidth(params(4, 10, 10)).is_err()); // would hit 800 > 500
    }
}
