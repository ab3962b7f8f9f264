//! The per-CPU deadline run-queue: a deadline-ordered active tree, a
//! pushable-tasks worklist, and the counters the balancer reads (spec 3,
//! 4.3, 4.5).

extern crate alloc;

use alloc::collections::{BTreeMap, BTreeSet};
use core::cmp::Ordering;

use crate::cbs;
use crate::entity::DeadlineEntity;
use crate::time::before;
use crate::types::{DeadlineParams, EnqueueFlags, EntityFlags, TaskId};

/// A task resident on one run-queue: its identity plus its scheduling
/// state. Owned by the run-queue that currently holds it; migration is a
/// hand-off, never shared ownership (spec 3, "Ownership").
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub entity: DeadlineEntity,
}

/// The active/pushable tree ordering key: head-flagged entities sort
/// first, then by the circular deadline order, then by insertion sequence
/// to keep same-deadline ties FIFO (spec 4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderKey {
    pub deadline: u64,
    pub head: bool,
    pub seq: u64,
}

impl PartialOrd for OrderKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.head, other.head) {
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            _ => {}
        }
        if self.deadline == other.deadline {
            self.seq.cmp(&other.seq)
        } else if before(self.deadline, other.deadline) {
            Ordering::Less
        } else {
            Ordering::Greater
        }
    }
}

/// Cached `(curr, next)` deadlines; `0` means "none" (spec 3).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EarliestPair {
    pub curr: u64,
    pub next: u64,
}

/// One CPU's deadline run-queue.
#[derive(Debug)]
pub struct DeadlineRunQueue {
    cpu: usize,
    /// Tasks currently resident on this CPU, on-queue, running, or
    /// throttled awaiting the timer.
    tasks: BTreeMap<TaskId, Task>,
    active: BTreeMap<OrderKey, TaskId>,
    active_key: BTreeMap<TaskId, OrderKey>,
    pushable: BTreeMap<OrderKey, TaskId>,
    pushable_key: BTreeMap<TaskId, OrderKey>,
    running: Option<TaskId>,
    nr_running: u32,
    /// The exact set of active-tree residents with `nr_cpus_allowed > 1`
    /// (spec 3, `dl_nr_migratory`). Kept as a set rather than a bare
    /// counter so an affinity change mid-residency (spec 4.5) can be
    /// reconciled by membership instead of drifting out of sync.
    migratory_active: BTreeSet<TaskId>,
    earliest: EarliestPair,
    overloaded: bool,
    clock: u64,
    next_seq: u64,
}

impl DeadlineRunQueue {
    #[must_use]
    pub fn new(cpu: usize) -> Self {
        Self {
            cpu,
            tasks: BTreeMap::new(),
            active: BTreeMap::new(),
            active_key: BTreeMap::new(),
            pushable: BTreeMap::new(),
            pushable_key: BTreeMap::new(),
            running: None,
            nr_running: 0,
            migratory_active: BTreeSet::new(),
            earliest: EarliestPair::default(),
            overloaded: false,
            clock: 0,
            next_seq: 0,
        }
    }

    #[must_use]
    pub fn cpu(&self) -> usize {
        self.cpu
    }

    #[must_use]
    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn advance_clock(&mut self, now: u64) {
        if !before(now, self.clock) {
            self.clock = now;
        }
    }

    #[must_use]
    pub fn nr_running(&self) -> u32 {
        self.nr_running
    }

    #[must_use]
    pub fn nr_migratory(&self) -> u32 {
        self.migratory_active.len() as u32
    }

    #[must_use]
    pub fn nr_total(&self) -> u32 {
        self.tasks.len() as u32
    }

    #[must_use]
    pub fn earliest(&self) -> EarliestPair {
        self.earliest
    }

    /// `overloaded <=> (nr_migratory >= 1 && nr_total >= 2)` (spec 4.6).
    #[must_use]
    pub fn recompute_overload(&mut self) -> bool {
        self.overloaded = self.nr_migratory() >= 1 && self.nr_total() >= 2;
        self.overloaded
    }

    #[must_use]
    pub fn is_overloaded(&self) -> bool {
        self.overloaded
    }

    #[must_use]
    pub fn running(&self) -> Option<&Task> {
        self.running.and_then(|id| self.tasks.get(&id))
    }

    #[must_use]
    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    #[must_use]
    pub fn get_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.get_mut(&id)
    }

    #[must_use]
    pub fn has_running_candidate(&self) -> bool {
        !self.active.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: TaskId) -> bool {
        self.tasks.contains_key(&id)
    }

    /// Admits a task not previously resident on this CPU (fork, or the
    /// receiving side of a migration). Does not place it on any tree.
    pub fn admit(&mut self, task: Task) {
        self.tasks.insert(task.id, task);
    }

    /// Removes a task entirely from this run-queue (e.g. `task_dead`, or
    /// the donor side of a migration). Caller must ensure it is off both
    /// trees and not running first.
    pub fn evict(&mut self, id: TaskId) -> Option<Task> {
        self.tasks.remove(&id)
    }

    fn recompute_earliest_curr(&mut self) {
        self.earliest.curr = self
            .active
            .iter()
            .next()
            .map_or(0, |(key, _)| key.deadline);
    }

    /// The second-earliest deadline on the active tree, used by the
    /// balancer's `earliest.next` cache and by `pull_dl_task`'s
    /// second-earliest lookup (spec 4.6, "not leftmost").
    #[must_use]
    pub fn second_earliest(&self) -> Option<(TaskId, u64)> {
        self.active
            .iter()
            .nth(1)
            .map(|(key, id)| (*id, key.deadline))
    }

    pub fn recompute_earliest_next(&mut self) {
        self.earliest.next = self.second_earliest().map_or(0, |(_, deadline)| deadline);
    }

    fn order_key_for(&mut self, id: TaskId, deadline: u64) -> OrderKey {
        let head = self
            .tasks
            .get(&id)
            .is_some_and(|t| t.entity.is_head());
        let seq = self.next_seq;
        self.next_seq += 1;
        OrderKey { deadline, head, seq }
    }

    /// Idempotent: re-inserting an already-active task (e.g. a re-enqueue
    /// that never went through `remove_active`) first drops its stale
    /// old-keyed entry instead of leaving a duplicate in the tree.
    fn insert_active(&mut self, id: TaskId) {
        if let Some(old_key) = self.active_key.remove(&id) {
            self.active.remove(&old_key);
            self.nr_running -= 1;
        }
        let deadline = self.tasks[&id].entity.deadline;
        let key = self.order_key_for(id, deadline);
        self.active.insert(key, id);
        self.active_key.insert(id, key);
        self.nr_running += 1;
        if self.tasks[&id].entity.is_migratory() {
            self.migratory_active.insert(id);
        }
        self.recompute_earliest_curr();
        self.recompute_earliest_next();
    }

    fn remove_active(&mut self, id: TaskId) -> bool {
        if let Some(key) = self.active_key.remove(&id) {
            self.active.remove(&key);
            self.nr_running -= 1;
            self.migratory_active.remove(&id);
            self.recompute_earliest_curr();
            self.recompute_earliest_next();
            true
        } else {
            false
        }
    }

    /// Contract (spec 4.5): a task belongs to the pushable tree iff it is
    /// on the active tree, is not the running task, and is migratable.
    /// Re-applies the pushable-tree membership contract after an external
    /// change to `id`'s affinity mask (spec 4.5, "Maintained on ...
    /// affinity changes").
    pub fn refresh_pushable_membership(&mut self, id: TaskId) {
        self.sync_pushable_membership(id);
        self.recompute_overload();
    }

    fn sync_pushable_membership(&mut self, id: TaskId) {
        let on_active = self.active_key.contains_key(&id);
        let is_migratory = self.tasks.get(&id).is_some_and(|t| t.entity.is_migratory());

        // Reconcile dl_nr_migratory against the entity's current affinity:
        // a set_cpus_allowed can flip migratory-ness while a task sits on
        // the active tree, independent of pushable-tree membership (spec
        // 4.5, "Maintained on ... affinity changes").
        if on_active && is_migratory {
            self.migratory_active.insert(id);
        } else {
            self.migratory_active.remove(&id);
        }

        let should_be_pushable = on_active && self.running != Some(id) && is_migratory;

        let is_pushable = self.pushable_key.contains_key(&id);

        if should_be_pushable && !is_pushable {
            let deadline = self.tasks[&id].entity.deadline;
            let key = self.order_key_for_pushable(id, deadline);
            self.pushable.insert(key, id);
            self.pushable_key.insert(id, key);
        } else if !should_be_pushable && is_pushable {
            if let Some(key) = self.pushable_key.remove(&id) {
                self.pushable.remove(&key);
            }
        }
    }

    fn order_key_for_pushable(&mut self, id: TaskId, deadline: u64) -> OrderKey {
        // Pushable ordering never needs the head tie-break: head entities
        // are never migratable in practice, but we keep the same key
        // shape for uniformity.
        self.order_key_for(id, deadline)
    }

    #[must_use]
    pub fn pushable_leftmost(&self) -> Option<TaskId> {
        self.pushable.iter().next().map(|(_, id)| *id)
    }

    #[must_use]
    pub fn pushable_is_empty(&self) -> bool {
        self.pushable.is_empty()
    }

    /// `enqueue`: materialise/replenish parameters, insert into the active
    /// tree (and the pushable tree if eligible). If the entity is
    /// throttled, this is a no-op - the timer owns re-enqueueing it
    /// (spec 4.3).
    pub fn enqueue_task(&mut self, id: TaskId, flags: EnqueueFlags, pi_top: Option<DeadlineParams>) {
        let clock = self.clock;
        let Some(task) = self.tasks.get_mut(&id) else {
            return;
        };
        if task.entity.is_throttled() {
            return;
        }

        if flags.contains(EnqueueFlags::REPLENISH) && !task.entity.is_new() {
            cbs::replenish(&mut task.entity, clock, pi_top);
        } else {
            cbs::update(&mut task.entity, clock, pi_top);
        }

        self.insert_active(id);
        self.sync_pushable_membership(id);
        self.recompute_overload();
    }

    /// `dequeue`: account elapsed runtime first (may itself throttle),
    /// then remove from both trees.
    pub fn dequeue_task(&mut self, id: TaskId) -> bool {
        if self.running == Some(id) {
            self.update_curr();
            // update_curr may have already removed the task from the
            // active tree if it throttled.
            self.running = None;
        }
        let removed = self.remove_active(id);
        if self.pushable_key.contains_key(&id) {
            if let Some(key) = self.pushable_key.remove(&id) {
                self.pushable.remove(&key);
            }
        }
        self.recompute_overload();
        removed
    }

    /// `update_curr`: charge elapsed execution to the running task's
    /// budget; if its runtime is exceeded, pull it off the active tree and
    /// report whether the timer should be armed.
    ///
    /// Returns `Some(deadline)` (the instant to arm the throttling timer
    /// at) if the task should now be throttled; `None` if it stayed on the
    /// queue or was immediately re-enqueued with `REPLENISH`.
    pub fn update_curr(&mut self) -> Option<u64> {
        let clock = self.clock;
        let Some(id) = self.running else { return None };
        let Some(task) = self.tasks.get_mut(&id) else {
            return None;
        };

        cbs::charge_exec(&mut task.entity, clock);

        if !cbs::runtime_exceeded(&mut task.entity, clock) {
            return None;
        }

        self.remove_active(id);
        if let Some(key) = self.pushable_key.remove(&id) {
            self.pushable.remove(&key);
        }

        let task = self.tasks.get_mut(&id).expect("task still resident");
        let fire_at = task.entity.deadline;
        if before(fire_at, clock) {
            // Already past: skip arming, re-enqueue immediately with
            // REPLENISH (spec 4.4, 7).
            task.entity.flags.remove(EntityFlags::THROTTLED);
            self.recompute_overload();
            self.enqueue_task(id, EnqueueFlags::REPLENISH, None);
            None
        } else {
            task.entity.flags.insert(EntityFlags::THROTTLED);
            self.recompute_overload();
            Some(fire_at)
        }
    }

    /// `pick_next`: leftmost of the active tree becomes current; resets
    /// `exec_start`; exits the pushable tree while it runs.
    pub fn pick_next_task(&mut self) -> Option<TaskId> {
        let id = *self.active.iter().next()?.1;
        let clock = self.clock;
        if let Some(task) = self.tasks.get_mut(&id) {
            task.entity.exec_start = clock;
        }
        self.running = Some(id);
        self.sync_pushable_membership(id);
        Some(id)
    }

    /// `put_prev`: the previously running task re-enters the pushable
    /// tree if it is still active and migratable.
    pub fn put_prev_task(&mut self, id: TaskId) {
        if self.running == Some(id) {
            self.running = None;
        }
        self.sync_pushable_membership(id);
    }

    /// `set_curr_task`: force a task to be the running one without going
    /// through pick_next (used by `switched_to`/class changes).
    pub fn set_curr_task(&mut self, id: TaskId) {
        self.running = Some(id);
        self.sync_pushable_membership(id);
    }

    /// `yield`: force the running task to throttle until the next period
    /// boundary (spec 4.3).
    pub fn yield_task(&mut self) -> Option<u64> {
        let id = self.running?;
        let clock = self.clock;
        let task = self.tasks.get_mut(&id)?;
        task.entity.flags.insert(EntityFlags::NEW);
        task.entity.runtime = 0;
        drop(task);
        let _ = clock;
        self.update_curr()
    }

    /// Preemption check (spec 4.3): does `candidate`'s deadline preempt the
    /// currently running task?
    #[must_use]
    pub fn would_preempt(&self, candidate: TaskId) -> bool {
        let Some(running_id) = self.running else {
            return true;
        };
        let Some(running) = self.tasks.get(&running_id) else {
            return true;
        };
        let Some(candidate) = self.tasks.get(&candidate) else {
            return false;
        };
        if candidate.entity.is_head() && !running.entity.is_head() {
            return true;
        }
        if running.entity.is_head() && !candidate.entity.is_head() {
            return false;
        }
        before(candidate.entity.deadline, running.entity.deadline)
    }

    /// `wait_interval`: sleeps until `until`, or the next period boundary
    /// if none given; if waking before `deadline` would still overflow,
    /// delays the wake-up so the task returns with full budget. Marks
    /// `NEW` so the next enqueue re-materialises parameters.
    pub fn wait_interval(&mut self, id: TaskId, until: Option<u64>) -> u64 {
        let Some(task) = self.tasks.get_mut(&id) else {
            return until.unwrap_or(self.clock);
        };
        let params = task.entity.params;
        let wake_at = until.unwrap_or_else(|| {
            task.entity
                .deadline
                .wrapping_sub(params.deadline)
                .wrapping_add(params.period)
        });

        let would_overflow = cbs::overflow(&task.entity, wake_at, None);
        let wake_at = if would_overflow {
            let runtime = task.entity.runtime.max(0) as u64;
            task.entity.deadline
                - (runtime.saturating_mul(params.period) / params.runtime.max(1))
        } else {
            wake_at
        };

        task.entity.flags.insert(EntityFlags::NEW);
        wake_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CpuMask;

    fn params() -> DeadlineParams {
        DeadlineParams::new(2_000_000, 10_000_000, 10_000_000).unwrap()
    }

    fn admit(rq: &mut DeadlineRunQueue, id: u64) -> TaskId {
        let tid = TaskId(id);
        rq.admit(Task {
            id: tid,
            entity: DeadlineEntity::new(params(), CpuMask::single(0)),
        });
        tid
    }

    #[test]
    fn enqueue_dequeue_is_identity_on_empty_tree() {
        let mut rq = DeadlineRunQueue::new(0);
        let t = admit(&mut rq, 1);
        rq.enqueue_task(t, EnqueueFlags::empty(), None);
        assert_eq!(rq.nr_running(), 1);
        rq.dequeue_task(t);
        assert_eq!(rq.nr_running(), 0);
        assert_eq!(rq.earliest().curr, 0);
    }

    #[test]
    fn active_tree_orders_by_deadline() {
        let mut rq = DeadlineRunQueue::new(0);
        let a = admit(&mut rq, 1);
        let b = admit(&mut rq, 2);
        rq.get_mut(a).unwrap().entity.flags.remove(EntityFlags::NEW);
        rq.get_mut(a).unwrap().entity.deadline = 100;
        rq.get_mut(a).unwrap().entity.runtime = 1;
        rq.get_mut(b).unwrap().entity.flags.remove(EntityFlags::NEW);
        rq.get_mut(b).unwrap().entity.deadline = 50;
        rq.get_mut(b).unwrap().entity.runtime = 1;
        rq.enqueue_task(a, EnqueueFlags::empty(), None);
        rq.enqueue_task(b, EnqueueFlags::empty(), None);
        assert_eq!(rq.earliest().curr, 50);
        let next = rq.pick_next_task().unwrap();
        assert_eq!(next, b);
    }

    #[test]
    fn overload_requires_migratory_and_two_total() {
        let mut rq = DeadlineRunQueue::new(0);
        let a = admit(&mut rq, 1);
        rq.get_mut(a).unwrap().entity.set_cpus_allowed(CpuMask::span(2));
        rq.enqueue_task(a, EnqueueFlags::empty(), None);
        assert!(!rq.is_overloaded()); // only one task total
        let b = admit(&mut rq, 2);
        rq.get_mut(b).unwrap().entity.set_cpus_allowed(CpuMask::span(2));
        rq.enqueue_task(b, EnqueueFlags::empty(), None);
        assert!(rq.is_overloaded());
    }

    #[test]
    fn pushable_excludes_running_task() {
        let mut rq = DeadlineRunQueue::new(0);
        let a = admit(&mut rq, 1);
        rq.get_mut(a).unwrap().entity.set_cpus_allowed(CpuMask::span(2));
        rq.enqueue_task(a, EnqueueFlags::empty(), None);
        assert!(!rq.pushable_is_empty());
        rq.pick_next_task();
        assert!(rq.pushable_is_empty());
    }

    #[test]
    fn update_curr_throttles_on_overrun() {
        let mut rq = DeadlineRunQueue::new(0);
        let a = admit(&mut rq, 1);
        rq.enqueue_task(a, EnqueueFlags::empty(), None);
        rq.pick_next_task();
        rq.advance_clock(5_000_000); // charge 5ms against a 2ms runtime budget
        let fire_at = rq.update_curr();
        assert!(fire_at.is_some());
        assert!(rq.get(a).unwrap().entity.is_throttled());
        assert!(!rq.active_key.contains_key(&a));
    }

    #[test]
    fn head_entity_always_preempts() {
        let mut rq = DeadlineRunQueue::new(0);
        let a = admit(&mut rq, 1);
        rq.get_mut(a).unwrap().entity.deadline = 1_000_000_000; // far deadline
        rq.get_mut(a).unwrap().entity.flags.remove(EntityFlags::NEW);
        rq.get_mut(a).unwrap().entity.runtime = 1;
        rq.enqueue_task(a, EnqueueFlags::empty(), None);
        rq.pick_next_task();

        let b = admit(&mut rq, 2);
        rq.get_mut(b).unwrap().entity.flags.insert(EntityFlags::HEAD);
        assert!(rq.would_preempt(b));
    }
}
