//! End-to-end scenarios against the public class operation vector: a
//! compliant periodic task, a budget overrun, head-entity preemption, a
//! push across an idle CPU, a pull onto a freed CPU, and a voluntary yield.

use kernel_sched_dl::balancer::RootDomain;
use kernel_sched_dl::class;
use kernel_sched_dl::config::SchedDlConfig;
use kernel_sched_dl::entity::DeadlineEntity;
use kernel_sched_dl::rq::Task;
use kernel_sched_dl::timer::SimTimerDriver;
use kernel_sched_dl::types::{CpuMask, DeadlineParams, EnqueueFlags, TaskId};

fn domain(nr_cpus: usize) -> RootDomain<SimTimerDriver> {
    RootDomain::new(SchedDlConfig::new(nr_cpus))
}

fn params(c: u64, d: u64, p: u64) -> DeadlineParams {
    DeadlineParams::new(c, d, p).unwrap()
}

/// Forces `id` to be resident on `cpu` regardless of where `task_fork`'s
/// least-loaded heuristic would have placed it, so multi-CPU scenarios can
/// be set up deterministically.
fn admit_on(rd: &RootDomain<SimTimerDriver>, cpu: usize, id: TaskId, params: DeadlineParams, cpus_allowed: CpuMask) {
    let entity = DeadlineEntity::new(params, cpus_allowed);
    rd.runqueue(cpu).unwrap().lock().admit(Task { id, entity });
}

#[test]
fn periodic_task_stays_compliant_across_several_ticks() {
    let rd = domain(1);
    let id = TaskId(1);
    let cpu = class::task_fork(&rd, id, params(2_000_000, 10_000_000, 10_000_000), CpuMask::single(0)).unwrap();
    class::enqueue_task(&rd, cpu, id, EnqueueFlags::empty());
    assert_eq!(class::pick_next_task(&rd, cpu).unwrap(), Some(id));

    // Charges 0.5ms per tick against a 2ms budget: four ticks land well
    // inside the reservation and never throttle.
    for tick in 1..=4u64 {
        class::task_tick(&rd, cpu, tick * 500_000);
        let rq = rd.runqueue(cpu).unwrap().lock();
        assert!(!rq.get(id).unwrap().entity.is_throttled());
        assert!(rq.has_running_candidate());
    }
}

#[test]
fn runtime_overrun_throttles_then_replenishes_on_timer_fire() {
    let rd = domain(1);
    let id = TaskId(1);
    let cpu = class::task_fork(&rd, id, params(2_000_000, 10_000_000, 10_000_000), CpuMask::single(0)).unwrap();
    class::enqueue_task(&rd, cpu, id, EnqueueFlags::empty());
    class::pick_next_task(&rd, cpu).unwrap();

    // Two ticks of 2ms each blow through the 2ms budget.
    class::task_tick(&rd, cpu, 2_000_000);
    class::task_tick(&rd, cpu, 4_000_000);
    {
        let rq = rd.runqueue(cpu).unwrap().lock();
        assert!(rq.get(id).unwrap().entity.is_throttled());
        assert!(!rq.has_running_candidate());
    }

    // The timer fires once the next period boundary has passed: it clears
    // the throttle and re-enqueues with full budget.
    rd.runqueue(cpu).unwrap().lock().advance_clock(10_000_000);
    class::timer_fired(&rd, cpu, id).unwrap();
    let rq = rd.runqueue(cpu).unwrap().lock();
    assert!(!rq.get(id).unwrap().entity.is_throttled());
    assert!(rq.has_running_candidate());
    assert!(rq.get(id).unwrap().entity.runtime > 0);
}

#[test]
fn head_entity_preempts_running_normal_task() {
    let rd = domain(1);
    let running = TaskId(1);
    let cpu = class::task_fork(&rd, running, params(2_000_000, 10_000_000, 10_000_000), CpuMask::single(0)).unwrap();
    class::enqueue_task(&rd, cpu, running, EnqueueFlags::empty());
    class::pick_next_task(&rd, cpu).unwrap();

    let head = TaskId(2);
    class::task_fork(&rd, head, params(1_000_000, 8_000_000, 8_000_000), CpuMask::single(cpu)).unwrap();
    class::enqueue_task(&rd, cpu, head, EnqueueFlags::empty());
    let verdict = class::prio_changed(&rd, cpu, head, true, false).unwrap();
    assert_eq!(verdict, class::Reschedule::Local);
    assert!(class::check_preempt_curr(&rd, cpu, head).unwrap() == class::Reschedule::Local);
}

#[test]
fn post_schedule_pushes_migratory_work_off_an_overloaded_cpu() {
    let rd = domain(2);
    let running = TaskId(1);
    let other = TaskId(2);
    admit_on(&rd, 0, running, params(2_000_000, 5_000_000, 5_000_000), CpuMask::single(0));
    admit_on(&rd, 0, other, params(1_000_000, 4_000_000, 4_000_000), CpuMask::span(2));

    class::enqueue_task(&rd, 0, running, EnqueueFlags::empty());
    class::enqueue_task(&rd, 0, other, EnqueueFlags::empty());
    assert!(rd.overloaded_mask().contains(0));

    class::post_schedule(&rd, 0);

    assert!(rd.runqueue(1).unwrap().lock().contains(other));
    let total: u32 = (0..2).map(|cpu| rd.runqueue(cpu).unwrap().lock().nr_total()).sum();
    assert_eq!(total, 2);
}

#[test]
fn switched_from_pulls_work_onto_the_freed_cpu() {
    let rd = domain(2);
    let a = TaskId(1);
    let b = TaskId(2);
    // cpu 1 carries two migratory tasks (overloaded); cpu 0 is empty.
    admit_on(&rd, 1, a, params(1_000_000, 4_000_000, 4_000_000), CpuMask::span(2));
    admit_on(&rd, 1, b, params(1_000_000, 6_000_000, 6_000_000), CpuMask::span(2));
    class::enqueue_task(&rd, 1, a, EnqueueFlags::empty());
    class::enqueue_task(&rd, 1, b, EnqueueFlags::empty());
    assert!(rd.overloaded_mask().contains(1));

    class::switched_from(&rd, 0);

    let total_on_zero = rd.runqueue(0).unwrap().lock().nr_total();
    assert_eq!(total_on_zero, 1);
    let total: u32 = (0..2).map(|cpu| rd.runqueue(cpu).unwrap().lock().nr_total()).sum();
    assert_eq!(total, 2);
}

#[test]
fn yield_throttles_the_running_task_until_replenished() {
    let rd = domain(1);
    let id = TaskId(1);
    let cpu = class::task_fork(&rd, id, params(2_000_000, 10_000_000, 10_000_000), CpuMask::single(0)).unwrap();
    class::enqueue_task(&rd, cpu, id, EnqueueFlags::empty());
    class::pick_next_task(&rd, cpu).unwrap();

    class::yield_task(&rd, cpu);
    {
        let rq = rd.runqueue(cpu).unwrap().lock();
        assert!(rq.get(id).unwrap().entity.is_throttled());
        assert!(!rq.has_running_candidate());
    }

    rd.runqueue(cpu).unwrap().lock().advance_clock(10_000_000);
    class::timer_fired(&rd, cpu, id).unwrap();
    assert!(rd.runqueue(cpu).unwrap().lock().has_running_candidate());
}
