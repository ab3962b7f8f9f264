//! Deadline Scheduling Class (EDF + CBS) with a Push/Pull Balancer
//!
//! This crate implements a per-CPU, preemptive scheduling class for
//! aperiodic/sporadic real-time tasks: Earliest Deadline First (EDF) ready
//! ordering, Constant Bandwidth Server (CBS) budget enforcement, and a
//! fleet-wide push/pull migration algorithm for multiprocessor load.
//!
//! # Scope
//!
//! This crate owns the run-queue, the CBS bandwidth server, the throttling
//! timer state machine, and the multiprocessor balancer. It does **not**
//! own: the overall scheduler framework (tick source, clock, context
//! switch), priority-inheritance donation chains, admission control at
//! `setscheduler` time, or CPU hot-plug device discovery. Those are
//! external collaborators; this crate exposes the contract points they
//! need (see [`class`]) and nothing more.
//!
//! # Module Map
//!
//! - [`time`] - the circular deadline comparison all ordering is built on
//! - [`types`] - task identifiers, CPU masks, parameters, flags
//! - [`entity`] - per-task deadline scheduling state
//! - [`cbs`] - the four CBS operations: `setup_new`, `replenish`, `overflow`, `update`
//! - [`rq`] - the per-CPU run-queue: active tree, pushable tree, counters
//! - [`timer`] - the throttling timer abstraction and a test double
//! - [`balancer`] - root-domain overload tracking and push/pull migration
//! - [`class`] - the class operation vector consumed by a host scheduler
//! - [`stats`] - opaque observability counters (not a contract)
//! - [`error`] - in-band-recoverable conditions, logged rather than propagated
//! - [`config`] - build-once configuration for a [`balancer::RootDomain`]
//!
//! # Quick Start
//!
//! ```
//! use kernel_sched_dl::balancer::RootDomain;
//! use kernel_sched_dl::config::SchedDlConfig;
//! use kernel_sched_dl::types::{CpuMask, DeadlineParams, EnqueueFlags, TaskId};
//!
//! let root = RootDomain::new(SchedDlConfig::new(2));
//! let params = DeadlineParams::new(2_000_000, 10_000_000, 10_000_000).unwrap();
//! let id = TaskId(1);
//! let cpu = root.task_fork(id, params, CpuMask::span(2)).unwrap();
//! root.enqueue_task(cpu, id, EnqueueFlags::empty());
//! assert!(root.runqueue(cpu).unwrap().lock().has_running_candidate());
//! ```

#![no_std]

extern crate alloc;

pub mod balancer;
pub mod cbs;
pub mod class;
pub mod config;
pub mod entity;
pub mod error;
pub mod rq;
pub mod stats;
pub mod time;
pub mod timer;
pub mod types;
