//! Non-contractual diagnostic counters (spec 9: "`nr_dummy`-equivalent
//! counters are observability only, never read back by scheduling logic").

use core::sync::atomic::{AtomicU64, Ordering};

/// Running totals of balancer activity. Every field is advisory; nothing
/// in [`crate::balancer`] or [`crate::rq`] reads these back to make a
/// scheduling decision.
#[derive(Debug, Default)]
pub struct BalancerStats {
    pushes: AtomicU64,
    pulls: AtomicU64,
    push_failures: AtomicU64,
    pull_failures: AtomicU64,
    lock_retries_exhausted: AtomicU64,
}

impl BalancerStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_push(&self) {
        self.pushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pull(&self) {
        self.pulls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_push_failure(&self) {
        self.push_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pull_failure(&self) {
        self.pull_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lock_retries_exhausted(&self) {
        self.lock_retries_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn pushes(&self) -> u64 {
        self.pushes.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn pulls(&self) -> u64 {
        self.pulls.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn push_failures(&self) -> u64 {
        self.push_failures.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn pull_failures(&self) -> u64 {
        self.pull_failures.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn lock_retries_exhausted(&self) -> u64 {
        self.lock_retries_exhausted.load(Ordering::Relaxed)
    }
}
