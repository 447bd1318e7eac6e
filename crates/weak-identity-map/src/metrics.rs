//! Reclamation metrics and statistics.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Snapshot of the process-wide reclaimer counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReclaimMetrics {
    /// Reclamation passes run since process start.
    pub passes: usize,
    /// Keys whose allocation has been released.
    pub keys_reclaimed: usize,
    /// Hooks invoked, including those that panicked.
    pub hooks_run: usize,
    /// Hooks or key destructors that panicked.
    pub hooks_panicked: usize,
    /// Keys dropped and waiting for a pass.
    pub queued: usize,
}

pub(crate) struct Counters {
    passes: AtomicUsize,
    keys_reclaimed: AtomicUsize,
    hooks_run: AtomicUsize,
    hooks_panicked: AtomicUsize,
    queued: AtomicUsize,
}

impl Counters {
    pub(crate) const fn new() -> Self {
        Self {
            passes: AtomicUsize::new(0),
            keys_reclaimed: AtomicUsize::new(0),
            hooks_run: AtomicUsize::new(0),
            hooks_panicked: AtomicUsize::new(0),
            queued: AtomicUsize::new(0),
        }
    }

    pub(crate) fn record_queued(&self) {
        self.queued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reclaimed(&self, ran_hook: bool, panicked: bool) {
        self.queued.fetch_sub(1, Ordering::Relaxed);
        self.keys_reclaimed.fetch_add(1, Ordering::Relaxed);
        if ran_hook {
            self.hooks_run.fetch_add(1, Ordering::Relaxed);
        }
        if panicked {
            self.hooks_panicked.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_pass(&self) {
        self.passes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> ReclaimMetrics {
        ReclaimMetrics {
            passes: self.passes.load(Ordering::Relaxed),
            keys_reclaimed: self.keys_reclaimed.load(Ordering::Relaxed),
            hooks_run: self.hooks_run.load(Ordering::Relaxed),
            hooks_panicked: self.hooks_panicked.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
        }
    }
}

pub(crate) static COUNTERS: Counters = Counters::new();

/// Read the current reclaimer counters.
///
/// The counters are process-wide and updated with relaxed ordering, so a
/// snapshot taken while a pass is running may be mid-update.
#[must_use]
pub fn reclaim_metrics() -> ReclaimMetrics {
    COUNTERS.snapshot()
}
