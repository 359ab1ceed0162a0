//! Tick monitor for aggregation telemetry.
//!
//! Counters are shared by every periodic task and updated lock-free.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of the monitor counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MonitorSnapshot {
    /// Ticks that published a snapshot
    pub ticks_published: u64,
    /// Ticks skipped because the graph could not be ordered
    pub ticks_skipped: u64,
    /// Function lookups that failed and were degraded to zero
    pub metric_failures: u64,
    /// Function lookups backed by zero samples
    pub unsampled_functions: u64,
    /// Ticks whose publish failed
    pub publish_failures: u64,
    /// Tasks that ended in a panic
    pub task_panics: u64,
}

impl MonitorSnapshot {
    /// Total ticks that ran, whatever their outcome
    #[must_use]
    pub fn total_ticks(&self) -> u64 {
        self.ticks_published + self.ticks_skipped + self.publish_failures
    }
}

/// Aggregation counters
#[derive(Debug, Default)]
pub struct TickMonitor {
    ticks_published: AtomicU64,
    ticks_skipped: AtomicU64,
    metric_failures: AtomicU64,
    unsampled_functions: AtomicU64,
    publish_failures: AtomicU64,
    task_panics: AtomicU64,
}

impl TickMonitor {
    /// Create new counters
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a published tick
    pub fn record_published(&self) {
        self.ticks_published.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a skipped tick
    pub fn record_skipped(&self) {
        self.ticks_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record failed metric lookups
    pub fn record_metric_failures(&self, count: u64) {
        self.metric_failures.fetch_add(count, Ordering::Relaxed);
    }

    /// Record lookups without samples
    pub fn record_unsampled(&self, count: u64) {
        self.unsampled_functions.fetch_add(count, Ordering::Relaxed);
    }

    /// Record a failed publish
    pub fn record_publish_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a task that panicked
    pub fn record_task_panic(&self) {
        self.task_panics.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current counters
    #[must_use]
    pub fn snapshot(&self) -> MonitorSnapshot {
        MonitorSnapshot {
            ticks_published: self.ticks_published.load(Ordering::Relaxed),
            ticks_skipped: self.ticks_skipped.load(Ordering::Relaxed),
            metric_failures: self.metric_failures.load(Ordering::Relaxed),
            unsampled_functions: self.unsampled_functions.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            task_panics: self.task_panics.load(Ordering::Relaxed),
        }
    }
}
