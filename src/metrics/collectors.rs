//! Custom metric collectors for kgforge operations.
//!
//! The `MetricsCollector` struct wraps the raw Prometheus metrics and
//! provides convenient methods for the controller and poller. All
//! methods are safe to call before `init_metrics()`; they simply do
//! nothing until the registry exists.

use std::time::Duration;

use crate::jobs::{JobKind, JobState};

use super::prometheus::{DISPATCHES_TOTAL, JOB_OUTCOMES_TOTAL, SWEEP_DURATION, TASKS_IN_FLIGHT};

/// Metrics collector for recording kgforge operational metrics.
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    /// Create a new MetricsCollector instance.
    ///
    /// Note: Metrics must be initialized with `init_metrics()` before
    /// recorded values show up in exports.
    pub fn new() -> Self {
        Self
    }

    /// Record one dispatch attempt.
    ///
    /// # Arguments
    ///
    /// * `operation` - The lifecycle operation that was dispatched
    /// * `outcome` - One of "accepted", "conflict", "unavailable",
    ///   "registry_write_failed"
    pub fn record_dispatch(&self, operation: JobKind, outcome: &str) {
        if let Some(dispatches) = DISPATCHES_TOTAL.get() {
            dispatches
                .with_label_values(&[operation.as_str(), outcome])
                .inc();
        }

        tracing::trace!(
            operation = %operation,
            outcome = outcome,
            "Recorded dispatch metric"
        );
    }

    /// Record a terminal job outcome that was applied to a dataset.
    pub fn record_job_outcome(&self, operation: JobKind, state: JobState) {
        if let Some(outcomes) = JOB_OUTCOMES_TOTAL.get() {
            outcomes
                .with_label_values(&[operation.as_str(), state.as_str()])
                .inc();
        }
    }

    /// Record how many registered tasks still await a terminal outcome.
    pub fn set_tasks_in_flight(&self, count: usize) {
        if let Some(tasks_in_flight) = TASKS_IN_FLIGHT.get() {
            tasks_in_flight.set(count as f64);
        }
    }

    /// Record the duration of one poller sweep.
    pub fn observe_sweep(&self, duration: Duration) {
        if let Some(sweep_duration) = SWEEP_DURATION.get() {
            sweep_duration.observe(duration.as_secs_f64());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_is_safe_before_init() {
        // Must not panic even when init_metrics() was never called.
        let collector = MetricsCollector::new();
        collector.record_dispatch(JobKind::Train, "accepted");
        collector.record_job_outcome(JobKind::Train, JobState::Succeeded);
        collector.set_tasks_in_flight(3);
        collector.observe_sweep(Duration::from_millis(12));
    }

    #[test]
    fn test_recording_after_init() {
        let _ = crate::metrics::init_metrics();

        let collector = MetricsCollector::new();
        collector.record_dispatch(JobKind::GenerateTriples, "accepted");
        collector.record_dispatch(JobKind::GenerateTriples, "conflict");

        let exported = crate::metrics::export_metrics();
        assert!(exported.contains("kgforge_dispatches_total"));
    }
}
