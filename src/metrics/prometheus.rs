//! Prometheus metrics registration and export.
//!
//! This module defines all Prometheus metrics used by kgforge and
//! provides functions for initializing, registering, and exporting
//! metrics.

use prometheus::{CounterVec, Encoder, Gauge, Histogram, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

/// Global Prometheus registry for all kgforge metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Dispatch attempts, labeled by operation and outcome.
pub static DISPATCHES_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Terminal job outcomes applied to datasets, labeled by operation and state.
pub static JOB_OUTCOMES_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Number of registered tasks awaiting a terminal outcome.
pub static TASKS_IN_FLIGHT: OnceLock<Gauge> = OnceLock::new();

/// Duration of outcome poller sweeps in seconds.
pub static SWEEP_DURATION: OnceLock<Histogram> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// This function should be called once at application startup.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric registration fails,
/// typically due to duplicate metric names.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    // Create the registry
    let registry = Registry::new();

    let dispatches_total = CounterVec::new(
        Opts::new(
            "kgforge_dispatches_total",
            "Dispatch attempts by operation and outcome",
        ),
        &["operation", "outcome"],
    )?;

    let job_outcomes_total = CounterVec::new(
        Opts::new(
            "kgforge_job_outcomes_total",
            "Terminal job outcomes applied to datasets",
        ),
        &["operation", "state"],
    )?;

    let tasks_in_flight = Gauge::new(
        "kgforge_tasks_in_flight",
        "Registered tasks awaiting a terminal outcome",
    )?;

    let sweep_duration = Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "kgforge_poll_sweep_seconds",
            "Duration of outcome poller sweeps",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
    )?;

    // Register all metrics with the registry
    registry.register(Box::new(dispatches_total.clone()))?;
    registry.register(Box::new(job_outcomes_total.clone()))?;
    registry.register(Box::new(tasks_in_flight.clone()))?;
    registry.register(Box::new(sweep_duration.clone()))?;

    // Store metrics in static variables
    // If any of these fail, metrics were already initialized (idempotent)
    let _ = REGISTRY.set(registry);
    let _ = DISPATCHES_TOTAL.set(dispatches_total);
    let _ = JOB_OUTCOMES_TOTAL.set(job_outcomes_total);
    let _ = TASKS_IN_FLIGHT.set(tasks_in_flight);
    let _ = SWEEP_DURATION.set(sweep_duration);

    tracing::info!("Prometheus metrics initialized successfully");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// Gathers all metrics from the registry and encodes them in the
/// Prometheus text exposition format, suitable for scraping.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}

/// HTTP handler for the /metrics endpoint.
///
/// Designed to be mounted in whatever web framework eventually fronts
/// the service. Returns metrics in Prometheus text format.
pub async fn metrics_handler() -> String {
    export_metrics()
}
