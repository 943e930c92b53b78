//! Metrics module for Prometheus-based monitoring.
//!
//! This module provides metrics collection and export for kgforge
//! operations: dispatch attempts, applied job outcomes, in-flight
//! tasks and poller sweep timing.
//!
//! # Example
//!
//! ```ignore
//! use kgforge::metrics::{init_metrics, export_metrics, MetricsCollector};
//! use kgforge::jobs::JobKind;
//!
//! // Initialize metrics on startup
//! init_metrics().expect("Failed to initialize metrics");
//!
//! // Create a collector for recording metrics
//! let collector = MetricsCollector::new();
//! collector.record_dispatch(JobKind::Train, "accepted");
//!
//! // Export metrics for Prometheus scraping
//! let metrics_text = export_metrics();
//! ```

pub mod collectors;
pub mod prometheus;

// Re-export key types for convenient access
pub use collectors::MetricsCollector;
pub use prometheus::{export_metrics, init_metrics, metrics_handler};

// Re-export metric constants for direct access when needed
pub use prometheus::{
    DISPATCHES_TOTAL, JOB_OUTCOMES_TOTAL, REGISTRY, SWEEP_DURATION, TASKS_IN_FLIGHT,
};
