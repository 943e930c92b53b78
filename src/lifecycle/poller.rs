//! Outcome poller: watches in-flight tasks and settles finished jobs.
//!
//! A single background task sweeps the unresolved rows of the task
//! registry, polls each job handle, hands terminal polls to the
//! lifecycle controller and marks settled tasks resolved. Poll and
//! apply failures are logged and retried on the next sweep; only a
//! shutdown signal stops the loop.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::jobs::JobRunner;
use crate::metrics::MetricsCollector;
use crate::storage::TaskRegistry;

use super::controller::LifecycleController;

/// Errors that can occur while managing the poller.
#[derive(Debug, Error)]
pub enum PollerError {
    #[error("Poller is already running")]
    AlreadyRunning,

    #[error("Poller is not running")]
    NotRunning,

    #[error("Shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),
}

/// Configuration for the outcome poller.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Pause between sweeps over the unresolved tasks.
    pub sweep_interval: Duration,
    /// Timeout for graceful shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl PollerConfig {
    /// Sets the pause between sweeps.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Sets the shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Counters describing one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    /// Unresolved tasks inspected.
    pub checked: usize,
    /// Terminal outcomes applied and marked resolved.
    pub applied: usize,
    /// Poll or apply failures left for the next sweep.
    pub errors: usize,
}

/// Cumulative poller statistics.
#[derive(Debug, Clone, Default)]
pub struct PollerStats {
    pub sweeps: u64,
    pub outcomes_applied: u64,
    pub errors: u64,
}

/// Shared state for tracking poller statistics.
struct SharedPollerStats {
    sweeps: AtomicU64,
    outcomes_applied: AtomicU64,
    errors: AtomicU64,
}

impl SharedPollerStats {
    fn new() -> Self {
        Self {
            sweeps: AtomicU64::new(0),
            outcomes_applied: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    fn record_sweep(&self, summary: &SweepSummary) {
        self.sweeps.fetch_add(1, Ordering::SeqCst);
        self.outcomes_applied
            .fetch_add(summary.applied as u64, Ordering::SeqCst);
        self.errors.fetch_add(summary.errors as u64, Ordering::SeqCst);
    }

    fn to_stats(&self) -> PollerStats {
        PollerStats {
            sweeps: self.sweeps.load(Ordering::SeqCst),
            outcomes_applied: self.outcomes_applied.load(Ordering::SeqCst),
            errors: self.errors.load(Ordering::SeqCst),
        }
    }
}

/// Background loop that folds finished jobs back into dataset state.
pub struct OutcomePoller {
    config: PollerConfig,
    controller: Arc<LifecycleController>,
    tasks: TaskRegistry,
    runner: Arc<dyn JobRunner>,
    shutdown_tx: broadcast::Sender<()>,
    handle: Option<JoinHandle<()>>,
    stats: Arc<SharedPollerStats>,
    is_running: AtomicBool,
}

impl OutcomePoller {
    pub fn new(
        config: PollerConfig,
        controller: Arc<LifecycleController>,
        tasks: TaskRegistry,
        runner: Arc<dyn JobRunner>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            controller,
            tasks,
            runner,
            shutdown_tx,
            handle: None,
            stats: Arc::new(SharedPollerStats::new()),
            is_running: AtomicBool::new(false),
        }
    }

    /// Runs one sweep immediately, outside the background loop.
    pub async fn sweep_once(&self) -> SweepSummary {
        self.sweeper().sweep().await
    }

    /// Starts the background sweep loop.
    pub fn start(&mut self) -> Result<(), PollerError> {
        if self.is_running.load(Ordering::SeqCst) {
            return Err(PollerError::AlreadyRunning);
        }

        let sweeper = self.sweeper();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let interval = self.config.sweep_interval;

        self.handle = Some(tokio::spawn(async move {
            sweeper.run(&mut shutdown_rx, interval).await;
        }));
        self.is_running.store(true, Ordering::SeqCst);

        info!(
            runner = self.runner.name(),
            interval_ms = interval.as_millis() as u64,
            "Outcome poller started"
        );
        Ok(())
    }

    /// Sends the shutdown signal and waits for the loop to finish.
    pub async fn shutdown(&mut self) -> Result<(), PollerError> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Err(PollerError::NotRunning);
        }

        let _ = self.shutdown_tx.send(());

        if let Some(handle) = self.handle.take() {
            match tokio::time::timeout(self.config.shutdown_timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "Poller task panicked during shutdown"),
                Err(_) => {
                    self.is_running.store(false, Ordering::SeqCst);
                    return Err(PollerError::ShutdownTimeout(self.config.shutdown_timeout));
                }
            }
        }

        self.is_running.store(false, Ordering::SeqCst);
        info!("Outcome poller stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Returns a snapshot of the cumulative statistics.
    pub fn stats(&self) -> PollerStats {
        self.stats.to_stats()
    }

    fn sweeper(&self) -> Sweeper {
        Sweeper {
            controller: Arc::clone(&self.controller),
            tasks: self.tasks.clone(),
            runner: Arc::clone(&self.runner),
            stats: Arc::clone(&self.stats),
            metrics: MetricsCollector::new(),
        }
    }
}

/// The state one sweep loop carries into its background task.
struct Sweeper {
    controller: Arc<LifecycleController>,
    tasks: TaskRegistry,
    runner: Arc<dyn JobRunner>,
    stats: Arc<SharedPollerStats>,
    metrics: MetricsCollector,
}

impl Sweeper {
    async fn run(self, shutdown_rx: &mut broadcast::Receiver<()>, interval: Duration) {
        loop {
            match shutdown_rx.try_recv() {
                Ok(()) | Err(broadcast::error::TryRecvError::Closed) => break,
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(broadcast::error::TryRecvError::Empty) => {}
            }

            self.sweep().await;

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown_rx.recv() => break,
            }
        }
        debug!("Sweep loop exited");
    }

    async fn sweep(&self) -> SweepSummary {
        let started = Instant::now();
        let mut summary = SweepSummary::default();

        let pending = match self.tasks.unresolved().await {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(error = %e, "Failed to load unresolved tasks");
                summary.errors += 1;
                self.stats.record_sweep(&summary);
                return summary;
            }
        };

        summary.checked = pending.len();
        self.metrics.set_tasks_in_flight(pending.len());

        for task in pending {
            let poll = match self.runner.poll(&task.job_handle).await {
                Ok(poll) => poll,
                Err(e) => {
                    warn!(
                        task_id = task.id,
                        handle = %task.job_handle,
                        error = %e,
                        "Job poll failed"
                    );
                    summary.errors += 1;
                    continue;
                }
            };

            if !poll.is_terminal() {
                debug!(task_id = task.id, state = %poll.state, "Job still in flight");
                continue;
            }

            match self.controller.apply_outcome(&task, &poll).await {
                Ok(true) => {
                    if let Err(e) = self.tasks.mark_resolved(task.id).await {
                        error!(task_id = task.id, error = %e, "Failed to mark task resolved");
                        summary.errors += 1;
                        continue;
                    }
                    summary.applied += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    error!(task_id = task.id, error = %e, "Failed to apply job outcome");
                    summary.errors += 1;
                }
            }
        }

        self.metrics.observe_sweep(started.elapsed());
        self.stats.record_sweep(&summary);

        if summary.applied > 0 {
            info!(
                checked = summary.checked,
                applied = summary.applied,
                "Sweep applied job outcomes"
            );
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = PollerConfig::default();
        assert_eq!(config.sweep_interval, Duration::from_secs(5));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_config_builders() {
        let config = PollerConfig::default()
            .with_sweep_interval(Duration::from_millis(50))
            .with_shutdown_timeout(Duration::from_secs(2));
        assert_eq!(config.sweep_interval, Duration::from_millis(50));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_shared_stats_accumulate() {
        let stats = SharedPollerStats::new();

        stats.record_sweep(&SweepSummary {
            checked: 4,
            applied: 2,
            errors: 1,
        });
        stats.record_sweep(&SweepSummary {
            checked: 1,
            applied: 1,
            errors: 0,
        });

        let snapshot = stats.to_stats();
        assert_eq!(snapshot.sweeps, 2);
        assert_eq!(snapshot.outcomes_applied, 3);
        assert_eq!(snapshot.errors, 1);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            PollerError::AlreadyRunning.to_string(),
            "Poller is already running"
        );
        assert_eq!(PollerError::NotRunning.to_string(), "Poller is not running");
        assert!(PollerError::ShutdownTimeout(Duration::from_secs(30))
            .to_string()
            .contains("30"));
    }
}
