//! Dataset lifecycle coordination.
//!
//! [`LifecycleController`] is the caller-facing operation surface;
//! [`OutcomePoller`] is the background loop that folds finished jobs
//! back into dataset state.

pub mod controller;
pub mod poller;

pub use controller::{LifecycleController, TaskHandle, TaskStatusView};
pub use poller::{OutcomePoller, PollerConfig, PollerError, PollerStats, SweepSummary};
