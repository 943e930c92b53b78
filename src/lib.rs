//! kgforge: Knowledge graph embedding dataset lifecycle service.
//!
//! This library tracks datasets from empty shells through triple
//! extraction, embedding training and search index builds, handing the
//! long-running work to external workers over a Redis job queue.

// Core modules
pub mod cli;
pub mod config;
pub mod dataset;
pub mod error;
pub mod files;
pub mod jobs;
pub mod lifecycle;
pub mod metrics;
pub mod storage;

// Re-export commonly used error types
pub use error::{LifecycleError, StoreError};
pub use files::FilesError;
pub use jobs::RunnerError;
