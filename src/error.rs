//! Error types for kgforge operations.
//!
//! The two core subsystems get their own enums here: the SQLite-backed
//! stores ([`StoreError`]) and the lifecycle controller
//! ([`LifecycleError`]). The job runner and dataset file seams define
//! their error enums next to their traits.

use thiserror::Error;

use crate::dataset::DatasetStatus;
use crate::files::FilesError;

/// Errors that can occur in the SQLite-backed stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Dataset {0} not found")]
    DatasetNotFound(i64),

    #[error("Task {0} not found")]
    TaskNotFound(i64),

    #[error("Algorithm {0} not found")]
    AlgorithmNotFound(i64),

    /// A conditional status update matched the row but not its status.
    #[error("Dataset {id} is {current}, transition rejected")]
    TransitionConflict { id: i64, current: DatasetStatus },

    /// A stored status code no status maps to.
    #[error("Dataset {dataset_id} has unknown status code {code}")]
    UnknownStatusCode { dataset_id: i64, code: i64 },

    /// A stored kind id no kind maps to.
    #[error("Dataset {dataset_id} has unknown kind id {kind}")]
    UnknownKind { dataset_id: i64, kind: i64 },

    /// A stored operation name no job kind maps to.
    #[error("Task {task_id} has unknown operation '{operation}'")]
    UnknownOperation { task_id: i64, operation: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors surfaced by the lifecycle controller.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Dataset {0} not found")]
    DatasetNotFound(i64),

    #[error("Algorithm {0} not found")]
    AlgorithmNotFound(i64),

    #[error("Task {0} not found")]
    TaskNotFound(i64),

    /// The dataset exists but its current status forbids the
    /// operation. No job was queued and nothing was overwritten.
    #[error("Dataset {dataset_id} is {current} but {operation} requires {required}")]
    Conflict {
        dataset_id: i64,
        operation: &'static str,
        current: DatasetStatus,
        required: DatasetStatus,
    },

    /// The job backend refused a submission or poll; a failed
    /// submission has already had its status claim reverted.
    #[error("Job backend unavailable: {0}")]
    RunnerUnavailable(String),

    /// The job was submitted but the registry row could not be
    /// written. The claim stands and the job genuinely runs; retrying
    /// would submit it twice.
    #[error(
        "Task registry write failed after submitting job {handle} for dataset {dataset_id}: {source}"
    )]
    RegistryWriteFailed {
        dataset_id: i64,
        handle: String,
        #[source]
        source: StoreError,
    },

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Dataset files error: {0}")]
    Files(#[from] FilesError),
}
