//! Job submission and polling against the external worker fleet.
//!
//! This module defines the coordination types shared by every backend:
//!
//! - `JobKind` / `JobRequest`: the three lifecycle operations and
//!   their serialized submission payloads
//! - `JobState` / `JobPoll` / `JobOutcome`: what polling a handle
//!   reports back
//! - `JobRunner`: the submission/poll seam; [`queue::RedisJobRunner`]
//!   is the production implementation and [`memory::MemoryJobRunner`]
//!   the in-process one for tests and local development
//!
//! Submission never waits on execution. Completion is only ever
//! observed by polling a handle, and a handle the backend has never
//! seen polls as pending.

pub mod memory;
pub mod queue;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::storage::Algorithm;

/// Errors that can occur while talking to the job backend.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Failed to reach the backend.
    #[error("Job backend connection failed: {0}")]
    ConnectionFailed(String),

    /// A backend operation failed mid-flight.
    #[error("Job backend operation failed: {0}")]
    Redis(#[from] redis::RedisError),

    /// Failed to serialize a submission or parse a status payload.
    #[error("Job payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Opaque identifier of a submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(String);

impl JobHandle {
    /// Generates a fresh random handle.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for JobHandle {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for JobHandle {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The three asynchronous lifecycle operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    GenerateTriples,
    Train,
    BuildSearchIndex,
}

impl JobKind {
    pub const ALL: [JobKind; 3] = [
        JobKind::GenerateTriples,
        JobKind::Train,
        JobKind::BuildSearchIndex,
    ];

    /// Wire name, also stored in the task registry.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::GenerateTriples => "generate_triples",
            JobKind::Train => "train",
            JobKind::BuildSearchIndex => "build_search_index",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "generate_triples" => Some(JobKind::GenerateTriples),
            "train" => Some(JobKind::Train),
            "build_search_index" => Some(JobKind::BuildSearchIndex),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parameters for a triple extraction job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriplesSpec {
    /// SPARQL graph pattern selecting the seed entities.
    pub graph_pattern: String,
    /// How many expansion levels to crawl out from the seeds.
    pub levels: u32,
    /// Optional batch size hint for the extraction worker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,
}

impl TriplesSpec {
    pub fn new(graph_pattern: impl Into<String>, levels: u32) -> Self {
        Self {
            graph_pattern: graph_pattern.into(),
            levels,
            batch_size: None,
        }
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = Some(batch_size);
        self
    }
}

/// A serialized unit of work handed to the workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobRequest {
    GenerateTriples {
        dataset_id: i64,
        spec: TriplesSpec,
    },
    /// The full algorithm descriptor rides along so workers need no
    /// catalog access.
    Train {
        dataset_id: i64,
        algorithm: Algorithm,
    },
    BuildSearchIndex {
        dataset_id: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        n_trees: Option<u32>,
    },
}

impl JobRequest {
    pub fn kind(&self) -> JobKind {
        match self {
            JobRequest::GenerateTriples { .. } => JobKind::GenerateTriples,
            JobRequest::Train { .. } => JobKind::Train,
            JobRequest::BuildSearchIndex { .. } => JobKind::BuildSearchIndex,
        }
    }

    pub fn dataset_id(&self) -> i64 {
        match self {
            JobRequest::GenerateTriples { dataset_id, .. }
            | JobRequest::Train { dataset_id, .. }
            | JobRequest::BuildSearchIndex { dataset_id, .. } => *dataset_id,
        }
    }
}

/// Execution state reported for a job handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Queued, or never seen by the backend.
    Pending,
    /// Picked up by a worker.
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Artifacts reported by a finished job.
///
/// One flat shape covers all three operations; workers fill the
/// fields their operation produced and leave the rest unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobOutcome {
    /// Rewritten triple store, when extraction replaced the file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entities: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relations: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triples: Option<u64>,
}

impl JobOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dataset_path(mut self, path: impl Into<String>) -> Self {
        self.dataset_path = Some(path.into());
        self
    }

    pub fn with_model_path(mut self, path: impl Into<String>) -> Self {
        self.model_path = Some(path.into());
        self
    }

    pub fn with_index_path(mut self, path: impl Into<String>) -> Self {
        self.index_path = Some(path.into());
        self
    }

    pub fn with_embedding_size(mut self, size: u32) -> Self {
        self.embedding_size = Some(size);
        self
    }

    pub fn with_counts(mut self, entities: u64, relations: u64, triples: u64) -> Self {
        self.entities = Some(entities);
        self.relations = Some(relations);
        self.triples = Some(triples);
        self
    }
}

/// Result of polling a job handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPoll {
    pub state: JobState,
    /// Present on success when the worker reported artifacts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<JobOutcome>,
    /// Present on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobPoll {
    pub fn pending() -> Self {
        Self {
            state: JobState::Pending,
            outcome: None,
            error: None,
        }
    }

    pub fn running() -> Self {
        Self {
            state: JobState::Running,
            outcome: None,
            error: None,
        }
    }

    pub fn succeeded(outcome: JobOutcome) -> Self {
        Self {
            state: JobState::Succeeded,
            outcome: Some(outcome),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            state: JobState::Failed,
            outcome: None,
            error: Some(error.into()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Submission and polling seam to the execution substrate.
///
/// `submit` hands work over and returns as soon as the backend has
/// accepted it; it must never block on job execution. `poll` reports
/// the current state of a handle and treats unknown handles as
/// pending.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn submit(&self, request: JobRequest) -> Result<JobHandle, RunnerError>;

    async fn poll(&self, handle: &JobHandle) -> Result<JobPoll, RunnerError>;

    /// Short backend name for logs.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn algorithm() -> Algorithm {
        Algorithm {
            id: 1,
            name: "TransE".to_string(),
            embedding_size: 100,
            params: serde_json::json!({"margin": 2.0}),
        }
    }

    #[test]
    fn test_kind_wire_names() {
        assert_eq!(JobKind::GenerateTriples.as_str(), "generate_triples");
        assert_eq!(JobKind::Train.as_str(), "train");
        assert_eq!(JobKind::BuildSearchIndex.as_str(), "build_search_index");

        for kind in JobKind::ALL {
            assert_eq!(JobKind::parse(kind.as_str()), Some(kind));
        }
        assert!(JobKind::parse("reindex").is_none());
    }

    #[test]
    fn test_handle_generation_is_unique() {
        let a = JobHandle::generate();
        let b = JobHandle::generate();
        assert_ne!(a, b);
        assert!(!a.as_str().is_empty());
    }

    #[test]
    fn test_handle_serializes_as_bare_string() {
        let handle = JobHandle::from("abc-123");
        let json = serde_json::to_string(&handle).unwrap();
        assert_eq!(json, "\"abc-123\"");

        let parsed: JobHandle = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, handle);
    }

    #[test]
    fn test_triples_spec_builder() {
        let spec = TriplesSpec::new("?s wdt:P31 wd:Q5", 2).with_batch_size(50_000);
        assert_eq!(spec.graph_pattern, "?s wdt:P31 wd:Q5");
        assert_eq!(spec.levels, 2);
        assert_eq!(spec.batch_size, Some(50_000));
    }

    #[test]
    fn test_request_accessors() {
        let request = JobRequest::Train {
            dataset_id: 9,
            algorithm: algorithm(),
        };
        assert_eq!(request.kind(), JobKind::Train);
        assert_eq!(request.dataset_id(), 9);

        let request = JobRequest::BuildSearchIndex {
            dataset_id: 4,
            n_trees: Some(10),
        };
        assert_eq!(request.kind(), JobKind::BuildSearchIndex);
        assert_eq!(request.dataset_id(), 4);
    }

    #[test]
    fn test_request_serialization_is_tagged() {
        let request = JobRequest::GenerateTriples {
            dataset_id: 3,
            spec: TriplesSpec::new("?s ?p ?o", 1),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["kind"], "generate_triples");
        assert_eq!(json["dataset_id"], 3);
        assert_eq!(json["spec"]["levels"], 1);
        assert!(json["spec"].get("batch_size").is_none());

        let parsed: JobRequest = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, request);
    }

    #[test]
    fn test_state_terminality() {
        assert!(!JobState::Pending.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(JobState::Succeeded.is_terminal());
        assert!(JobState::Failed.is_terminal());
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&JobState::Succeeded).unwrap();
        assert_eq!(json, "\"SUCCEEDED\"");

        let state: JobState = serde_json::from_str("\"RUNNING\"").unwrap();
        assert_eq!(state, JobState::Running);
    }

    #[test]
    fn test_poll_constructors() {
        assert_eq!(JobPoll::pending().state, JobState::Pending);
        assert_eq!(JobPoll::running().state, JobState::Running);

        let poll = JobPoll::succeeded(JobOutcome::new().with_model_path("model_1.bin"));
        assert!(poll.is_terminal());
        assert_eq!(
            poll.outcome.unwrap().model_path.as_deref(),
            Some("model_1.bin")
        );

        let poll = JobPoll::failed("trainer crashed");
        assert!(poll.is_terminal());
        assert_eq!(poll.error.as_deref(), Some("trainer crashed"));
    }

    #[test]
    fn test_outcome_builder() {
        let outcome = JobOutcome::new()
            .with_dataset_path("dataset_1.bin")
            .with_embedding_size(100)
            .with_counts(400, 12, 9000);

        assert_eq!(outcome.dataset_path.as_deref(), Some("dataset_1.bin"));
        assert_eq!(outcome.embedding_size, Some(100));
        assert_eq!(outcome.triples, Some(9000));
        assert!(outcome.model_path.is_none());
    }

    #[test]
    fn test_poll_parses_minimal_payload() {
        let poll: JobPoll = serde_json::from_str(r#"{"state": "RUNNING"}"#).unwrap();
        assert_eq!(poll.state, JobState::Running);
        assert!(poll.outcome.is_none());
        assert!(poll.error.is_none());
    }
}
