//! In-process job runner for tests and local development.
//!
//! Submitted jobs never execute on their own; a driver settles them
//! explicitly through [`MemoryJobRunner::complete`] and
//! [`MemoryJobRunner::fail`]. Settling a handle the runner has never
//! seen is a no-op.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{JobHandle, JobOutcome, JobPoll, JobRequest, JobRunner, RunnerError};

#[derive(Debug, Clone)]
struct MemoryJob {
    request: JobRequest,
    poll: JobPoll,
}

/// In-memory [`JobRunner`].
#[derive(Default)]
pub struct MemoryJobRunner {
    jobs: Mutex<HashMap<JobHandle, MemoryJob>>,
    fail_submissions: AtomicBool,
}

impl MemoryJobRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent submissions fail as if the backend were down.
    pub fn set_fail_submissions(&self, fail: bool) {
        self.fail_submissions.store(fail, Ordering::SeqCst);
    }

    /// Marks a job as picked up by a worker.
    pub async fn start(&self, handle: &JobHandle) {
        self.set_poll(handle, JobPoll::running()).await;
    }

    /// Settles a job successfully with the given artifacts.
    pub async fn complete(&self, handle: &JobHandle, outcome: JobOutcome) {
        self.set_poll(handle, JobPoll::succeeded(outcome)).await;
    }

    /// Settles a job as failed.
    pub async fn fail(&self, handle: &JobHandle, error: &str) {
        self.set_poll(handle, JobPoll::failed(error)).await;
    }

    /// The request submitted under a handle, if any.
    pub async fn request(&self, handle: &JobHandle) -> Option<JobRequest> {
        self.jobs
            .lock()
            .await
            .get(handle)
            .map(|job| job.request.clone())
    }

    /// Handles of every accepted submission.
    pub async fn submitted(&self) -> Vec<JobHandle> {
        self.jobs.lock().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }

    async fn set_poll(&self, handle: &JobHandle, poll: JobPoll) {
        if let Some(job) = self.jobs.lock().await.get_mut(handle) {
            job.poll = poll;
        }
    }
}

#[async_trait]
impl JobRunner for MemoryJobRunner {
    async fn submit(&self, request: JobRequest) -> Result<JobHandle, RunnerError> {
        if self.fail_submissions.load(Ordering::SeqCst) {
            return Err(RunnerError::ConnectionFailed(
                "simulated backend outage".to_string(),
            ));
        }

        let handle = JobHandle::generate();
        self.jobs.lock().await.insert(
            handle.clone(),
            MemoryJob {
                request,
                poll: JobPoll::pending(),
            },
        );
        Ok(handle)
    }

    async fn poll(&self, handle: &JobHandle) -> Result<JobPoll, RunnerError> {
        let jobs = self.jobs.lock().await;
        Ok(jobs
            .get(handle)
            .map(|job| job.poll.clone())
            .unwrap_or_else(JobPoll::pending))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{JobState, TriplesSpec};

    fn request() -> JobRequest {
        JobRequest::GenerateTriples {
            dataset_id: 1,
            spec: TriplesSpec::new("?s ?p ?o", 2),
        }
    }

    #[tokio::test]
    async fn test_submit_then_poll_pending() {
        let runner = MemoryJobRunner::new();
        let handle = runner.submit(request()).await.unwrap();

        let poll = runner.poll(&handle).await.unwrap();
        assert_eq!(poll.state, JobState::Pending);
        assert_eq!(runner.len().await, 1);
        assert_eq!(runner.request(&handle).await, Some(request()));
    }

    #[tokio::test]
    async fn test_job_settles_through_states() {
        let runner = MemoryJobRunner::new();
        let handle = runner.submit(request()).await.unwrap();

        runner.start(&handle).await;
        assert_eq!(runner.poll(&handle).await.unwrap().state, JobState::Running);

        runner
            .complete(&handle, JobOutcome::new().with_counts(10, 2, 30))
            .await;
        let poll = runner.poll(&handle).await.unwrap();
        assert_eq!(poll.state, JobState::Succeeded);
        assert_eq!(poll.outcome.unwrap().triples, Some(30));
    }

    #[tokio::test]
    async fn test_failed_job_reports_error() {
        let runner = MemoryJobRunner::new();
        let handle = runner.submit(request()).await.unwrap();

        runner.fail(&handle, "worker crashed").await;
        let poll = runner.poll(&handle).await.unwrap();
        assert_eq!(poll.state, JobState::Failed);
        assert_eq!(poll.error.as_deref(), Some("worker crashed"));
    }

    #[tokio::test]
    async fn test_unknown_handle_polls_pending() {
        let runner = MemoryJobRunner::new();
        let poll = runner.poll(&JobHandle::from("never-seen")).await.unwrap();
        assert_eq!(poll.state, JobState::Pending);
        assert!(poll.outcome.is_none());
    }

    #[tokio::test]
    async fn test_submission_failures_can_be_simulated() {
        let runner = MemoryJobRunner::new();
        runner.set_fail_submissions(true);

        let err = runner.submit(request()).await.unwrap_err();
        assert!(matches!(err, RunnerError::ConnectionFailed(_)));
        assert!(runner.is_empty().await);

        runner.set_fail_submissions(false);
        assert!(runner.submit(request()).await.is_ok());
    }
}
