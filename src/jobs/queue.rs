//! Redis-backed job runner.
//!
//! Submissions are serialized envelopes LPUSHed onto a queue list that
//! the worker fleet consumes from the right in FIFO order. Workers
//! report progress by writing a status payload under a per-handle key.
//!
//! # Key layout
//!
//! * `{queue_name}` - submission list, one JSON envelope per job
//! * `{queue_name}:status:{handle}` - JSON [`JobPoll`] written by the
//!   worker owning the handle
//!
//! A handle with no status key polls as pending, so a job nobody has
//! picked up yet and a handle the backend never saw look the same.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

use super::{JobHandle, JobPoll, JobRequest, JobRunner, RunnerError};

/// Status payloads expire after 7 days.
const STATUS_TTL_SECS: u64 = 604_800;

/// Submission envelope as stored on the queue list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub handle: JobHandle,
    pub request: JobRequest,
    pub submitted_at: DateTime<Utc>,
}

fn status_key(queue_name: &str, handle: &JobHandle) -> String {
    format!("{}:status:{}", queue_name, handle)
}

/// Redis-backed [`JobRunner`].
pub struct RedisJobRunner {
    /// Redis connection manager (handles reconnection automatically).
    redis: ConnectionManager,
    queue_name: String,
}

impl RedisJobRunner {
    /// Connects to Redis and creates a runner for the given queue.
    ///
    /// # Errors
    ///
    /// Returns `RunnerError::ConnectionFailed` if the connection fails.
    pub async fn connect(redis_url: &str, queue_name: &str) -> Result<Self, RunnerError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| RunnerError::ConnectionFailed(e.to_string()))?;

        let redis = ConnectionManager::new(client)
            .await
            .map_err(|e| RunnerError::ConnectionFailed(e.to_string()))?;

        Ok(Self::from_connection(redis, queue_name))
    }

    /// Creates a runner from an existing ConnectionManager.
    ///
    /// Useful when sharing a connection pool across multiple components.
    pub fn from_connection(redis: ConnectionManager, queue_name: &str) -> Self {
        Self {
            redis,
            queue_name: queue_name.to_string(),
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Number of submissions waiting on the queue list.
    pub async fn queue_len(&self) -> Result<usize, RunnerError> {
        let mut conn = self.redis.clone();
        let len: usize = conn.llen(&self.queue_name).await?;
        Ok(len)
    }

    /// Writes a status payload for a handle.
    ///
    /// Workers normally do this from their side of the queue; it is
    /// exposed here so harnesses can settle jobs when driving the
    /// runner end to end.
    pub async fn record_status(
        &self,
        handle: &JobHandle,
        poll: &JobPoll,
    ) -> Result<(), RunnerError> {
        let payload = serde_json::to_string(poll)?;
        let mut conn = self.redis.clone();
        conn.set_ex::<_, _, ()>(status_key(&self.queue_name, handle), payload, STATUS_TTL_SECS)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl JobRunner for RedisJobRunner {
    async fn submit(&self, request: JobRequest) -> Result<JobHandle, RunnerError> {
        let handle = JobHandle::generate();
        let envelope = JobEnvelope {
            handle: handle.clone(),
            request,
            submitted_at: Utc::now(),
        };
        let serialized = serde_json::to_string(&envelope)?;

        let mut conn = self.redis.clone();
        conn.lpush::<_, _, ()>(&self.queue_name, serialized).await?;

        tracing::debug!(handle = %handle, queue = %self.queue_name, "Job enqueued");
        Ok(handle)
    }

    async fn poll(&self, handle: &JobHandle) -> Result<JobPoll, RunnerError> {
        let mut conn = self.redis.clone();
        let payload: Option<String> = conn.get(status_key(&self.queue_name, handle)).await?;

        match payload {
            Some(data) => Ok(serde_json::from_str(&data)?),
            None => Ok(JobPoll::pending()),
        }
    }

    fn name(&self) -> &str {
        "redis"
    }
}
