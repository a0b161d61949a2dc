//! Durable delayed job queue adapter (C7).
//!
//! Defines the [`JobQueue`] trait the scheduling engine and publish executor
//! depend on, an in-memory implementation for tests, and a Redis-backed
//! skeleton for production use. Retry/backoff classification is layered on
//! top via [`RetryPolicy`], reusing `publisher_contracts::PublisherError`'s
//! retryable/terminal split.

mod memory;
#[cfg(feature = "redis-backend")]
mod redis_backend;
mod retry;
mod state;

pub use memory::MemoryJobQueue;
#[cfg(feature = "redis-backend")]
pub use redis_backend::RedisJobQueue;
pub use retry::RetryPolicy;
pub use state::JobState;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use publisher_contracts::PublisherError;

/// Durable delayed queue contract (C7). Implementations must survive process
/// restart and guarantee at most one `Active` claim per `job_id` at a time.
#[async_trait]
pub trait JobQueue<P>: Send + Sync
where
    P: Clone + Send + Sync,
{
    /// Idempotent by `job_id`: re-scheduling the same id replaces the
    /// pending job's `fire_at` (and payload) rather than creating a
    /// duplicate entry.
    async fn schedule(
        &self,
        job_id: String,
        payload: P,
        fire_at: DateTime<Utc>,
    ) -> Result<(), PublisherError>;

    /// Enqueues `job_id` with zero delay. Fails with `JOB_BUSY` if a job
    /// with this id is currently `Active`; if `Waiting` or `Delayed`, that
    /// pending job is replaced.
    async fn publish_now(&self, job_id: String, payload: P) -> Result<(), PublisherError>;

    /// No-op when `job_id` is absent.
    async fn cancel(&self, job_id: &str) -> Result<(), PublisherError>;

    async fn get_state(&self, job_id: &str) -> Result<JobState, PublisherError>;

    /// Claims every job whose `fire_at` has passed, transitioning each to
    /// `Active` and returning its payload. This is the operation a worker
    /// pool polls to dequeue work.
    async fn claim_ready(&self, now: DateTime<Utc>) -> Result<Vec<(String, P)>, PublisherError>;

    /// Marks a claimed job `Completed`.
    async fn complete(&self, job_id: &str) -> Result<(), PublisherError>;

    /// Reports a failed attempt. If the error is retryable and attempts
    /// remain under the configured policy, re-delays the job and returns
    /// the next `fire_at`; otherwise marks it `Failed` (terminal) and
    /// returns `None`.
    async fn fail(
        &self,
        job_id: &str,
        error: &PublisherError,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, PublisherError>;
}
