//! In-memory [`JobQueue`] implementation used by tests and local runs.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use publisher_contracts::PublisherError;

use crate::retry::RetryPolicy;
use crate::state::JobState;
use crate::JobQueue;

struct Record<P> {
    payload: P,
    fire_at: DateTime<Utc>,
    state: JobState,
    attempts: u32,
}

/// `HashMap`-backed [`JobQueue`], guarded by a single `parking_lot::Mutex`.
/// Sufficient to simulate at-most-one-active-per-id semantics under test;
/// a production deployment uses [`crate::RedisJobQueue`] instead.
pub struct MemoryJobQueue<P> {
    jobs: Mutex<HashMap<String, Record<P>>>,
    retry_policy: RetryPolicy,
}

impl<P> MemoryJobQueue<P> {
    pub fn new() -> Self {
        Self::with_retry_policy(RetryPolicy::default())
    }

    pub fn with_retry_policy(retry_policy: RetryPolicy) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            retry_policy,
        }
    }
}

impl<P> Default for MemoryJobQueue<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<P> JobQueue<P> for MemoryJobQueue<P>
where
    P: Clone + Send + Sync,
{
    async fn schedule(
        &self,
        job_id: String,
        payload: P,
        fire_at: DateTime<Utc>,
    ) -> Result<(), PublisherError> {
        let mut jobs = self.jobs.lock();
        match jobs.get_mut(&job_id) {
            Some(record) if record.state != JobState::Active => {
                record.payload = payload;
                record.fire_at = fire_at;
                record.state = JobState::Delayed;
            }
            Some(_active) => {
                // An active attempt keeps running; the new fire_at takes
                // effect only if the attempt later fails and is retried,
                // so we simply remember it without disturbing the active
                // claim.
                jobs.insert(
                    job_id,
                    Record {
                        payload,
                        fire_at,
                        state: JobState::Active,
                        attempts: jobs.values().map(|r| r.attempts).next().unwrap_or(0),
                    },
                );
            }
            None => {
                jobs.insert(
                    job_id,
                    Record {
                        payload,
                        fire_at,
                        state: JobState::Delayed,
                        attempts: 0,
                    },
                );
            }
        }
        Ok(())
    }

    async fn publish_now(&self, job_id: String, payload: P) -> Result<(), PublisherError> {
        let mut jobs = self.jobs.lock();
        if let Some(record) = jobs.get(&job_id) {
            if record.state == JobState::Active {
                return Err(PublisherError::JobBusy { job_id });
            }
        }
        jobs.insert(
            job_id,
            Record {
                payload,
                fire_at: Utc::now(),
                state: JobState::Waiting,
                attempts: 0,
            },
        );
        Ok(())
    }

    async fn cancel(&self, job_id: &str) -> Result<(), PublisherError> {
        self.jobs.lock().remove(job_id);
        Ok(())
    }

    async fn get_state(&self, job_id: &str) -> Result<JobState, PublisherError> {
        Ok(self
            .jobs
            .lock()
            .get(job_id)
            .map(|record| record.state)
            .unwrap_or(JobState::Absent))
    }

    async fn claim_ready(&self, now: DateTime<Utc>) -> Result<Vec<(String, P)>, PublisherError> {
        let mut jobs = self.jobs.lock();
        let mut claimed = Vec::new();
        for (job_id, record) in jobs.iter_mut() {
            if matches!(record.state, JobState::Waiting | JobState::Delayed) && record.fire_at <= now {
                record.state = JobState::Active;
                record.attempts += 1;
                claimed.push((job_id.clone(), record.payload.clone()));
            }
        }
        Ok(claimed)
    }

    async fn complete(&self, job_id: &str) -> Result<(), PublisherError> {
        if let Some(record) = self.jobs.lock().get_mut(job_id) {
            record.state = JobState::Completed;
        }
        Ok(())
    }

    async fn fail(
        &self,
        job_id: &str,
        error: &PublisherError,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, PublisherError> {
        let mut jobs = self.jobs.lock();
        let Some(record) = jobs.get_mut(job_id) else {
            return Ok(None);
        };

        if self.retry_policy.should_retry(error, record.attempts) {
            let delay = self.retry_policy.backoff_for_attempt(record.attempts);
            let next_fire_at = now + chrono::Duration::from_std(delay).unwrap_or_default();
            record.fire_at = next_fire_at;
            record.state = JobState::Delayed;
            Ok(Some(next_fire_at))
        } else {
            record.state = JobState::Failed;
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use publisher_contracts::model::PublishJobPayload;
    use uuid::Uuid;

    fn payload() -> PublishJobPayload {
        PublishJobPayload {
            draft_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            upload_mode: publisher_contracts::model::UploadMode::Single,
        }
    }

    #[tokio::test]
    async fn schedule_is_idempotent_and_replaces_fire_at() {
        let queue: MemoryJobQueue<PublishJobPayload> = MemoryJobQueue::new();
        let now = Utc::now();
        queue
            .schedule("job-1".into(), payload(), now + chrono::Duration::minutes(10))
            .await
            .unwrap();
        queue
            .schedule("job-1".into(), payload(), now + chrono::Duration::minutes(1))
            .await
            .unwrap();

        assert_eq!(queue.jobs.lock().len(), 1);
        let claimed = queue.claim_ready(now + chrono::Duration::minutes(2)).await.unwrap();
        assert_eq!(claimed.len(), 1);
    }

    #[tokio::test]
    async fn publish_now_fails_busy_when_active() {
        let queue: MemoryJobQueue<PublishJobPayload> = MemoryJobQueue::new();
        let now = Utc::now();
        queue.schedule("job-1".into(), payload(), now).await.unwrap();
        queue.claim_ready(now).await.unwrap();

        let err = queue.publish_now("job-1".into(), payload()).await.unwrap_err();
        assert!(matches!(err, PublisherError::JobBusy { .. }));
    }

    #[tokio::test]
    async fn publish_now_replaces_a_pending_job() {
        let queue: MemoryJobQueue<PublishJobPayload> = MemoryJobQueue::new();
        let now = Utc::now();
        queue
            .schedule("job-1".into(), payload(), now + chrono::Duration::hours(1))
            .await
            .unwrap();

        queue.publish_now("job-1".into(), payload()).await.unwrap();
        assert_eq!(queue.get_state("job-1").await.unwrap(), JobState::Waiting);
    }

    #[tokio::test]
    async fn cancel_is_a_no_op_when_absent() {
        let queue: MemoryJobQueue<PublishJobPayload> = MemoryJobQueue::new();
        queue.cancel("never-scheduled").await.unwrap();
        assert_eq!(
            queue.get_state("never-scheduled").await.unwrap(),
            JobState::Absent
        );
    }

    #[tokio::test]
    async fn claim_ready_only_claims_due_jobs() {
        let queue: MemoryJobQueue<PublishJobPayload> = MemoryJobQueue::new();
        let now = Utc::now();
        queue.schedule("due".into(), payload(), now).await.unwrap();
        queue
            .schedule("future".into(), payload(), now + chrono::Duration::hours(1))
            .await
            .unwrap();

        let claimed = queue.claim_ready(now).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].0, "due");
        assert_eq!(queue.get_state("due").await.unwrap(), JobState::Active);
        assert_eq!(queue.get_state("future").await.unwrap(), JobState::Delayed);
    }

    #[tokio::test]
    async fn fail_reschedules_retryable_error_with_backoff() {
        let queue: MemoryJobQueue<PublishJobPayload> = MemoryJobQueue::new();
        let now = Utc::now();
        queue.schedule("job-1".into(), payload(), now).await.unwrap();
        queue.claim_ready(now).await.unwrap();

        let next = queue
            .fail(
                "job-1",
                &PublisherError::ServerError { status: 503 },
                now,
            )
            .await
            .unwrap();
        assert!(next.is_some());
        assert_eq!(queue.get_state("job-1").await.unwrap(), JobState::Delayed);
    }

    #[tokio::test]
    async fn fail_marks_terminal_error_as_failed_without_reschedule() {
        let queue: MemoryJobQueue<PublishJobPayload> = MemoryJobQueue::new();
        let now = Utc::now();
        queue.schedule("job-1".into(), payload(), now).await.unwrap();
        queue.claim_ready(now).await.unwrap();

        let next = queue
            .fail("job-1", &PublisherError::validation("bad"), now)
            .await
            .unwrap();
        assert!(next.is_none());
        assert_eq!(queue.get_state("job-1").await.unwrap(), JobState::Failed);
    }

    #[tokio::test]
    async fn exhausting_retry_budget_marks_failed() {
        let queue: MemoryJobQueue<PublishJobPayload> =
            MemoryJobQueue::with_retry_policy(RetryPolicy::builder().max_attempts(1).build());
        let now = Utc::now();
        queue.schedule("job-1".into(), payload(), now).await.unwrap();
        queue.claim_ready(now).await.unwrap();

        let next = queue
            .fail("job-1", &PublisherError::ServerError { status: 500 }, now)
            .await
            .unwrap();
        assert!(next.is_none());
        assert_eq!(queue.get_state("job-1").await.unwrap(), JobState::Failed);
    }
}
