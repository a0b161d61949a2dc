//! Redis-backed [`JobQueue`] for production use.
//!
//! Layout per queue (`key_prefix` defaults to `publisher:queue`):
//!   - `{prefix}:due`              sorted set, member = job_id, score = fire_at (unix ms)
//!   - `{prefix}:active`           set of job_ids currently claimed
//!   - `{prefix}:payload:{id}`    JSON-serialized payload
//!   - `{prefix}:attempts:{id}`   claim counter, used by [`RetryPolicy`]
//!   - `{prefix}:terminal:{id}`   "completed" | "failed", set once a job leaves the queue
//!
//! A job is `Waiting`/`Delayed` while it has a `due` entry, `Active` while in
//! the `active` set, and `Completed`/`Failed` once its terminal marker is
//! set. `claim_ready` is not atomic across jobs: it pops due entries and
//! marks each active one at a time, so a crash mid-claim can leave a job in
//! `due` and `active` simultaneously. A supervising process is expected to
//! run stuck-job recovery (C9) against the `active` set's claim age to
//! reconcile this.

use std::marker::PhantomData;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use publisher_contracts::PublisherError;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::retry::RetryPolicy;
use crate::state::JobState;
use crate::JobQueue;

pub struct RedisJobQueue<P> {
    conn: ConnectionManager,
    key_prefix: String,
    retry_policy: RetryPolicy,
    _payload: PhantomData<fn() -> P>,
}

impl<P> RedisJobQueue<P> {
    pub fn new(conn: ConnectionManager) -> Self {
        Self::with_prefix(conn, "publisher:queue")
    }

    pub fn with_prefix(conn: ConnectionManager, key_prefix: impl Into<String>) -> Self {
        Self {
            conn,
            key_prefix: key_prefix.into(),
            retry_policy: RetryPolicy::default(),
            _payload: PhantomData,
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    fn due_key(&self) -> String {
        format!("{}:due", self.key_prefix)
    }

    fn active_key(&self) -> String {
        format!("{}:active", self.key_prefix)
    }

    fn payload_key(&self, job_id: &str) -> String {
        format!("{}:payload:{job_id}", self.key_prefix)
    }

    fn attempts_key(&self, job_id: &str) -> String {
        format!("{}:attempts:{job_id}", self.key_prefix)
    }

    fn terminal_key(&self, job_id: &str) -> String {
        format!("{}:terminal:{job_id}", self.key_prefix)
    }

    fn map_err(err: redis::RedisError) -> PublisherError {
        PublisherError::transient_io(err.to_string())
    }
}

#[async_trait]
impl<P> JobQueue<P> for RedisJobQueue<P>
where
    P: Clone + Send + Sync + Serialize + DeserializeOwned,
{
    async fn schedule(
        &self,
        job_id: String,
        payload: P,
        fire_at: DateTime<Utc>,
    ) -> Result<(), PublisherError> {
        let payload_json = serde_json::to_string(&payload)
            .map_err(|e| PublisherError::transient_io(e.to_string()))?;
        let score = fire_at.timestamp_millis() as f64;
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .set(self.payload_key(&job_id), payload_json)
            .ignore()
            .zadd(self.due_key(), &job_id, score)
            .ignore()
            .del(self.terminal_key(&job_id))
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(Self::map_err)
    }

    async fn publish_now(&self, job_id: String, payload: P) -> Result<(), PublisherError> {
        let mut conn = self.conn.clone();
        let is_active: bool = conn
            .sismember(self.active_key(), &job_id)
            .await
            .map_err(Self::map_err)?;
        if is_active {
            return Err(PublisherError::JobBusy { job_id });
        }
        self.schedule(job_id, payload, Utc::now()).await
    }

    async fn cancel(&self, job_id: &str) -> Result<(), PublisherError> {
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .zrem(self.due_key(), job_id)
            .ignore()
            .srem(self.active_key(), job_id)
            .ignore()
            .del(self.payload_key(job_id))
            .ignore()
            .del(self.attempts_key(job_id))
            .ignore()
            .del(self.terminal_key(job_id))
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(Self::map_err)
    }

    async fn get_state(&self, job_id: &str) -> Result<JobState, PublisherError> {
        let mut conn = self.conn.clone();

        let is_active: bool = conn
            .sismember(self.active_key(), job_id)
            .await
            .map_err(Self::map_err)?;
        if is_active {
            return Ok(JobState::Active);
        }

        let terminal: Option<String> = conn
            .get(self.terminal_key(job_id))
            .await
            .map_err(Self::map_err)?;
        match terminal.as_deref() {
            Some("completed") => return Ok(JobState::Completed),
            Some("failed") => return Ok(JobState::Failed),
            _ => {}
        }

        let score: Option<f64> = conn
            .zscore(self.due_key(), job_id)
            .await
            .map_err(Self::map_err)?;
        match score {
            Some(score) if score <= Utc::now().timestamp_millis() as f64 => Ok(JobState::Waiting),
            Some(_) => Ok(JobState::Delayed),
            None => Ok(JobState::Absent),
        }
    }

    async fn claim_ready(&self, now: DateTime<Utc>) -> Result<Vec<(String, P)>, PublisherError> {
        let mut conn = self.conn.clone();
        let due_ids: Vec<String> = conn
            .zrangebyscore(self.due_key(), "-inf", now.timestamp_millis())
            .await
            .map_err(Self::map_err)?;

        let mut claimed = Vec::with_capacity(due_ids.len());
        for job_id in due_ids {
            let payload_json: Option<String> = conn
                .get(self.payload_key(&job_id))
                .await
                .map_err(Self::map_err)?;
            let Some(payload_json) = payload_json else {
                // Payload expired or was never set; drop the orphaned due entry.
                let _: () = conn.zrem(self.due_key(), &job_id).await.map_err(Self::map_err)?;
                continue;
            };
            let payload: P = serde_json::from_str(&payload_json)
                .map_err(|e| PublisherError::transient_io(e.to_string()))?;

            redis::pipe()
                .atomic()
                .zrem(self.due_key(), &job_id)
                .ignore()
                .sadd(self.active_key(), &job_id)
                .ignore()
                .incr(self.attempts_key(&job_id), 1)
                .ignore()
                .query_async::<_, ()>(&mut conn)
                .await
                .map_err(Self::map_err)?;

            claimed.push((job_id, payload));
        }
        Ok(claimed)
    }

    async fn complete(&self, job_id: &str) -> Result<(), PublisherError> {
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .srem(self.active_key(), job_id)
            .ignore()
            .set(self.terminal_key(job_id), "completed")
            .ignore()
            .del(self.payload_key(job_id))
            .ignore()
            .del(self.attempts_key(job_id))
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(Self::map_err)
    }

    async fn fail(
        &self,
        job_id: &str,
        error: &PublisherError,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, PublisherError> {
        let mut conn = self.conn.clone();
        let attempts: Option<u32> = conn
            .get(self.attempts_key(job_id))
            .await
            .map_err(Self::map_err)?;
        let attempts = attempts.unwrap_or(0);

        if self.retry_policy.should_retry(error, attempts) {
            let delay = self.retry_policy.backoff_for_attempt(attempts);
            let next_fire_at = now + chrono::Duration::from_std(delay).unwrap_or_default();
            redis::pipe()
                .atomic()
                .srem(self.active_key(), job_id)
                .ignore()
                .zadd(self.due_key(), job_id, next_fire_at.timestamp_millis() as f64)
                .ignore()
                .query_async::<_, ()>(&mut conn)
                .await
                .map_err(Self::map_err)?;
            Ok(Some(next_fire_at))
        } else {
            redis::pipe()
                .atomic()
                .srem(self.active_key(), job_id)
                .ignore()
                .set(self.terminal_key(job_id), "failed")
                .ignore()
                .del(self.payload_key(job_id))
                .ignore()
                .query_async::<_, ()>(&mut conn)
                .await
                .map_err(Self::map_err)?;
            Ok(None)
        }
    }
}

/// Helper for turning a unix-millis timestamp back into a `DateTime<Utc>`,
/// used only in tests that stub Redis responses by hand.
#[cfg(test)]
#[allow(dead_code)]
fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().expect("valid timestamp")
}
