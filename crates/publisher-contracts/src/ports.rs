//! Collaborator seams (C10): trait boundaries the rest of the application is
//! built against, plus in-memory test doubles so the scheduler/executor test
//! suites never need a real database, blob store, or alert sink.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::PublisherError;
use crate::model::{Automation, Draft, DraftStatus, ExecutionLog, User};

/// Durable storage for users, drafts, automations, and execution logs.
///
/// Implementations must provide serializable isolation for the
/// compare-and-set update methods (`update_draft_if_version_matches`,
/// `try_acquire_automation_lock`) since the scheduler and executor rely on
/// them for optimistic concurrency.
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, PublisherError>;
    async fn save_user(&self, user: &User) -> Result<(), PublisherError>;

    async fn get_draft(&self, draft_id: Uuid) -> Result<Option<Draft>, PublisherError>;

    /// Applies `update` to the stored draft iff its current
    /// `execution_version` equals `expected_version`, incrementing the
    /// version on success. Returns `false` on a version mismatch (the caller
    /// should treat this as a lost race, not an error).
    async fn update_draft_if_version_matches(
        &self,
        draft_id: Uuid,
        expected_version: i64,
        update: Box<dyn FnOnce(&mut Draft) + Send>,
    ) -> Result<bool, PublisherError>;

    async fn list_eligible_drafts(
        &self,
        automation_id: Uuid,
    ) -> Result<Vec<Draft>, PublisherError>;

    /// Candidate pool for the scheduling engine: `{status=draft,
    /// scheduled_at=null, files non-empty}` owned by `user_id`. Ordering is
    /// the scheduler's responsibility (`draft_selection_method`), not this
    /// method's.
    async fn list_schedulable_drafts(&self, user_id: Uuid) -> Result<Vec<Draft>, PublisherError>;

    /// Drafts stuck in `publishing` whose `updated_at` is older than
    /// `older_than`, across all users — the candidate pool for stuck-job
    /// recovery (C9).
    async fn list_stuck_publishing_drafts(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<Draft>, PublisherError>;

    /// Most recent [`ExecutionLog`] entry for `automation_id`, if any —
    /// consulted by the `fixed_interval` rule to find the last fire time.
    async fn last_execution_log(
        &self,
        automation_id: Uuid,
    ) -> Result<Option<ExecutionLog>, PublisherError>;

    async fn get_automation(&self, automation_id: Uuid)
        -> Result<Option<Automation>, PublisherError>;
    async fn list_enabled_automations(&self) -> Result<Vec<Automation>, PublisherError>;

    /// Attempts to take the per-automation execution lease. Succeeds if the
    /// automation is not currently executing, or its lease is older than
    /// `stale_after`. Returns `false` if another worker holds a fresh lease.
    async fn try_acquire_automation_lock(
        &self,
        automation_id: Uuid,
        now: DateTime<Utc>,
        stale_after: chrono::Duration,
    ) -> Result<bool, PublisherError>;

    async fn release_automation_lock(&self, automation_id: Uuid) -> Result<(), PublisherError>;

    async fn append_execution_log(&self, log: ExecutionLog) -> Result<(), PublisherError>;

    async fn count_published_today(
        &self,
        automation_id: Uuid,
        day_start: DateTime<Utc>,
        day_end: DateTime<Utc>,
    ) -> Result<u32, PublisherError>;
}

/// Retrieval of draft file bytes for upload.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn fetch(&self, blob_key: &str) -> Result<Vec<u8>, PublisherError>;
}

/// Out-of-band notification sink for terminal failures (REAUTH_REQUIRED,
/// stuck-job recovery, draft-failed events). Formatting and delivery channel
/// selection live entirely on the implementer's side of this trait.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn notify(&self, subject: &str, detail: &str);
}

/// Injected time source, so scheduling-rule evaluation and token-expiry
/// classification are deterministic in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Production [`Clock`] backed by the system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Test [`Clock`] that returns a fixed, externally advanceable instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<std::sync::Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(std::sync::Mutex::new(start)),
        }
    }

    pub fn advance(&self, delta: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now += delta;
    }

    pub fn set(&self, value: DateTime<Utc>) {
        *self.now.lock().unwrap() = value;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

#[derive(Default)]
struct InMemoryState {
    users: HashMap<Uuid, User>,
    drafts: HashMap<Uuid, Draft>,
    automations: HashMap<Uuid, Automation>,
    execution_logs: Vec<ExecutionLog>,
    locks: HashMap<Uuid, DateTime<Utc>>,
}

/// `HashMap`-backed [`Persistence`] test double. A single `tokio::sync::Mutex`
/// guards all state, which is sufficient to simulate serializable isolation
/// for the compare-and-set operations under test.
#[derive(Default)]
pub struct InMemoryPersistence {
    state: Mutex<InMemoryState>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_user(&self, user: User) {
        self.state.lock().await.users.insert(user.id, user);
    }

    pub async fn seed_draft(&self, draft: Draft) {
        self.state.lock().await.drafts.insert(draft.id, draft);
    }

    pub async fn seed_automation(&self, automation: Automation) {
        self.state
            .lock()
            .await
            .automations
            .insert(automation.id, automation);
    }
}

#[async_trait]
impl Persistence for InMemoryPersistence {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, PublisherError> {
        Ok(self.state.lock().await.users.get(&user_id).cloned())
    }

    async fn save_user(&self, user: &User) -> Result<(), PublisherError> {
        self.state.lock().await.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_draft(&self, draft_id: Uuid) -> Result<Option<Draft>, PublisherError> {
        Ok(self.state.lock().await.drafts.get(&draft_id).cloned())
    }

    async fn update_draft_if_version_matches(
        &self,
        draft_id: Uuid,
        expected_version: i64,
        update: Box<dyn FnOnce(&mut Draft) + Send>,
    ) -> Result<bool, PublisherError> {
        let mut state = self.state.lock().await;
        match state.drafts.get_mut(&draft_id) {
            Some(draft) if draft.execution_version == expected_version => {
                update(draft);
                draft.execution_version += 1;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Ok(false),
        }
    }

    async fn list_eligible_drafts(
        &self,
        automation_id: Uuid,
    ) -> Result<Vec<Draft>, PublisherError> {
        let state = self.state.lock().await;
        let Some(automation) = state.automations.get(&automation_id) else {
            return Ok(vec![]);
        };
        Ok(state
            .drafts
            .values()
            .filter(|d| d.user_id == automation.user_id && d.is_eligible_for_publish())
            .cloned()
            .collect())
    }

    async fn list_schedulable_drafts(&self, user_id: Uuid) -> Result<Vec<Draft>, PublisherError> {
        let state = self.state.lock().await;
        Ok(state
            .drafts
            .values()
            .filter(|d| {
                d.user_id == user_id
                    && d.status == DraftStatus::Draft
                    && d.scheduled_at.is_none()
                    && !d.files.is_empty()
            })
            .cloned()
            .collect())
    }

    async fn list_stuck_publishing_drafts(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<Draft>, PublisherError> {
        let state = self.state.lock().await;
        Ok(state
            .drafts
            .values()
            .filter(|d| d.status == DraftStatus::Publishing && d.updated_at < older_than)
            .cloned()
            .collect())
    }

    async fn last_execution_log(
        &self,
        automation_id: Uuid,
    ) -> Result<Option<ExecutionLog>, PublisherError> {
        let state = self.state.lock().await;
        Ok(state
            .execution_logs
            .iter()
            .filter(|log| log.automation_id == automation_id)
            .max_by_key(|log| log.executed_at)
            .cloned())
    }

    async fn get_automation(
        &self,
        automation_id: Uuid,
    ) -> Result<Option<Automation>, PublisherError> {
        Ok(self
            .state
            .lock()
            .await
            .automations
            .get(&automation_id)
            .cloned())
    }

    async fn list_enabled_automations(&self) -> Result<Vec<Automation>, PublisherError> {
        Ok(self
            .state
            .lock()
            .await
            .automations
            .values()
            .filter(|a| a.enabled)
            .cloned()
            .collect())
    }

    async fn try_acquire_automation_lock(
        &self,
        automation_id: Uuid,
        now: DateTime<Utc>,
        stale_after: chrono::Duration,
    ) -> Result<bool, PublisherError> {
        let mut state = self.state.lock().await;
        if let Some(held_since) = state.locks.get(&automation_id) {
            if now - *held_since < stale_after {
                return Ok(false);
            }
        }
        state.locks.insert(automation_id, now);
        Ok(true)
    }

    async fn release_automation_lock(&self, automation_id: Uuid) -> Result<(), PublisherError> {
        self.state.lock().await.locks.remove(&automation_id);
        Ok(())
    }

    async fn append_execution_log(&self, log: ExecutionLog) -> Result<(), PublisherError> {
        self.state.lock().await.execution_logs.push(log);
        Ok(())
    }

    async fn count_published_today(
        &self,
        automation_id: Uuid,
        day_start: DateTime<Utc>,
        day_end: DateTime<Utc>,
    ) -> Result<u32, PublisherError> {
        let state = self.state.lock().await;
        Ok(state
            .execution_logs
            .iter()
            .filter(|log| {
                log.automation_id == automation_id
                    && log.executed_at >= day_start
                    && log.executed_at < day_end
            })
            .map(|log| log.scheduled_count)
            .sum())
    }
}

/// In-memory [`BlobStore`] test double, seeded directly by tests.
#[derive(Default)]
pub struct InMemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, key: impl Into<String>, bytes: Vec<u8>) {
        self.blobs.lock().await.insert(key.into(), bytes);
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn fetch(&self, blob_key: &str) -> Result<Vec<u8>, PublisherError> {
        self.blobs
            .lock()
            .await
            .get(blob_key)
            .cloned()
            .ok_or_else(|| PublisherError::validation(format!("no such blob: {blob_key}")))
    }
}

/// [`AlertSink`] test double that records every notification for assertions.
#[derive(Default)]
pub struct RecordingAlertSink {
    pub notifications: Mutex<Vec<(String, String)>>,
}

impl RecordingAlertSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AlertSink for RecordingAlertSink {
    async fn notify(&self, subject: &str, detail: &str) {
        self.notifications
            .lock()
            .await
            .push((subject.to_string(), detail.to_string()));
    }
}
