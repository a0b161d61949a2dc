//! Stuck-job recovery (C9): periodically reconciles drafts left in
//! `publishing` because the worker that claimed their job crashed, or the
//! queue lost track of the claim (spec.md §4.9).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use publisher_contracts::model::{DraftStatus, PublishJobPayload};
use publisher_contracts::ports::{AlertSink, Clock, Persistence};
use publisher_contracts::PublisherError;
use publisher_queue::{JobQueue, JobState};

/// Default age a `publishing` draft must reach, with no queue activity,
/// before it is considered stuck.
pub const DEFAULT_STUCK_AFTER: chrono::Duration = chrono::Duration::minutes(15);

/// Number of drafts recovered in a single pass above which an alert fires —
/// a high recovery rate usually means the worker pool itself is unhealthy,
/// not that a few jobs got unlucky.
pub const DEFAULT_ALERT_THRESHOLD: usize = 5;

pub struct StuckJobRecovery<Q: JobQueue<PublishJobPayload>> {
    persistence: Arc<dyn Persistence>,
    queue: Arc<Q>,
    alerts: Arc<dyn AlertSink>,
    clock: Arc<dyn Clock>,
    stuck_after: chrono::Duration,
    alert_threshold: usize,
}

impl<Q: JobQueue<PublishJobPayload>> StuckJobRecovery<Q> {
    pub fn new(
        persistence: Arc<dyn Persistence>,
        queue: Arc<Q>,
        alerts: Arc<dyn AlertSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            persistence,
            queue,
            alerts,
            clock,
            stuck_after: DEFAULT_STUCK_AFTER,
            alert_threshold: DEFAULT_ALERT_THRESHOLD,
        }
    }

    pub fn with_stuck_after(mut self, d: chrono::Duration) -> Self {
        self.stuck_after = d;
        self
    }

    pub fn with_alert_threshold(mut self, n: usize) -> Self {
        self.alert_threshold = n;
        self
    }

    /// Runs one recovery pass, returning the number of drafts reconciled.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
    pub async fn run_once(&self) -> usize {
        let now = self.clock.now();
        let threshold = now - self.stuck_after;

        let stuck = match self.persistence.list_stuck_publishing_drafts(threshold).await {
            Ok(drafts) => drafts,
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::error!(error = %_err, "failed to list stuck publishing drafts");
                return 0;
            }
        };

        let mut recovered = 0usize;
        for draft in &stuck {
            match self.recover_one(draft.id, draft.user_id, draft.upload_mode, now).await {
                Ok(true) => recovered += 1,
                Ok(false) => {}
                Err(_err) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!(draft_id = %draft.id, error = %_err, "failed to recover stuck draft");
                }
            }
        }

        if recovered >= self.alert_threshold {
            self.alerts
                .notify(
                    "stuck-job recovery rate high",
                    &format!("recovered {recovered} of {} stuck drafts this pass", stuck.len()),
                )
                .await;
        }

        recovered
    }

    async fn recover_one(
        &self,
        draft_id: uuid::Uuid,
        user_id: uuid::Uuid,
        upload_mode: publisher_contracts::model::UploadMode,
        now: DateTime<Utc>,
    ) -> Result<bool, PublisherError> {
        let job_id = PublishJobPayload::job_id(draft_id);
        let state = self.queue.get_state(&job_id).await?;

        match state {
            JobState::Absent => {
                let draft = self.persistence.get_draft(draft_id).await?;
                let Some(draft) = draft else { return Ok(false) };
                let applied = self
                    .persistence
                    .update_draft_if_version_matches(
                        draft_id,
                        draft.execution_version,
                        Box::new(|d| {
                            d.status = DraftStatus::Scheduled;
                            d.error_message = Some("recovered: job missing from queue".into());
                        }),
                    )
                    .await?;
                if applied {
                    let payload = PublishJobPayload {
                        draft_id,
                        user_id,
                        upload_mode,
                    };
                    // Best-effort re-enqueue; a failure here still leaves
                    // the draft in `scheduled`, where the next scheduler
                    // tick or a future recovery pass can pick it up again.
                    let _ = self.queue.schedule(job_id, payload, now).await;
                }
                Ok(applied)
            }
            JobState::Failed => {
                let draft = self.persistence.get_draft(draft_id).await?;
                let Some(draft) = draft else { return Ok(false) };
                self.persistence
                    .update_draft_if_version_matches(
                        draft_id,
                        draft.execution_version,
                        Box::new(|d| {
                            d.status = DraftStatus::Failed;
                            d.error_message = Some("stuck in publishing; retries exhausted".into());
                        }),
                    )
                    .await
            }
            JobState::Waiting | JobState::Delayed | JobState::Active | JobState::Completed => Ok(false),
        }
    }
}
