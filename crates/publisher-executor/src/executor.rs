use std::sync::Arc;
use std::time::Duration;

use publisher_circuitbreaker::{with_breaker, CircuitBreakerRegistry};
use publisher_contracts::model::{Draft, DraftFile, DraftStatus, MaturityLevel, UploadMode};
use publisher_contracts::ports::{AlertSink, BlobStore, Clock, Persistence};
use publisher_contracts::PublisherError;
use publisher_ratelimiter::RateLimiterRegistry;
use publisher_tokens::TokenManager;
use uuid::Uuid;

use crate::http_client::{StashPublishRequest, UpstreamClient};

/// Real wall-clock delay inserted between files when `upload_mode = multiple`.
const DEFAULT_INTER_FILE_DELAY: (Duration, Duration) = (Duration::from_secs(3), Duration::from_secs(4));

/// Hard per-call read timeout for upstream HTTP calls.
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

fn maturity_level_param(level: MaturityLevel) -> String {
    match level {
        MaturityLevel::Moderate => "moderate".to_string(),
        MaturityLevel::Strict => "strict".to_string(),
    }
}

/// Drives a single draft through stash-upload and publish (C6). One call to
/// [`PublishExecutor::run`] corresponds to one publish job claimed off C7.
pub struct PublishExecutor {
    persistence: Arc<dyn Persistence>,
    blob_store: Arc<dyn BlobStore>,
    alerts: Arc<dyn AlertSink>,
    clock: Arc<dyn Clock>,
    token_manager: Arc<TokenManager>,
    breaker: Arc<CircuitBreakerRegistry>,
    limiter: Arc<RateLimiterRegistry>,
    upstream: Arc<dyn UpstreamClient>,
    inter_file_delay: (Duration, Duration),
    call_timeout: Duration,
}

impl PublishExecutor {
    pub fn new(
        persistence: Arc<dyn Persistence>,
        blob_store: Arc<dyn BlobStore>,
        alerts: Arc<dyn AlertSink>,
        clock: Arc<dyn Clock>,
        token_manager: Arc<TokenManager>,
        breaker: Arc<CircuitBreakerRegistry>,
        limiter: Arc<RateLimiterRegistry>,
        upstream: Arc<dyn UpstreamClient>,
    ) -> Self {
        Self {
            persistence,
            blob_store,
            alerts,
            clock,
            token_manager,
            breaker,
            limiter,
            upstream,
            inter_file_delay: DEFAULT_INTER_FILE_DELAY,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Overrides the real wall-clock inter-file delay and call timeout, for
    /// tests that would otherwise spend seconds sleeping.
    pub fn with_timing(mut self, inter_file_delay: (Duration, Duration), call_timeout: Duration) -> Self {
        self.inter_file_delay = inter_file_delay;
        self.call_timeout = call_timeout;
        self
    }

    fn breaker_key(user_id: Uuid) -> String {
        format!("publish:{user_id}")
    }

    /// Runs the full stash-upload-then-publish algorithm for one draft.
    ///
    /// `Ok(())` means the job is done, whether the outcome was a successful
    /// publish or a terminal draft failure already recorded and alerted.
    /// `Err(e)` where `e.retryable()` means the caller should requeue the job
    /// through C7's backoff; the draft is deliberately left in `publishing`
    /// so stuck-job recovery (C9) can reconcile it if retries never land.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self), fields(%draft_id, %user_id)))]
    pub async fn run(&self, draft_id: Uuid, user_id: Uuid) -> Result<(), PublisherError> {
        let draft = self
            .persistence
            .get_draft(draft_id)
            .await?
            .ok_or_else(|| PublisherError::validation("draft not found"))?;
        if draft.user_id != user_id {
            return Err(PublisherError::validation("draft does not belong to user"));
        }
        if !draft.is_eligible_for_publish() {
            return Err(PublisherError::validation("draft is not eligible for publish"));
        }

        if draft.status != DraftStatus::Publishing {
            let transitioned = self
                .cas_update(draft_id, draft.execution_version, |d| {
                    d.status = DraftStatus::Publishing;
                })
                .await?;
            if !transitioned {
                return Ok(());
            }
        }

        let access_token = match self.token_manager.ensure_valid_token(user_id).await {
            Ok(token) => token,
            Err(PublisherError::ReauthRequired { user_id }) => {
                self.mark_failed(draft_id, "reauthentication required").await?;
                self.alerts
                    .notify(
                        "publish.reauth_required",
                        &format!("user {user_id} requires reauthentication"),
                    )
                    .await;
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        let breaker_key = Self::breaker_key(user_id);

        let mut stash_item_id = draft.stash_item_id.clone();
        if stash_item_id.is_none() {
            let ordered_files: Vec<DraftFile> = draft.files_in_order().into_iter().cloned().collect();
            let upload_files: Vec<DraftFile> = match draft.upload_mode {
                UploadMode::Single => ordered_files.into_iter().take(1).collect(),
                UploadMode::Multiple => ordered_files,
            };

            for (index, file) in upload_files.iter().enumerate() {
                if index > 0 {
                    tokio::time::sleep(self.random_inter_file_delay()).await;
                }

                let bytes = self.blob_store.fetch(&file.blob_key).await?;
                let title = Some(draft.title.as_str()).filter(|t| !t.is_empty());
                let description = Some(draft.description.as_str()).filter(|t| !t.is_empty());
                let mime = file.mime.clone();
                let blob_key = file.blob_key.clone();
                let upstream = Arc::clone(&self.upstream);
                let access_token_owned = access_token.clone();
                let call_timeout = self.call_timeout;
                let title_owned = title.map(|t| t.to_string());
                let description_owned = description.map(|t| t.to_string());
                let limiter = Arc::clone(&self.limiter);
                let acquire_key = breaker_key.clone();

                let result = with_breaker(
                    &self.breaker,
                    &breaker_key,
                    async move {
                        limiter.acquire(&acquire_key).await;
                        tokio::time::timeout(
                            call_timeout,
                            upstream.stash_submit(
                                &access_token_owned,
                                bytes,
                                &blob_key,
                                &mime,
                                title_owned.as_deref(),
                                description_owned.as_deref(),
                            ),
                        )
                        .await
                        .unwrap_or_else(|_| Err(PublisherError::transient_io("stash/submit timed out")))
                    },
                    |r| matches!(r, Err(PublisherError::RateLimited { .. })),
                )
                .await;

                match result {
                    Ok(submit) => {
                        self.limiter.on_success(&breaker_key);
                        stash_item_id = Some(submit.stash_item_id.clone());
                        self.cas_update(draft_id, self.current_version(draft_id).await?, {
                            let stash_item_id = submit.stash_item_id.clone();
                            move |d| d.stash_item_id = Some(stash_item_id)
                        })
                        .await?;
                    }
                    Err(err) => {
                        self.apply_rate_limit_feedback(&breaker_key, &err);
                        return self.finish_with_error(draft_id, err).await;
                    }
                }
            }
        }

        let Some(stash_item_id) = stash_item_id else {
            return Err(PublisherError::transient_io("missing stash_item_id after upload"));
        };

        let is_dirty = !draft.tags.is_empty() || !draft.gallery_ids.is_empty();
        let request = StashPublishRequest {
            stash_item_id,
            title: draft.title.clone(),
            description: draft.description.clone(),
            tags: draft.tags.clone(),
            gallery_ids: draft.gallery_ids.clone(),
            is_mature: draft.is_mature,
            maturity_level: draft.maturity_level.map(maturity_level_param),
            display_resolution: draft.display_resolution,
            add_watermark: draft.add_watermark,
            allow_free_download: draft.allow_free_download,
            is_dirty,
        };

        let upstream = Arc::clone(&self.upstream);
        let access_token_owned = access_token.clone();
        let call_timeout = self.call_timeout;
        let limiter = Arc::clone(&self.limiter);
        let acquire_key = breaker_key.clone();
        let result = with_breaker(
            &self.breaker,
            &breaker_key,
            async move {
                limiter.acquire(&acquire_key).await;
                tokio::time::timeout(call_timeout, upstream.stash_publish(&access_token_owned, request))
                    .await
                    .unwrap_or_else(|_| Err(PublisherError::transient_io("stash/publish timed out")))
            },
            |r| matches!(r, Err(PublisherError::RateLimited { .. })),
        )
        .await;

        match result {
            Ok(published) => {
                self.limiter.on_success(&breaker_key);
                let url = published
                    .url
                    .unwrap_or_else(|| format!("https://www.deviantart.com/deviation/{}", published.deviation_id));
                let deviation_id = published.deviation_id;
                let now = self.clock.now();
                self.cas_update(draft_id, self.current_version(draft_id).await?, move |d| {
                    d.status = DraftStatus::Published;
                    d.deviantart_deviation_id = Some(deviation_id);
                    d.deviantart_url = Some(url);
                    d.actual_publish_at = Some(now);
                    d.error_message = None;
                })
                .await?;
                Ok(())
            }
            Err(err) => {
                self.apply_rate_limit_feedback(&breaker_key, &err);
                self.finish_with_error(draft_id, err).await
            }
        }
    }

    fn random_inter_file_delay(&self) -> Duration {
        let (min, max) = self.inter_file_delay;
        if max <= min {
            return min;
        }
        let span_ms = (max - min).as_millis() as u64;
        let offset_ms = rand::random::<u64>() % span_ms.max(1);
        min + Duration::from_millis(offset_ms)
    }

    fn apply_rate_limit_feedback(&self, key: &str, err: &PublisherError) {
        if let PublisherError::RateLimited { retry_after, .. } = err {
            self.limiter.on_failure(key, *retry_after);
        }
    }

    /// Routes an upstream-call failure: retryable errors propagate for C7 to
    /// requeue; everything else is recorded as a terminal draft failure.
    async fn finish_with_error(&self, draft_id: Uuid, err: PublisherError) -> Result<(), PublisherError> {
        if err.retryable() {
            return Err(err);
        }
        self.mark_failed(draft_id, &err.to_string()).await?;
        Ok(())
    }

    async fn current_version(&self, draft_id: Uuid) -> Result<i64, PublisherError> {
        Ok(self
            .persistence
            .get_draft(draft_id)
            .await?
            .map(|d| d.execution_version)
            .unwrap_or_default())
    }

    async fn cas_update(
        &self,
        draft_id: Uuid,
        expected_version: i64,
        update: impl FnOnce(&mut Draft) + Send + 'static,
    ) -> Result<bool, PublisherError> {
        self.persistence
            .update_draft_if_version_matches(draft_id, expected_version, Box::new(update))
            .await
    }

    async fn mark_failed(&self, draft_id: Uuid, message: &str) -> Result<(), PublisherError> {
        let version = self.current_version(draft_id).await?;
        let message = message.to_string();
        self.cas_update(draft_id, version, move |d| {
            d.status = DraftStatus::Failed;
            d.error_message = Some(message);
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use chrono::Utc;
    use publisher_circuitbreaker::CircuitBreakerConfig;
    use publisher_contracts::model::{DraftFile, MaturityLevel, User};
    use publisher_contracts::ports::{
        Clock, InMemoryBlobStore, InMemoryPersistence, ManualClock, Persistence, RecordingAlertSink,
    };
    use publisher_ratelimiter::RateLimiterConfig;
    use publisher_tokens::{OAuthClient, OAuthRefreshFailure, RefreshedTokens};

    use super::*;
    use crate::http_client::{StashPublishResult, StashSubmitResult};

    struct UnreachableOAuthClient;

    #[async_trait]
    impl OAuthClient for UnreachableOAuthClient {
        async fn refresh(&self, _refresh_token: &str) -> Result<RefreshedTokens, OAuthRefreshFailure> {
            panic!("token refresh should not be needed in this test");
        }
    }

    #[derive(Default)]
    struct StubUpstream {
        submit: StdMutex<Option<Result<StashSubmitResult, PublisherError>>>,
        publish: StdMutex<Option<Result<StashPublishResult, PublisherError>>>,
    }

    #[async_trait]
    impl UpstreamClient for StubUpstream {
        async fn stash_submit(
            &self,
            _access_token: &str,
            _file_bytes: Vec<u8>,
            _file_name: &str,
            _mime: &str,
            _title: Option<&str>,
            _artist_comments: Option<&str>,
        ) -> Result<StashSubmitResult, PublisherError> {
            self.submit
                .lock()
                .unwrap()
                .take()
                .expect("test did not configure a stash_submit response")
        }

        async fn stash_publish(
            &self,
            _access_token: &str,
            _request: StashPublishRequest,
        ) -> Result<StashPublishResult, PublisherError> {
            self.publish
                .lock()
                .unwrap()
                .take()
                .expect("test did not configure a stash_publish response")
        }
    }

    fn user(id: Uuid) -> User {
        let now = Utc::now();
        User {
            id,
            access_token: Some("valid-token".into()),
            refresh_token: Some("refresh-token".into()),
            token_expires_at: Some(now + chrono::Duration::hours(1)),
            refresh_token_expires_at: Some(now + chrono::Duration::days(30)),
            timezone: "UTC".into(),
            requires_reauth: false,
            reauth_email_sent: false,
        }
    }

    fn draft(id: Uuid, user_id: Uuid) -> Draft {
        let now = Utc::now();
        Draft {
            id,
            user_id,
            title: "My artwork".into(),
            description: "a description".into(),
            tags: vec!["sci-fi".into(), "digital art".into()],
            gallery_ids: vec!["gallery-1".into()],
            category_path: "/art".into(),
            is_mature: false,
            maturity_level: Some(MaturityLevel::Moderate),
            is_dirty: false,
            allow_free_download: false,
            add_watermark: false,
            display_resolution: None,
            upload_mode: UploadMode::Single,
            status: DraftStatus::Scheduled,
            files: vec![DraftFile {
                id: Uuid::new_v4(),
                draft_id: id,
                blob_key: "blob-1".into(),
                mime: "image/png".into(),
                size_bytes: 1024,
                sort_order: 0,
            }],
            execution_version: 0,
            stash_item_id: None,
            scheduled_at: Some(now),
            jitter_seconds: Some(0),
            actual_publish_at: None,
            deviantart_deviation_id: None,
            deviantart_url: None,
            error_message: None,
            updated_at: now,
            created_at: now,
        }
    }

    fn executor(
        persistence: Arc<InMemoryPersistence>,
        blob_store: Arc<InMemoryBlobStore>,
        alerts: Arc<RecordingAlertSink>,
        clock: Arc<ManualClock>,
        upstream: Arc<StubUpstream>,
    ) -> PublishExecutor {
        let token_manager = Arc::new(TokenManager::new(
            Arc::new(UnreachableOAuthClient),
            persistence.clone(),
            alerts.clone(),
            clock.clone() as Arc<dyn Clock>,
        ));
        let breaker = Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig::default()));
        let limiter = Arc::new(RateLimiterRegistry::new(
            RateLimiterConfig::builder()
                .base_delay_ms(1)
                .max_delay_ms(5)
                .jitter_percent(0.0)
                .build(),
        ));
        PublishExecutor::new(
            persistence,
            blob_store,
            alerts,
            clock,
            token_manager,
            breaker,
            limiter,
            upstream,
        )
        .with_timing((Duration::from_millis(1), Duration::from_millis(2)), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn successful_publish_records_deviation_id_and_default_url() {
        let persistence = Arc::new(InMemoryPersistence::new());
        let blob_store = Arc::new(InMemoryBlobStore::new());
        let alerts = Arc::new(RecordingAlertSink::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let upstream = Arc::new(StubUpstream::default());
        *upstream.submit.lock().unwrap() = Some(Ok(StashSubmitResult {
            stash_item_id: "item-1".into(),
        }));
        *upstream.publish.lock().unwrap() = Some(Ok(StashPublishResult {
            deviation_id: "dev-1".into(),
            url: None,
        }));

        let user_id = Uuid::new_v4();
        let draft_id = Uuid::new_v4();
        persistence.seed_user(user(user_id)).await;
        persistence.seed_draft(draft(draft_id, user_id)).await;
        blob_store.put("blob-1", vec![1, 2, 3]).await;

        let exec = executor(persistence.clone(), blob_store, alerts, clock, upstream);
        exec.run(draft_id, user_id).await.unwrap();

        let updated = persistence.get_draft(draft_id).await.unwrap().unwrap();
        assert_eq!(updated.status, DraftStatus::Published);
        assert_eq!(updated.deviantart_deviation_id.as_deref(), Some("dev-1"));
        assert_eq!(
            updated.deviantart_url.as_deref(),
            Some("https://www.deviantart.com/deviation/dev-1")
        );
        assert_eq!(updated.stash_item_id.as_deref(), Some("item-1"));
    }

    #[tokio::test]
    async fn reauth_required_marks_draft_failed_and_alerts() {
        let persistence = Arc::new(InMemoryPersistence::new());
        let blob_store = Arc::new(InMemoryBlobStore::new());
        let alerts = Arc::new(RecordingAlertSink::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let upstream = Arc::new(StubUpstream::default());

        let user_id = Uuid::new_v4();
        let draft_id = Uuid::new_v4();
        let mut reauth_user = user(user_id);
        reauth_user.requires_reauth = true;
        persistence.seed_user(reauth_user).await;
        persistence.seed_draft(draft(draft_id, user_id)).await;

        let exec = executor(persistence.clone(), blob_store, alerts.clone(), clock, upstream);
        exec.run(draft_id, user_id).await.unwrap();

        let updated = persistence.get_draft(draft_id).await.unwrap().unwrap();
        assert_eq!(updated.status, DraftStatus::Failed);
        assert_eq!(alerts.notifications.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn retryable_stash_submit_error_propagates_and_leaves_draft_publishing() {
        let persistence = Arc::new(InMemoryPersistence::new());
        let blob_store = Arc::new(InMemoryBlobStore::new());
        let alerts = Arc::new(RecordingAlertSink::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let upstream = Arc::new(StubUpstream::default());
        *upstream.submit.lock().unwrap() = Some(Err(PublisherError::ServerError { status: 503 }));

        let user_id = Uuid::new_v4();
        let draft_id = Uuid::new_v4();
        persistence.seed_user(user(user_id)).await;
        persistence.seed_draft(draft(draft_id, user_id)).await;
        blob_store.put("blob-1", vec![1, 2, 3]).await;

        let exec = executor(persistence.clone(), blob_store, alerts, clock, upstream);
        let err = exec.run(draft_id, user_id).await.unwrap_err();
        assert!(err.retryable());

        let updated = persistence.get_draft(draft_id).await.unwrap().unwrap();
        assert_eq!(updated.status, DraftStatus::Publishing);
    }

    #[tokio::test]
    async fn terminal_stash_publish_error_marks_draft_failed_without_propagating() {
        let persistence = Arc::new(InMemoryPersistence::new());
        let blob_store = Arc::new(InMemoryBlobStore::new());
        let alerts = Arc::new(RecordingAlertSink::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let upstream = Arc::new(StubUpstream::default());
        *upstream.submit.lock().unwrap() = Some(Ok(StashSubmitResult {
            stash_item_id: "item-1".into(),
        }));
        *upstream.publish.lock().unwrap() = Some(Err(PublisherError::validation("bad tags")));

        let user_id = Uuid::new_v4();
        let draft_id = Uuid::new_v4();
        persistence.seed_user(user(user_id)).await;
        persistence.seed_draft(draft(draft_id, user_id)).await;
        blob_store.put("blob-1", vec![1, 2, 3]).await;

        let exec = executor(persistence.clone(), blob_store, alerts, clock, upstream);
        exec.run(draft_id, user_id).await.unwrap();

        let updated = persistence.get_draft(draft_id).await.unwrap().unwrap();
        assert_eq!(updated.status, DraftStatus::Failed);
        assert!(updated.error_message.is_some());
    }

    #[tokio::test]
    async fn already_stashed_draft_skips_straight_to_publish() {
        let persistence = Arc::new(InMemoryPersistence::new());
        let blob_store = Arc::new(InMemoryBlobStore::new());
        let alerts = Arc::new(RecordingAlertSink::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let upstream = Arc::new(StubUpstream::default());
        *upstream.publish.lock().unwrap() = Some(Ok(StashPublishResult {
            deviation_id: "dev-2".into(),
            url: Some("https://www.deviantart.com/deviation/dev-2".into()),
        }));

        let user_id = Uuid::new_v4();
        let draft_id = Uuid::new_v4();
        persistence.seed_user(user(user_id)).await;
        let mut d = draft(draft_id, user_id);
        d.stash_item_id = Some("already-uploaded".into());
        persistence.seed_draft(d).await;

        let exec = executor(persistence.clone(), blob_store, alerts, clock, upstream.clone());
        exec.run(draft_id, user_id).await.unwrap();

        assert!(upstream.submit.lock().unwrap().is_none());
        let updated = persistence.get_draft(draft_id).await.unwrap().unwrap();
        assert_eq!(updated.status, DraftStatus::Published);
    }
}
