//! Token manager (C1): hands out a currently valid access token, refreshing
//! through the upstream OAuth2 endpoint when needed.

use std::sync::Arc;

use chrono::Duration;
use publisher_contracts::model::{RefreshTokenExpiryStatus, User};
use publisher_contracts::ports::{AlertSink, Clock, Persistence};
use publisher_contracts::PublisherError;
use uuid::Uuid;

use crate::client::OAuthClient;

/// Access tokens are refreshed once they are within this window of expiry.
pub const SKEW_WINDOW: Duration = Duration::minutes(5);

/// New refresh tokens are issued with this lifetime.
pub const REFRESH_TOKEN_LIFETIME_DAYS: i64 = 60;

/// Hands out valid access tokens for a [`User`], refreshing through an
/// [`OAuthClient`] and persisting the result through [`Persistence`].
pub struct TokenManager {
    oauth_client: Arc<dyn OAuthClient>,
    persistence: Arc<dyn Persistence>,
    alerts: Arc<dyn AlertSink>,
    clock: Arc<dyn Clock>,
}

impl TokenManager {
    pub fn new(
        oauth_client: Arc<dyn OAuthClient>,
        persistence: Arc<dyn Persistence>,
        alerts: Arc<dyn AlertSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            oauth_client,
            persistence,
            alerts,
            clock,
        }
    }

    /// Returns a currently valid access token for `user_id`, refreshing it
    /// first if it is absent or within the skew window of expiring.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(skip(self), fields(user_id = %user_id))
    )]
    pub async fn ensure_valid_token(&self, user_id: Uuid) -> Result<String, PublisherError> {
        let user = self
            .persistence
            .get_user(user_id)
            .await?
            .ok_or_else(|| PublisherError::validation("user not found"))?;

        if user.requires_reauth {
            return Err(PublisherError::ReauthRequired { user_id });
        }

        let now = self.clock.now();

        let needs_refresh = match (user.access_token.as_ref(), user.token_expires_at) {
            (Some(_), Some(expires_at)) => expires_at - now <= SKEW_WINDOW,
            _ => true,
        };

        if !needs_refresh {
            return Ok(user.access_token.clone().expect("checked above"));
        }

        self.refresh(user, now).await
    }

    async fn refresh(&self, mut user: User, now: chrono::DateTime<chrono::Utc>) -> Result<String, PublisherError> {
        let user_id = user.id;

        let refresh_token = match (user.refresh_token.as_ref(), user.refresh_token_expires_at) {
            (Some(token), Some(expires_at)) if expires_at > now => token.clone(),
            _ => {
                self.mark_reauth_required(&mut user).await?;
                return Err(PublisherError::ReauthRequired { user_id });
            }
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(user_id = %user_id, "refreshing access token");

        match self.oauth_client.refresh(&refresh_token).await {
            Ok(refreshed) => {
                user.access_token = Some(refreshed.access_token.clone());
                user.refresh_token = Some(refreshed.refresh_token);
                user.token_expires_at = Some(now + Duration::seconds(refreshed.expires_in));
                user.refresh_token_expires_at =
                    Some(now + Duration::days(REFRESH_TOKEN_LIFETIME_DAYS));
                user.requires_reauth = false;
                user.reauth_email_sent = false;

                self.persistence.save_user(&user).await?;
                Ok(refreshed.access_token)
            }
            Err(failure) if failure.indicates_invalid_refresh_token() => {
                self.mark_reauth_required(&mut user).await?;
                Err(PublisherError::ReauthRequired { user_id })
            }
            Err(failure) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(user_id = %user_id, status = ?failure.status, "token refresh failed transiently");
                Err(PublisherError::TokenRefreshFailed {
                    message: failure.body,
                })
            }
        }
    }

    async fn mark_reauth_required(&self, user: &mut User) -> Result<(), PublisherError> {
        user.requires_reauth = true;
        self.persistence.save_user(user).await?;

        if !user.reauth_email_sent {
            self.alerts
                .notify(
                    "Reauthorization required",
                    &format!("User {} must reconnect their account", user.id),
                )
                .await;
            user.reauth_email_sent = true;
            self.persistence.save_user(user).await?;
        }

        Ok(())
    }

    /// Classifies how close `user`'s refresh token is to expiry, for the
    /// alert collaborator's proactive warning emails.
    pub fn refresh_token_status(&self, user: &User) -> Option<RefreshTokenExpiryStatus> {
        user.refresh_token_expires_at
            .map(|expires_at| RefreshTokenExpiryStatus::classify(expires_at, self.clock.now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_support::StubOAuthClient;
    use crate::client::{OAuthRefreshFailure, RefreshedTokens};
    use publisher_contracts::ports::{InMemoryPersistence, ManualClock, RecordingAlertSink};

    fn user(id: Uuid, now: chrono::DateTime<chrono::Utc>) -> User {
        User {
            id,
            access_token: Some("old-access".to_string()),
            refresh_token: Some("old-refresh".to_string()),
            token_expires_at: Some(now + Duration::hours(1)),
            refresh_token_expires_at: Some(now + Duration::days(30)),
            timezone: "UTC".to_string(),
            requires_reauth: false,
            reauth_email_sent: false,
        }
    }

    #[tokio::test]
    async fn returns_existing_token_when_far_from_expiry() {
        let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
        let persistence = Arc::new(InMemoryPersistence::new());
        let id = Uuid::new_v4();
        persistence.seed_user(user(id, clock.now())).await;

        let oauth = Arc::new(StubOAuthClient::new(vec![]));
        let alerts = Arc::new(RecordingAlertSink::new());
        let manager = TokenManager::new(oauth.clone(), persistence, alerts, clock);

        let token = manager.ensure_valid_token(id).await.unwrap();
        assert_eq!(token, "old-access");
        assert_eq!(oauth.call_count(), 0);
    }

    #[tokio::test]
    async fn refreshes_token_within_skew_window() {
        let now = chrono::Utc::now();
        let clock = Arc::new(ManualClock::new(now));
        let persistence = Arc::new(InMemoryPersistence::new());
        let id = Uuid::new_v4();
        let mut u = user(id, now);
        u.token_expires_at = Some(now + Duration::minutes(2));
        persistence.seed_user(u).await;

        let oauth = Arc::new(StubOAuthClient::new(vec![Ok(RefreshedTokens {
            access_token: "new-access".to_string(),
            refresh_token: "new-refresh".to_string(),
            expires_in: 3600,
        })]));
        let alerts = Arc::new(RecordingAlertSink::new());
        let manager = TokenManager::new(oauth.clone(), persistence.clone(), alerts, clock);

        let token = manager.ensure_valid_token(id).await.unwrap();
        assert_eq!(token, "new-access");
        assert_eq!(oauth.call_count(), 1);

        let saved = persistence.get_user(id).await.unwrap().unwrap();
        assert_eq!(saved.access_token.as_deref(), Some("new-access"));
        assert_eq!(saved.refresh_token.as_deref(), Some("new-refresh"));
    }

    #[tokio::test]
    async fn expired_refresh_token_fails_reauth_required_without_calling_upstream() {
        let now = chrono::Utc::now();
        let clock = Arc::new(ManualClock::new(now));
        let persistence = Arc::new(InMemoryPersistence::new());
        let id = Uuid::new_v4();
        let mut u = user(id, now);
        u.refresh_token_expires_at = Some(now - Duration::days(1));
        persistence.seed_user(u).await;

        let oauth = Arc::new(StubOAuthClient::new(vec![]));
        let alerts = Arc::new(RecordingAlertSink::new());
        let manager = TokenManager::new(oauth.clone(), persistence.clone(), alerts.clone(), clock);

        let err = manager.ensure_valid_token(id).await.unwrap_err();
        assert!(matches!(err, PublisherError::ReauthRequired { .. }));
        assert_eq!(oauth.call_count(), 0);
        assert_eq!(alerts.notifications.lock().await.len(), 1);

        let saved = persistence.get_user(id).await.unwrap().unwrap();
        assert!(saved.requires_reauth);
    }

    #[tokio::test]
    async fn upstream_401_marks_reauth_required() {
        let now = chrono::Utc::now();
        let clock = Arc::new(ManualClock::new(now));
        let persistence = Arc::new(InMemoryPersistence::new());
        let id = Uuid::new_v4();
        let mut u = user(id, now);
        u.token_expires_at = Some(now - Duration::minutes(1));
        persistence.seed_user(u).await;

        let oauth = Arc::new(StubOAuthClient::new(vec![Err(OAuthRefreshFailure {
            status: Some(401),
            body: "unauthorized".to_string(),
        })]));
        let alerts = Arc::new(RecordingAlertSink::new());
        let manager = TokenManager::new(oauth, persistence.clone(), alerts.clone(), clock);

        let err = manager.ensure_valid_token(id).await.unwrap_err();
        assert!(matches!(err, PublisherError::ReauthRequired { .. }));
        assert_eq!(alerts.notifications.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn other_upstream_failure_is_transient() {
        let now = chrono::Utc::now();
        let clock = Arc::new(ManualClock::new(now));
        let persistence = Arc::new(InMemoryPersistence::new());
        let id = Uuid::new_v4();
        let mut u = user(id, now);
        u.token_expires_at = Some(now - Duration::minutes(1));
        persistence.seed_user(u).await;

        let oauth = Arc::new(StubOAuthClient::new(vec![Err(OAuthRefreshFailure {
            status: Some(503),
            body: "upstream unavailable".to_string(),
        })]));
        let alerts = Arc::new(RecordingAlertSink::new());
        let manager = TokenManager::new(oauth, persistence, alerts, clock);

        let err = manager.ensure_valid_token(id).await.unwrap_err();
        assert!(matches!(err, PublisherError::TokenRefreshFailed { .. }));
        assert!(err.retryable());
    }

    #[tokio::test]
    async fn reauth_alert_sent_only_once() {
        let now = chrono::Utc::now();
        let clock = Arc::new(ManualClock::new(now));
        let persistence = Arc::new(InMemoryPersistence::new());
        let id = Uuid::new_v4();
        let mut u = user(id, now);
        u.refresh_token_expires_at = Some(now - Duration::days(1));
        persistence.seed_user(u).await;

        let oauth = Arc::new(StubOAuthClient::new(vec![]));
        let alerts = Arc::new(RecordingAlertSink::new());
        let manager = TokenManager::new(oauth, persistence, alerts.clone(), clock);

        let _ = manager.ensure_valid_token(id).await;
        let _ = manager.ensure_valid_token(id).await;

        assert_eq!(alerts.notifications.lock().await.len(), 1);
    }

    #[test]
    fn refresh_token_status_classifies_buckets() {
        let now = chrono::Utc::now();
        let clock = Arc::new(ManualClock::new(now));
        let persistence = Arc::new(InMemoryPersistence::new());
        let oauth = Arc::new(StubOAuthClient::new(vec![]));
        let alerts = Arc::new(RecordingAlertSink::new());
        let manager = TokenManager::new(oauth, persistence, alerts, clock);

        let mut u = user(Uuid::new_v4(), now);
        u.refresh_token_expires_at = Some(now + Duration::days(30));
        assert_eq!(
            manager.refresh_token_status(&u),
            Some(RefreshTokenExpiryStatus::Valid)
        );

        u.refresh_token_expires_at = Some(now + Duration::days(5));
        assert_eq!(
            manager.refresh_token_status(&u),
            Some(RefreshTokenExpiryStatus::ExpiringSoon)
        );

        u.refresh_token_expires_at = Some(now - Duration::days(1));
        assert_eq!(
            manager.refresh_token_status(&u),
            Some(RefreshTokenExpiryStatus::Invalid)
        );
    }
}
