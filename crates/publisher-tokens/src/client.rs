//! Pluggable upstream OAuth2 client, so `TokenManager` can be tested without
//! a network round trip.

use async_trait::async_trait;

/// Successful `/oauth2/token` refresh response.
#[derive(Debug, Clone)]
pub struct RefreshedTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Seconds until the new access token expires, as returned by upstream.
    pub expires_in: i64,
}

/// Raised by [`OAuthClient::refresh`] on a non-2xx response or transport
/// failure. The caller (`TokenManager`) is responsible for mapping this into
/// the shared `PublisherError` taxonomy.
#[derive(Debug, Clone)]
pub struct OAuthRefreshFailure {
    pub status: Option<u16>,
    pub body: String,
}

impl OAuthRefreshFailure {
    /// Upstream signals an invalid grant this way: a `401` status, or an
    /// error body mentioning `invalid` or `expired` tokens.
    pub fn indicates_invalid_refresh_token(&self) -> bool {
        if self.status == Some(401) {
            return true;
        }
        let lower = self.body.to_lowercase();
        lower.contains("invalid") || lower.contains("expired")
    }
}

/// Upstream OAuth2 token endpoint, abstracted so tests can stub responses.
#[async_trait]
pub trait OAuthClient: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens, OAuthRefreshFailure>;
}

/// Production [`OAuthClient`] backed by `reqwest`, driving `POST
/// /oauth2/token` with `grant_type=refresh_token` (spec.md §6).
pub struct ReqwestOAuthClient {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl ReqwestOAuthClient {
    pub fn new(
        base_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        timeout: std::time::Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client configuration is valid");
        Self {
            client,
            token_url: format!("{}/oauth2/token", base_url.into()),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

#[async_trait]
impl OAuthClient for ReqwestOAuthClient {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens, OAuthRefreshFailure> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        let response = self
            .client
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| OAuthRefreshFailure {
                status: None,
                body: e.to_string(),
            })?;

        let status = response.status();
        let body: serde_json::Value = response.json().await.map_err(|e| OAuthRefreshFailure {
            status: Some(status.as_u16()),
            body: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(OAuthRefreshFailure {
                status: Some(status.as_u16()),
                body: body.to_string(),
            });
        }

        let access_token = body
            .get("access_token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| OAuthRefreshFailure {
                status: Some(status.as_u16()),
                body: "response missing access_token".to_string(),
            })?
            .to_string();
        let refresh_token = body
            .get("refresh_token")
            .and_then(|v| v.as_str())
            .unwrap_or(refresh_token)
            .to_string();
        let expires_in = body.get("expires_in").and_then(|v| v.as_i64()).unwrap_or(3600);

        Ok(RefreshedTokens {
            access_token,
            refresh_token,
            expires_in,
        })
    }
}
