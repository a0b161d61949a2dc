//! Upstream HTTP surface the executor drives: stash-upload then publish.
//!
//! [`UpstreamClient`] is the seam production code implements with
//! [`ReqwestUpstreamClient`] and tests implement with a hand-rolled stub or a
//! `wiremock` server. Response mapping to [`PublisherError`] follows the
//! error table in spec.md §7: 400 → validation, 401 → auth, 403 →
//! permission-denied, 429 → rate-limited (with headers), 5xx → server error,
//! anything below the HTTP layer → transient io.

use std::time::Duration;

use async_trait::async_trait;
use publisher_contracts::PublisherError;

/// Result of a successful `/stash/submit` call.
#[derive(Debug, Clone)]
pub struct StashSubmitResult {
    /// Upstream returns either `itemid` or `stackid`; both are recorded as a
    /// string, since the publish call treats them interchangeably.
    pub stash_item_id: String,
}

/// Inputs to a `/stash/publish` call.
#[derive(Debug, Clone)]
pub struct StashPublishRequest {
    pub stash_item_id: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub gallery_ids: Vec<String>,
    pub is_mature: bool,
    pub maturity_level: Option<String>,
    pub display_resolution: Option<u8>,
    pub add_watermark: bool,
    pub allow_free_download: bool,
    pub is_dirty: bool,
}

/// Result of a successful `/stash/publish` call.
#[derive(Debug, Clone)]
pub struct StashPublishResult {
    pub deviation_id: String,
    pub url: Option<String>,
}

/// The two upstream calls the publish executor makes, each gated by C2/C3 by
/// the caller before invocation.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn stash_submit(
        &self,
        access_token: &str,
        file_bytes: Vec<u8>,
        file_name: &str,
        mime: &str,
        title: Option<&str>,
        artist_comments: Option<&str>,
    ) -> Result<StashSubmitResult, PublisherError>;

    async fn stash_publish(
        &self,
        access_token: &str,
        request: StashPublishRequest,
    ) -> Result<StashPublishResult, PublisherError>;
}

/// Production [`UpstreamClient`] backed by `reqwest`.
pub struct ReqwestUpstreamClient {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestUpstreamClient {
    pub fn new(base_url: impl Into<String>, read_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(read_timeout)
            .build()
            .expect("reqwest client configuration is valid");
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl UpstreamClient for ReqwestUpstreamClient {
    async fn stash_submit(
        &self,
        access_token: &str,
        file_bytes: Vec<u8>,
        file_name: &str,
        mime: &str,
        title: Option<&str>,
        artist_comments: Option<&str>,
    ) -> Result<StashSubmitResult, PublisherError> {
        let part = reqwest::multipart::Part::bytes(file_bytes)
            .file_name(file_name.to_string())
            .mime_str(mime)
            .map_err(|e| PublisherError::validation(e.to_string()))?;
        let mut form = reqwest::multipart::Form::new().part("file", part);
        if let Some(title) = title {
            form = form.text("title", title.to_string());
        }
        if let Some(artist_comments) = artist_comments {
            form = form.text("artist_comments", artist_comments.to_string());
        }

        let response = self
            .client
            .post(self.url("/api/v1/oauth2/stash/submit"))
            .bearer_auth(access_token)
            .multipart(form)
            .send()
            .await
            .map_err(map_transport_error)?;

        let response = map_response_status(response).await?;
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PublisherError::transient_io(e.to_string()))?;

        let stash_item_id = body
            .get("itemid")
            .or_else(|| body.get("stackid"))
            .map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .ok_or_else(|| PublisherError::transient_io("stash/submit response missing itemid/stackid"))?;

        Ok(StashSubmitResult { stash_item_id })
    }

    async fn stash_publish(
        &self,
        access_token: &str,
        request: StashPublishRequest,
    ) -> Result<StashPublishResult, PublisherError> {
        let mut form = vec![
            ("itemid".to_string(), request.stash_item_id),
            ("title".to_string(), request.title),
            ("artist_comments".to_string(), request.description),
            ("galleryids".to_string(), request.gallery_ids.join(",")),
            ("is_mature".to_string(), request.is_mature.to_string()),
            ("add_watermark".to_string(), request.add_watermark.to_string()),
            (
                "allow_free_download".to_string(),
                request.allow_free_download.to_string(),
            ),
            ("is_dirty".to_string(), request.is_dirty.to_string()),
        ];
        form.extend(
            crate::tags::sanitize_tags(&request.tags)
                .into_iter()
                .map(|tag| ("tags[]".to_string(), tag)),
        );
        if let Some(level) = request.maturity_level {
            form.push(("maturity_level".to_string(), level));
        }
        if let Some(resolution) = request.display_resolution {
            form.push(("display_resolution".to_string(), resolution.to_string()));
        }

        let response = self
            .client
            .post(self.url("/api/v1/oauth2/stash/publish"))
            .bearer_auth(access_token)
            .form(&form)
            .send()
            .await
            .map_err(map_transport_error)?;

        let response = map_response_status(response).await?;
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PublisherError::transient_io(e.to_string()))?;

        let deviation_id = body
            .get("deviationid")
            .and_then(|v| v.as_str())
            .ok_or_else(|| PublisherError::transient_io("stash/publish response missing deviationid"))?
            .to_string();
        let url = body
            .get("url")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        Ok(StashPublishResult { deviation_id, url })
    }
}

fn map_transport_error(err: reqwest::Error) -> PublisherError {
    PublisherError::transient_io(err.to_string())
}

/// Classifies a non-2xx response into the publisher error taxonomy, reading
/// `Retry-After`/`X-RateLimit-*` for the 429 case. Returns the response
/// unchanged (so the caller can still read its body) when the status is
/// successful.
async fn map_response_status(response: reqwest::Response) -> Result<reqwest::Response, PublisherError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status.as_u16() {
        400 => {
            let body = response.text().await.unwrap_or_default();
            Err(PublisherError::validation(body))
        }
        401 => {
            let body = response.text().await.unwrap_or_default();
            Err(PublisherError::auth(body))
        }
        403 => {
            let body = response.text().await.unwrap_or_default();
            Err(PublisherError::permission_denied(body))
        }
        429 => {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            let rate_limit_reset = response
                .headers()
                .get("x-ratelimit-reset")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<i64>().ok());
            let rate_limit_remaining = response
                .headers()
                .get("x-ratelimit-remaining")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<i64>().ok());
            Err(PublisherError::RateLimited {
                retry_after,
                rate_limit_reset,
                rate_limit_remaining,
            })
        }
        code if (500..600).contains(&code) => Err(PublisherError::ServerError { status: code }),
        code => Err(PublisherError::ValidationError {
            message: format!("unexpected upstream status {code}"),
        }),
    }
}
