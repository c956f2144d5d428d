use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderValue, RETRY_AFTER};
use reqwest::{Client as ReqwestClient, StatusCode};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::rate_limiter::TokenBucketRateLimiter;
use crate::domain::errors::BackendError;
use crate::domain::models::{BackendConfig, Item, RateLimitConfig};
use crate::domain::ports::EntityApi;

/// HTTP client for the hosted entity API
///
/// Issues `GET {base_url}/api/apps/{app_id}/entities/{entity}` with `sort`,
/// `limit` and a JSON-encoded `q` filter as query parameters, and maps the
/// response onto [`BackendError`]:
/// - 429 → `RateLimited`, with the `Retry-After` header (or a `retry_after`
///   body field) as the hint
/// - any other non-2xx → `Other` with the status and response body
/// - transport and decode failures → `Other` without a status
pub struct HttpEntityApi {
    http_client: ReqwestClient,
    base_url: String,
    app_id: String,
    api_key: Option<String>,
    rate_limiter: Option<TokenBucketRateLimiter>,
}

impl HttpEntityApi {
    /// Create a client from backend and throttling configuration
    ///
    /// # Returns
    /// * `Ok(HttpEntityApi)` - Successfully created client
    /// * `Err(anyhow::Error)` - Failed to build HTTP client
    pub fn with_config(backend: &BackendConfig, rate_limit: &RateLimitConfig) -> Result<Self> {
        let http_client = ReqwestClient::builder()
            .timeout(Duration::from_secs(backend.timeout_secs))
            .pool_max_idle_per_host(10)
            .tcp_nodelay(true)
            .build()
            .context("Failed to build HTTP client")?;

        info!(
            base_url = %backend.base_url,
            app_id = %backend.app_id,
            authenticated = backend.api_key.is_some(),
            requests_per_second = ?rate_limit.requests_per_second,
            timeout_secs = backend.timeout_secs,
            "initializing entity API client"
        );

        Ok(Self {
            http_client,
            base_url: backend.base_url.trim_end_matches('/').to_string(),
            app_id: backend.app_id.clone(),
            api_key: backend.api_key.clone(),
            rate_limiter: rate_limit
                .requests_per_second
                .map(TokenBucketRateLimiter::new),
        })
    }

    fn entity_url(&self, entity: &str) -> String {
        format!(
            "{}/api/apps/{}/entities/{}",
            self.base_url, self.app_id, entity
        )
    }

    #[instrument(skip(self, query))]
    async fn fetch(
        &self,
        entity: &str,
        query: Option<&Value>,
        sort: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<Item>, BackendError> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.acquire().await;
        }

        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(sort) = sort {
            params.push(("sort", sort.to_string()));
        }
        if let Some(limit) = limit {
            params.push(("limit", limit.to_string()));
        }
        if let Some(query) = query {
            params.push(("q", query.to_string()));
        }

        let mut request = self.http_client.get(self.entity_url(entity)).query(&params);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| BackendError::other(None, format!("request failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let header_hint = parse_retry_after(response.headers().get(RETRY_AFTER));
            let body = response.text().await.unwrap_or_default();
            let retry_after_secs = header_hint.or_else(|| retry_after_from_body(&body));
            warn!(entity, ?retry_after_secs, "entity API returned 429");
            return Err(BackendError::RateLimited { retry_after_secs });
        }

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            let message = if body.is_empty() {
                status.canonical_reason().unwrap_or("unknown error").to_string()
            } else {
                body
            };
            return Err(BackendError::other(Some(status.as_u16()), message));
        }

        let items: Vec<Item> = response
            .json()
            .await
            .map_err(|e| BackendError::other(None, format!("invalid response body: {e}")))?;

        debug!(entity, count = items.len(), "entity API response decoded");
        Ok(items)
    }
}

#[async_trait]
impl EntityApi for HttpEntityApi {
    async fn list(
        &self,
        entity: &str,
        sort: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<Item>, BackendError> {
        self.fetch(entity, None, sort, limit).await
    }

    async fn filter(
        &self,
        entity: &str,
        query: &Value,
        sort: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<Item>, BackendError> {
        self.fetch(entity, Some(query), sort, limit).await
    }
}

/// Parse a delta-seconds `Retry-After` header. HTTP-date values are ignored.
fn parse_retry_after(value: Option<&HeaderValue>) -> Option<u64> {
    value?.to_str().ok()?.trim().parse().ok()
}

/// Read a numeric `retry_after` field (seconds) from a JSON error body.
fn retry_after_from_body(body: &str) -> Option<u64> {
    let value: Value = serde_json::from_str(body).ok()?;
    let field = value.get("retry_after")?;
    field.as_u64().or_else(|| {
        field
            .as_f64()
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(|secs| {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let rounded = secs.ceil() as u64;
                rounded
            })
    })
}
