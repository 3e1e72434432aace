//! Group-operation client
//!
//! Sends create/add/remove commands to the push provider and maps its replies
//! onto [`ProviderError`]. There is no retry loop here: deciding whether a
//! failed call is retried belongs to the caller.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Jitter, Quota, RateLimiter};
use reqwest::StatusCode;
use tracing::{debug, info, warn};

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use super::errors::ProviderError;
use super::types::{GroupOperation, GroupOperationReply, OperationKind};
use crate::config::{ProviderConfig, RateLimitConfig};
use crate::observability::membership_metrics;

#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait GroupOperationClient: Send + Sync {
    /// Execute one operation and return the group key the provider answered with.
    async fn send(&self, operation: &GroupOperation) -> Result<String, ProviderError>;
}

/// Provider-facing HTTP client with a shared-secret header and a direct rate limiter.
#[derive(Debug)]
pub struct HttpGroupClient {
    http: reqwest::Client,
    group_url: String,
    api_key: String,
    project_id: String,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

pub(crate) fn rate_limiter(config: &RateLimitConfig) -> Arc<DefaultDirectRateLimiter> {
    let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
    let burst = NonZeroU32::new(config.burst_capacity).unwrap_or(per_second);
    Arc::new(RateLimiter::direct(Quota::per_second(per_second).allow_burst(burst)))
}

pub(crate) fn http_client(timeout_ms: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_millis(timeout_ms))
        .build()?)
}

impl HttpGroupClient {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| anyhow!("provider.api_key is not configured"))?;

        info!(
            group_url = %config.group_url,
            requests_per_second = config.rate_limit.requests_per_second,
            "Group provider client configured"
        );

        Ok(Self {
            http: http_client(config.request_timeout_ms)?,
            group_url: config.group_url.clone(),
            api_key,
            project_id: config.project_id.clone(),
            rate_limiter: rate_limiter(&config.rate_limit),
        })
    }

    fn interpret(
        operation: &GroupOperation,
        status: StatusCode,
        body: &str,
    ) -> Result<String, ProviderError> {
        if status.is_server_error() {
            return Err(ProviderError::unavailable(format!("HTTP {status}")));
        }

        let reply = serde_json::from_str::<GroupOperationReply>(body);

        if status.is_client_error() {
            let reason = reply
                .ok()
                .and_then(|r| r.error)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("rejected").to_string());
            return Err(ProviderError::Rejected {
                operation: operation.operation.to_string(),
                status: status.as_u16(),
                reason,
            });
        }

        if !status.is_success() {
            return Err(ProviderError::bad_response(format!("unexpected HTTP {status}")));
        }

        let reply = reply.map_err(|e| ProviderError::bad_response(e.to_string()))?;
        if let Some(reason) = reply.error {
            return Err(ProviderError::Rejected {
                operation: operation.operation.to_string(),
                status: status.as_u16(),
                reason,
            });
        }

        match (reply.notification_key, operation.operation) {
            (Some(key), _) if !key.is_empty() => Ok(key),
            (_, OperationKind::Create) => Err(ProviderError::bad_response("create reply carried no notification_key")),
            // add/remove echo the key; fall back to the one we sent
            (_, _) => operation
                .key
                .clone()
                .ok_or_else(|| ProviderError::bad_response("reply and request both lack a notification_key")),
        }
    }
}

#[async_trait]
impl GroupOperationClient for HttpGroupClient {
    async fn send(&self, operation: &GroupOperation) -> Result<String, ProviderError> {
        self.rate_limiter
            .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(50)))
            .await;

        let metrics = membership_metrics();
        metrics.record_provider_request();
        debug!(
            operation = %operation.operation,
            key_name = %operation.key_name,
            addresses = operation.addresses.len(),
            "Sending group operation"
        );

        let response = self
            .http
            .post(&self.group_url)
            .header("Authorization", format!("key={}", self.api_key))
            .header("project_id", &self.project_id)
            .json(operation)
            .send()
            .await
            .map_err(|e| {
                metrics.record_provider_unavailable();
                ProviderError::unavailable(e.to_string())
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            metrics.record_provider_unavailable();
            ProviderError::unavailable(e.to_string())
        })?;

        let result = Self::interpret(operation, status, &body);
        match &result {
            Ok(key) => debug!(operation = %operation.operation, key = %key, "Group operation accepted"),
            Err(ProviderError::Unavailable { .. }) => metrics.record_provider_unavailable(),
            Err(err) => {
                metrics.record_provider_rejection();
                warn!(operation = %operation.operation, status = status.as_u16(), error = %err, "Group operation failed");
            }
        }
        result
    }
}
