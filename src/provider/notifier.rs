use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Jitter};
use serde::Serialize;
use tracing::debug;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use super::client::{http_client, rate_limiter};
use super::errors::ProviderError;
use super::types::NotificationPayload;
use crate::config::ProviderConfig;

/// Fire-and-forget delivery of a payload to every device in a group.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait BroadcastNotifier: Send + Sync {
    async fn send(&self, group_key: &str, payload: &NotificationPayload) -> Result<(), ProviderError>;
}

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    to: &'a str,
    data: &'a NotificationPayload,
}

#[derive(Debug)]
pub struct HttpBroadcastNotifier {
    http: reqwest::Client,
    send_url: String,
    api_key: String,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl HttpBroadcastNotifier {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| anyhow!("provider.api_key is not configured"))?;

        Ok(Self {
            http: http_client(config.request_timeout_ms)?,
            send_url: config.send_url.clone(),
            api_key,
            rate_limiter: rate_limiter(&config.rate_limit),
        })
    }
}

#[async_trait]
impl BroadcastNotifier for HttpBroadcastNotifier {
    async fn send(&self, group_key: &str, payload: &NotificationPayload) -> Result<(), ProviderError> {
        self.rate_limiter
            .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(50)))
            .await;

        let response = self
            .http
            .post(&self.send_url)
            .header("Authorization", format!("key={}", self.api_key))
            .json(&Envelope {
                to: group_key,
                data: payload,
            })
            .send()
            .await
            .map_err(|e| ProviderError::unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(ProviderError::unavailable(format!("HTTP {status}")));
        }
        if !status.is_success() {
            let reason = response.text().await.unwrap_or_default();
            return Err(ProviderError::Rejected {
                operation: "send".to_string(),
                status: status.as_u16(),
                reason,
            });
        }

        debug!(group_key, "Broadcast delivered");
        Ok(())
    }
}
