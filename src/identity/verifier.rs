//! Messaging-token verification
//!
//! The verification service sometimes answers 503 while it warms up. Those
//! replies are retried with exponential backoff, bounded by an attempt cap and
//! a wall-clock deadline: the hosting environment kills requests that run past
//! its ceiling, so the budget is checked before every sleep.

use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, warn};

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use crate::config::{IdentityConfig, ProviderConfig};

#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("token verification service unavailable: {0}")]
    Unavailable(String),

    #[error("token verification gave up after {attempts} attempts")]
    BudgetExhausted { attempts: u32 },
}

#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Whether `token` is an authentic messaging address issued to this application.
    async fn verify(&self, token: &str) -> Result<bool, VerificationError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenInfo {
    #[serde(default)]
    application: String,
    #[serde(default)]
    authorized_entity: String,
}

pub struct HttpTokenVerifier {
    http: reqwest::Client,
    verify_url: String,
    api_key: String,
    app_namespace: String,
    project_id: String,
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    deadline: Duration,
}

impl HttpTokenVerifier {
    pub fn new(identity: &IdentityConfig, provider: &ProviderConfig) -> anyhow::Result<Self> {
        let api_key = provider
            .api_key
            .clone()
            .ok_or_else(|| anyhow!("provider.api_key is not configured"))?;

        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_millis(provider.request_timeout_ms))
                .build()?,
            verify_url: identity.verify_url.clone(),
            api_key,
            app_namespace: identity.app_namespace.clone(),
            project_id: provider.project_id.clone(),
            max_attempts: identity.max_attempts.max(1),
            initial_backoff: Duration::from_millis(identity.initial_backoff_ms),
            max_backoff: Duration::from_millis(identity.max_backoff_ms),
            deadline: Duration::from_millis(identity.deadline_ms),
        })
    }

    async fn fetch(&self, token: &str, deadline: Instant) -> Result<reqwest::Response, VerificationError> {
        let request = self
            .http
            .get(format!("{}{}", self.verify_url, token))
            .header("Authorization", format!("key={}", self.api_key))
            .send();

        match timeout_at(deadline, request).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(err)) => Err(VerificationError::Unavailable(err.to_string())),
            Err(_) => Err(VerificationError::Unavailable("deadline exceeded".to_string())),
        }
    }
}

#[async_trait]
impl TokenVerifier for HttpTokenVerifier {
    async fn verify(&self, token: &str) -> Result<bool, VerificationError> {
        let deadline = Instant::now() + self.deadline;
        let mut backoff = self.initial_backoff;
        let mut attempt = 0;

        let response = loop {
            attempt += 1;
            let response = self.fetch(token, deadline).await?;
            if response.status() != StatusCode::SERVICE_UNAVAILABLE {
                break response;
            }
            if attempt >= self.max_attempts || Instant::now() + backoff >= deadline {
                warn!(attempts = attempt, "Token verification budget exhausted");
                return Err(VerificationError::BudgetExhausted { attempts: attempt });
            }
            debug!(attempt, backoff_ms = backoff.as_millis() as u64, "Verification service busy, backing off");
            sleep(backoff).await;
            backoff = (backoff * 2).min(self.max_backoff);
        };

        if response.status() != StatusCode::OK {
            warn!(status = response.status().as_u16(), "Token rejected by verification service");
            return Ok(false);
        }

        let info: TokenInfo = match response.json().await {
            Ok(info) => info,
            Err(err) => {
                warn!(error = %err, "Undecodable token verification reply");
                return Ok(false);
            }
        };

        let authentic = info.application == self.app_namespace && info.authorized_entity == self.project_id;
        if !authentic {
            warn!(
                application = %info.application,
                authorized_entity = %info.authorized_entity,
                "Token issued to a different application"
            );
        }
        Ok(authentic)
    }
}
