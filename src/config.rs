use anyhow::Result;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for Rallypoint
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RallypointConfig {
    /// Push-notification group provider
    pub provider: ProviderConfig,
    /// Attendance and group transaction settings
    pub coordinator: CoordinatorConfig,
    /// Identity verification and lookup
    pub identity: IdentityConfig,
    /// Observability settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// Endpoint accepting create/add/remove group operations
    pub group_url: String,
    /// Endpoint delivering a message to a group key
    pub send_url: String,
    /// Shared secret (can be set via env var)
    pub api_key: Option<String>,
    /// Numeric project identifier sent with every group operation
    pub project_id: String,
    /// Per-request timeout
    pub request_timeout_ms: u64,
    /// Rate limiting settings
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Sustained requests per second
    pub requests_per_second: u32,
    /// Burst capacity
    pub burst_capacity: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CoordinatorConfig {
    /// Re-executions of a read-modify-write after a store conflict
    pub max_store_retries: usize,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    /// Deadline for a single provider call made while a transaction is open
    pub provider_deadline_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IdentityConfig {
    /// Token verification endpoint; the token is appended to it
    pub verify_url: String,
    /// Application namespace a verified token must belong to
    pub app_namespace: String,
    /// Attempt cap for verification while the service answers 503
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Wall-clock budget for the whole verification
    pub deadline_ms: u64,
    /// Identity lookup cache
    pub cache_ttl_seconds: u64,
    pub cache_capacity: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level
    pub log_level: String,
    /// Emit JSON lines instead of human-readable logs
    pub json_logs: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            group_url: "https://fcm.googleapis.com/fcm/notification".to_string(),
            send_url: "https://fcm.googleapis.com/fcm/send".to_string(),
            api_key: None, // Will be read from env var or .rallypoint-rc
            project_id: String::new(),
            request_timeout_ms: 5_000,
            rate_limit: RateLimitConfig {
                requests_per_second: 10,
                burst_capacity: 20,
            },
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_store_retries: 5,
            retry_base_delay_ms: 10,
            retry_max_delay_ms: 500,
            provider_deadline_ms: 5_000,
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            verify_url: "https://iid.googleapis.com/iid/info/".to_string(),
            app_namespace: "com.example.rallypoint".to_string(),
            max_attempts: 5,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 16_000,
            deadline_ms: 50_000,
            cache_ttl_seconds: 300,
            cache_capacity: 10_000,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: true,
        }
    }
}

impl RallypointConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (rallypoint.toml, .rallypoint-rc)
    /// 3. Environment variables (prefixed with RALLYPOINT_, nested keys joined by `__`)
    pub fn load() -> Result<Self> {
        Self::load_with(None)
    }

    /// Same as [`RallypointConfig::load`], with an explicit file layered over the defaults.
    pub fn load_with(file: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&RallypointConfig::default())?);

        match file {
            Some(path) => {
                builder = builder.add_source(File::from(path).format(FileFormat::Toml));
            }
            None => {
                if Path::new("rallypoint.toml").exists() {
                    builder = builder.add_source(File::with_name("rallypoint"));
                }
                if Path::new(".rallypoint-rc").exists() {
                    builder = builder.add_source(File::new(".rallypoint-rc", FileFormat::Toml));
                }
            }
        }

        // Override with environment variables
        builder = builder.add_source(
            Environment::with_prefix("RALLYPOINT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut rallypoint_config: RallypointConfig = builder.build()?.try_deserialize()?;

        // Special handling for the provider key - check the short env names too
        if rallypoint_config.provider.api_key.is_none() {
            if let Ok(key) = std::env::var("RALLYPOINT_API_KEY") {
                rallypoint_config.provider.api_key = Some(key);
            } else if let Ok(key) = std::env::var("FCM_API_KEY") {
                rallypoint_config.provider.api_key = Some(key);
            }
        }

        Ok(rallypoint_config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Copy with secrets masked, for display.
    pub fn redacted(&self) -> Self {
        let mut redacted = self.clone();
        if redacted.provider.api_key.is_some() {
            redacted.provider.api_key = Some("********".to_string());
        }
        redacted
    }
}

/// Load environment variables from a .env file if it exists
pub fn load_env_file() -> Result<()> {
    if Path::new(".env").exists() {
        dotenvy::dotenv()?;
    }
    Ok(())
}
