//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment prefix for overrides, e.g. `CMS_TRANSLATOR__QUEUE__CONCURRENCY=4`
pub const ENV_PREFIX: &str = "CMS_TRANSLATOR";

/// Default config file looked up in the working directory (any supported extension)
pub const DEFAULT_CONFIG_NAME: &str = "cms-translator";

/// Translation provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub api_key: String,
    pub api_endpoint: String,
    pub model: String,
    /// Tried in order when the primary model is unavailable
    pub fallback_models: Vec<String>,
    pub max_concurrent: usize,
    pub timeout_ms: u64,
    pub daily_token_limit: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_endpoint: "https://ark.cn-beijing.volces.com/api/v3/responses".to_string(),
            model: "doubao-seed-translation-250915".to_string(),
            fallback_models: vec!["deepseek-v3-250324".to_string()],
            max_concurrent: 4,
            timeout_ms: 60000,
            daily_token_limit: 2_000_000,
        }
    }
}

/// Job queue settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Jobs processed at the same time. Kept low: provider quotas are strict.
    pub concurrency: usize,
    /// Quota retries before a job fails for good
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            max_retries: 3,
            retry_base_delay_ms: 5000,
        }
    }
}

impl QueueConfig {
    /// Backoff before retry number `attempt` (0-based): `base * 2^attempt`
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        Duration::from_millis(self.retry_base_delay_ms.saturating_mul(factor))
    }
}

/// Where the file-backed stores keep their data
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub entities_dir: PathBuf,
    pub jobs_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            entities_dir: PathBuf::from("data/entities"),
            jobs_file: PathBuf::from("data/jobs.json"),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub queue: QueueConfig,
    pub storage: StorageConfig,
    /// Source language passed to the provider; `auto` lets it detect
    pub source_language: String,
}

impl AppConfig {
    /// Load defaults, then the config file, then environment overrides.
    ///
    /// `ARK_API_KEY` fills the provider key when nothing else set it.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder();
        builder = match path {
            Some(path) => builder.add_source(config::File::from(path)),
            None => builder.add_source(config::File::with_name(DEFAULT_CONFIG_NAME).required(false)),
        };
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX).separator("__"),
        );

        let mut config: Self = builder.build()?.try_deserialize()?;

        if config.provider.api_key.is_empty() {
            if let Ok(key) = std::env::var("ARK_API_KEY") {
                config.provider.api_key = key;
            }
        }
        if config.source_language.is_empty() {
            config.source_language = "auto".to_string();
        }

        info!(
            "Loaded configuration: concurrency={}, max_retries={}, model={}",
            config.queue.concurrency, config.queue.max_retries, config.provider.model
        );
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.provider.api_endpoint.is_empty() {
            return Err(anyhow::anyhow!("API endpoint is required"));
        }

        if self.provider.model.is_empty() {
            return Err(anyhow::anyhow!("Provider model is required"));
        }

        if self.provider.api_key.is_empty() {
            warn!("No API key configured; translation jobs will be refused");
        }

        if self.queue.concurrency == 0 {
            return Err(anyhow::anyhow!("queue.concurrency must be greater than 0"));
        }

        if self.provider.max_concurrent == 0 {
            return Err(anyhow::anyhow!("provider.max_concurrent must be greater than 0"));
        }

        Ok(())
    }
}
