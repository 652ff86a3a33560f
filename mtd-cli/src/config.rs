//! Application configuration.
//!
//! Layered lowest to highest: built-in defaults, `config/mtd.toml` (or the
//! file given with `--config`), then `MTD__SECTION__KEY` environment
//! variables.

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use mtd_core::auth::AesGcmCipher;
use mtd_core::db::DbConfig;
use mtd_core::submission::{PollPolicy, RetryPolicy};
use mtd_core::VendorMetadata;
use mtd_hmrc::{HmrcClientConfig, HmrcEnvironment};
use serde::Deserialize;
use thiserror::Error;

const DEFAULT_CONFIG_FILE: &str = "config/mtd";
const ENV_PREFIX: &str = "MTD";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid [{section}] configuration: {message}")]
    Invalid {
        section: &'static str,
        message: String,
    },
}

impl ConfigError {
    fn invalid(section: &'static str, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            section,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub backend: String,
    pub connection_string: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            backend: "sqlite".to_string(),
            connection_string: "mtd.db".to_string(),
        }
    }
}

impl DatabaseSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.trim().is_empty() {
            return Err(ConfigError::invalid("database", "backend must not be empty"));
        }
        if self.backend == "sqlite" && self.connection_string.trim().is_empty() {
            return Err(ConfigError::invalid(
                "database",
                "connection_string is required for the sqlite backend",
            ));
        }
        Ok(())
    }

    pub fn db_config(&self) -> DbConfig {
        DbConfig {
            backend: self.backend.clone(),
            connection_string: self.connection_string.clone(),
        }
    }
}

#[derive(Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HmrcSettings {
    pub environment: HmrcEnvironment,
    pub base_url: Option<String>,
    pub client_id: String,
    pub client_secret: String,
    pub request_timeout_secs: u64,
}

impl Default for HmrcSettings {
    fn default() -> Self {
        Self {
            environment: HmrcEnvironment::Sandbox,
            base_url: None,
            client_id: String::new(),
            client_secret: String::new(),
            request_timeout_secs: 30,
        }
    }
}

impl std::fmt::Debug for HmrcSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmrcSettings")
            .field("environment", &self.environment)
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish_non_exhaustive()
    }
}

impl HmrcSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::invalid("hmrc", "request_timeout_secs must be positive"));
        }
        if let Some(url) = &self.base_url {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(ConfigError::invalid(
                    "hmrc",
                    format!("base_url '{url}' must be an http(s) URL"),
                ));
            }
        }
        Ok(())
    }

    /// Client credentials are only needed by commands that talk to HMRC.
    pub fn require_credentials(&self) -> Result<(), ConfigError> {
        if self.client_id.trim().is_empty() || self.client_secret.trim().is_empty() {
            return Err(ConfigError::invalid(
                "hmrc",
                "client_id and client_secret are required (MTD__HMRC__CLIENT_ID, MTD__HMRC__CLIENT_SECRET)",
            ));
        }
        Ok(())
    }

    pub fn client_config(&self) -> HmrcClientConfig {
        let config = HmrcClientConfig::new(self.environment, &self.client_id, &self.client_secret)
            .with_timeout(Duration::from_secs(self.request_timeout_secs));
        match &self.base_url {
            Some(url) => config.with_base_url(url),
            None => config,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8000,
            multiplier: 2.0,
        }
    }
}

impl RetrySettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid("retry", "max_attempts must be at least 1"));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ConfigError::invalid("retry", "multiplier must be at least 1.0"));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(ConfigError::invalid(
                "retry",
                "initial_backoff_ms must not exceed max_backoff_ms",
            ));
        }
        Ok(())
    }

    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
            self.multiplier,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PollingSettings {
    pub enabled: bool,
    pub interval_ms: u64,
    pub timeout_secs: u64,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 2000,
            timeout_secs: 30,
        }
    }
}

impl PollingSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_ms == 0 {
            return Err(ConfigError::invalid("polling", "interval_ms must be positive"));
        }
        if self.timeout_secs.saturating_mul(1000) < self.interval_ms {
            return Err(ConfigError::invalid(
                "polling",
                "timeout_secs must allow at least one poll interval",
            ));
        }
        Ok(())
    }

    pub fn policy(&self) -> Option<PollPolicy> {
        self.enabled.then(|| PollPolicy {
            interval: Duration::from_millis(self.interval_ms),
            timeout: Duration::from_secs(self.timeout_secs),
        })
    }
}

#[derive(Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseSettings,
    pub hmrc: HmrcSettings,
    pub vendor: VendorMetadata,
    pub retry: RetrySettings,
    pub polling: PollingSettings,
    /// 64 hex characters. Only commands that read or write tokens need it.
    pub encryption_key: Option<String>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("database", &self.database)
            .field("hmrc", &self.hmrc)
            .field("vendor", &self.vendor)
            .field("retry", &self.retry)
            .field("polling", &self.polling)
            .field("encryption_key", &self.encryption_key.as_ref().map(|_| ".."))
            .finish()
    }
}

impl AppConfig {
    /// Loads and validates the configuration. An explicit `path` must
    /// exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        let settings = Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;
        Self::from_settings(settings)
    }

    /// Defaults overlaid with a TOML document. No environment lookup.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        Self::from_settings(settings)
    }

    fn from_settings(settings: Config) -> Result<Self, ConfigError> {
        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate()?;
        self.hmrc.validate()?;
        self.retry.validate()?;
        self.polling.validate()?;
        if self.vendor.name.trim().is_empty() || self.vendor.product_name.trim().is_empty() {
            return Err(ConfigError::invalid(
                "vendor",
                "name and product_name must not be empty",
            ));
        }
        Ok(())
    }

    /// The token cipher, from `encryption_key`.
    pub fn cipher(&self) -> Result<AesGcmCipher, ConfigError> {
        let key = self.encryption_key.as_deref().ok_or_else(|| {
            ConfigError::invalid(
                "encryption_key",
                "an encryption key is required (set MTD__ENCRYPTION_KEY to 64 hex characters)",
            )
        })?;
        if key.trim().len() != 64 {
            return Err(ConfigError::invalid(
                "encryption_key",
                format!("expected 64 hex characters, got {}", key.trim().len()),
            ));
        }
        AesGcmCipher::from_hex(key).map_err(|e| ConfigError::invalid("encryption_key", e.to_string()))
    }
}
