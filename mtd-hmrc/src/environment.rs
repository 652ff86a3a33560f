use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SANDBOX_BASE_URL: &str = "https://test-api.service.hmrc.gov.uk";
pub const PRODUCTION_BASE_URL: &str = "https://api.service.hmrc.gov.uk";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HmrcEnvironment {
    #[default]
    Sandbox,
    Production,
}

impl HmrcEnvironment {
    pub fn base_url(self) -> &'static str {
        match self {
            HmrcEnvironment::Sandbox => SANDBOX_BASE_URL,
            HmrcEnvironment::Production => PRODUCTION_BASE_URL,
        }
    }
}

impl fmt::Display for HmrcEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HmrcEnvironment::Sandbox => f.write_str("sandbox"),
            HmrcEnvironment::Production => f.write_str("production"),
        }
    }
}

impl FromStr for HmrcEnvironment {
    type Err = ClientConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sandbox" | "test" => Ok(HmrcEnvironment::Sandbox),
            "production" | "live" => Ok(HmrcEnvironment::Production),
            other => Err(ClientConfigError::UnknownEnvironment(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum ClientConfigError {
    #[error("unknown HMRC environment '{0}' (expected sandbox or production)")]
    UnknownEnvironment(String),

    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Connection settings shared by the token endpoint and the API client.
#[derive(Clone)]
pub struct HmrcClientConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub timeout: Duration,
}

impl HmrcClientConfig {
    pub fn new(
        environment: HmrcEnvironment,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            base_url: environment.base_url().to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) fn http_client(&self) -> Result<reqwest::Client, ClientConfigError> {
        Ok(reqwest::Client::builder().timeout(self.timeout).build()?)
    }
}

impl fmt::Debug for HmrcClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HmrcClientConfig")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
