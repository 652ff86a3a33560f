use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// A successful response from the OAuth token endpoint.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    /// Some grants omit a new refresh token; the old one stays valid.
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    #[serde(default)]
    pub scope: Option<String>,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenEndpointError {
    /// The refresh token or authorization code is no longer valid.
    #[error("invalid_grant")]
    InvalidGrant,

    #[error("token endpoint rejected the request: {error}")]
    Rejected {
        error: String,
        description: Option<String>,
    },

    #[error("token endpoint unreachable: {0}")]
    Transport(String),
}

/// The OAuth server.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, TokenEndpointError>;

    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenGrant, TokenEndpointError>;

    async fn revoke(&self, refresh_token: &str) -> Result<(), TokenEndpointError>;
}
