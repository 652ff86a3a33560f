use async_trait::async_trait;
use mtd_core::auth::{TokenEndpoint, TokenEndpointError, TokenGrant};
use tracing::{debug, warn};

use crate::environment::{ClientConfigError, HmrcClientConfig};
use crate::response::{parse_token_grant, token_error};

/// HMRC's OAuth 2.0 server.
pub struct HmrcTokenEndpoint {
    http: reqwest::Client,
    config: HmrcClientConfig,
}

impl HmrcTokenEndpoint {
    pub fn new(config: HmrcClientConfig) -> Result<Self, ClientConfigError> {
        Ok(Self {
            http: config.http_client()?,
            config,
        })
    }

    fn token_url(&self) -> String {
        format!("{}/oauth/token", self.config.base_url)
    }

    async fn grant(
        &self,
        grant_type: &str,
        params: &[(&str, &str)],
    ) -> Result<TokenGrant, TokenEndpointError> {
        let mut form = vec![
            ("grant_type", grant_type),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        form.extend_from_slice(params);

        debug!(grant_type, "Requesting HMRC token");
        let resp = self
            .http
            .post(self.token_url())
            .form(&form)
            .send()
            .await
            .map_err(|e| TokenEndpointError::Transport(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            let err = token_error(status.as_u16(), &body);
            warn!(grant_type, status = status.as_u16(), error = %err, "HMRC token request failed");
            return Err(err);
        }
        parse_token_grant(&body)
    }
}

#[async_trait]
impl TokenEndpoint for HmrcTokenEndpoint {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, TokenEndpointError> {
        self.grant("refresh_token", &[("refresh_token", refresh_token)]).await
    }

    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenGrant, TokenEndpointError> {
        self.grant(
            "authorization_code",
            &[("code", code), ("redirect_uri", redirect_uri)],
        )
        .await
    }

    async fn revoke(&self, refresh_token: &str) -> Result<(), TokenEndpointError> {
        let form = [
            ("token", refresh_token),
            ("token_type_hint", "refresh_token"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        let resp = self
            .http
            .post(format!("{}/oauth/revoke", self.config.base_url))
            .form(&form)
            .send()
            .await
            .map_err(|e| TokenEndpointError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(token_error(status.as_u16(), &body));
        }
        Ok(())
    }
}
