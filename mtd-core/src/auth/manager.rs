//! Per-user OAuth tokens: load, refresh when near expiry, persist.
//!
//! Every operation on a user's row runs under that user's lock, so at most
//! one refresh is in flight per user. A caller that waited on the lock
//! re-reads the row and finds the token its predecessor stored.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::cipher::TokenCipher;
use super::endpoint::{TokenEndpoint, TokenEndpointError, TokenGrant};
use crate::db::{AuthorizationStore, RepositoryError};
use crate::error::MtdError;
use crate::models::HmrcAuthorization;

/// Refresh when the access token expires within this many seconds.
pub const DEFAULT_EXPIRY_BUFFER_SECS: i64 = 300;

/// A decrypted access token. Only [`secret`](Self::secret) exposes it.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(..)")
    }
}

pub struct OAuthTokenManager {
    store: Arc<dyn AuthorizationStore>,
    endpoint: Arc<dyn TokenEndpoint>,
    cipher: Arc<dyn TokenCipher>,
    expiry_buffer: Duration,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl OAuthTokenManager {
    pub fn new(
        store: Arc<dyn AuthorizationStore>,
        endpoint: Arc<dyn TokenEndpoint>,
        cipher: Arc<dyn TokenCipher>,
    ) -> Self {
        Self {
            store,
            endpoint,
            cipher,
            expiry_buffer: Duration::seconds(DEFAULT_EXPIRY_BUFFER_SECS),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_expiry_buffer(mut self, buffer: Duration) -> Self {
        self.expiry_buffer = buffer;
        self
    }

    async fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .await
            .entry(user_id.to_string())
            .or_default()
            .clone()
    }

    async fn load(&self, user_id: &str) -> Result<Option<HmrcAuthorization>, MtdError> {
        match self.store.get_authorization(user_id).await {
            Ok(auth) => Ok(Some(auth)),
            Err(RepositoryError::NotFound) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// A valid access token for `user_id`, refreshing it first when it is
    /// about to expire.
    ///
    /// # Errors
    /// * [`MtdError::NotAuthorized`] when the user has no stored grant.
    /// * [`MtdError::ReauthorizationRequired`] when the refresh token was
    ///   revoked.
    /// * [`MtdError::TransientTransport`] for any other refresh failure.
    pub async fn get_access_token(&self, user_id: &str) -> Result<AccessToken, MtdError> {
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        let auth = self
            .load(user_id)
            .await?
            .ok_or_else(|| MtdError::NotAuthorized {
                user_id: user_id.to_string(),
            })?;

        if !auth.expires_within(Utc::now(), self.expiry_buffer) {
            debug!(user_id, expires_at = %auth.expires_at, "Using stored access token");
            return Ok(AccessToken(self.cipher.decrypt(&auth.access_token)?));
        }

        info!(user_id, expires_at = %auth.expires_at, "Refreshing access token");
        let refresh_token = self.cipher.decrypt(&auth.refresh_token)?;
        let grant = self
            .endpoint
            .refresh(&refresh_token)
            .await
            .map_err(|err| endpoint_error(user_id, err))?;

        self.persist(user_id, grant, Some(auth)).await
    }

    /// Stores a fresh grant, e.g. after the authorization-code exchange.
    pub async fn store_grant(&self, user_id: &str, grant: TokenGrant) -> Result<(), MtdError> {
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        let existing = self.load(user_id).await?;
        self.persist(user_id, grant, existing).await.map(|_| ())
    }

    /// Completes the OAuth consent flow for `user_id`.
    pub async fn exchange_code(
        &self,
        user_id: &str,
        code: &str,
        redirect_uri: &str,
    ) -> Result<(), MtdError> {
        let grant = self
            .endpoint
            .exchange_code(code, redirect_uri)
            .await
            .map_err(|err| endpoint_error(user_id, err))?;
        info!(user_id, "Authorization code exchanged");
        self.store_grant(user_id, grant).await
    }

    /// Revokes the refresh token (best effort) and deletes the stored row.
    pub async fn disconnect(&self, user_id: &str) -> Result<(), MtdError> {
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        let Some(auth) = self.load(user_id).await? else {
            debug!(user_id, "Nothing to disconnect");
            return Ok(());
        };

        match self.cipher.decrypt(&auth.refresh_token) {
            Ok(refresh_token) => {
                if let Err(err) = self.endpoint.revoke(&refresh_token).await {
                    warn!(user_id, error = %err, "Token revocation failed; deleting anyway");
                }
            }
            Err(err) => warn!(user_id, error = %err, "Stored refresh token unreadable; skipping revocation"),
        }

        self.store.delete_authorization(user_id).await?;
        info!(user_id, "Disconnected from HMRC");
        Ok(())
    }

    pub async fn is_connected(&self, user_id: &str) -> Result<bool, MtdError> {
        Ok(self.load(user_id).await?.is_some())
    }

    async fn persist(
        &self,
        user_id: &str,
        grant: TokenGrant,
        existing: Option<HmrcAuthorization>,
    ) -> Result<AccessToken, MtdError> {
        let now = Utc::now();
        let expires_at = Duration::try_seconds(grant.expires_in)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| {
                MtdError::Validation(format!(
                    "token grant expires_in {} is out of range",
                    grant.expires_in
                ))
            })?;

        let refresh_token = match (&grant.refresh_token, &existing) {
            (Some(token), _) => self.cipher.encrypt(token)?,
            (None, Some(auth)) => auth.refresh_token.clone(),
            (None, None) => {
                return Err(MtdError::Validation(
                    "token grant carries no refresh token".to_string(),
                ));
            }
        };

        let auth = HmrcAuthorization {
            user_id: user_id.to_string(),
            access_token: self.cipher.encrypt(&grant.access_token)?,
            refresh_token,
            expires_at,
            scope: grant
                .scope
                .or_else(|| existing.as_ref().and_then(|a| a.scope.clone())),
            created_at: existing.as_ref().map_or(now, |a| a.created_at),
            updated_at: now,
        };

        self.store.upsert_authorization(&auth).await?;
        debug!(user_id, expires_at = %auth.expires_at, "Stored access token");
        Ok(AccessToken(grant.access_token))
    }
}

fn endpoint_error(user_id: &str, err: TokenEndpointError) -> MtdError {
    match err {
        TokenEndpointError::InvalidGrant => {
            warn!(user_id, "Refresh token rejected; re-authorization required");
            MtdError::ReauthorizationRequired {
                user_id: user_id.to_string(),
            }
        }
        other => MtdError::TransientTransport(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::auth::AesGcmCipher;
    use crate::db::InMemoryStore;

    // ── fakes ────────────────────────────────────────────────────────────
    #[derive(Default)]
    struct FakeEndpoint {
        refreshes: AtomicUsize,
        revocations: AtomicUsize,
        fail_with: Option<TokenEndpointError>,
        omit_refresh_token: bool,
    }

    impl FakeEndpoint {
        fn failing(err: TokenEndpointError) -> Self {
            Self {
                fail_with: Some(err),
                ..Default::default()
            }
        }

        fn grant(&self, n: usize) -> TokenGrant {
            TokenGrant {
                access_token: format!("access-{n}"),
                refresh_token: (!self.omit_refresh_token).then(|| format!("refresh-{n}")),
                expires_in: 14_400,
                scope: Some("write:self-assessment".to_string()),
            }
        }
    }

    #[async_trait]
    impl TokenEndpoint for FakeEndpoint {
        async fn refresh(&self, _refresh_token: &str) -> Result<TokenGrant, TokenEndpointError> {
            let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            match &self.fail_with {
                Some(err) => Err(err.clone()),
                None => Ok(self.grant(n)),
            }
        }

        async fn exchange_code(
            &self,
            _code: &str,
            _redirect_uri: &str,
        ) -> Result<TokenGrant, TokenEndpointError> {
            Ok(self.grant(0))
        }

        async fn revoke(&self, _refresh_token: &str) -> Result<(), TokenEndpointError> {
            self.revocations.fetch_add(1, Ordering::SeqCst);
            match &self.fail_with {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            }
        }
    }

    fn cipher() -> Arc<AesGcmCipher> {
        Arc::new(AesGcmCipher::new_from_slice(&[42u8; 32]).unwrap())
    }

    fn manager(store: Arc<InMemoryStore>, endpoint: Arc<FakeEndpoint>) -> OAuthTokenManager {
        OAuthTokenManager::new(store, endpoint, cipher())
    }

    async fn seed(store: &InMemoryStore, expires_in: Duration) {
        let cipher = cipher();
        let now = Utc::now();
        store
            .upsert_authorization(&HmrcAuthorization {
                user_id: "user-1".to_string(),
                access_token: cipher.encrypt("stored-access").unwrap(),
                refresh_token: cipher.encrypt("stored-refresh").unwrap(),
                expires_at: now + expires_in,
                scope: Some("read:self-assessment".to_string()),
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
    }

    // ── get_access_token ─────────────────────────────────────────────────
    #[tokio::test]
    async fn fresh_token_is_returned_without_refresh() {
        let store = Arc::new(InMemoryStore::new());
        let endpoint = Arc::new(FakeEndpoint::default());
        seed(&store, Duration::hours(1)).await;

        let token = manager(store, endpoint.clone())
            .get_access_token("user-1")
            .await
            .unwrap();

        assert_eq!(token.secret(), "stored-access");
        assert_eq!(endpoint.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn token_inside_buffer_is_refreshed_and_persisted_encrypted() {
        let store = Arc::new(InMemoryStore::new());
        let endpoint = Arc::new(FakeEndpoint::default());
        seed(&store, Duration::minutes(4)).await;

        let token = manager(store.clone(), endpoint.clone())
            .get_access_token("user-1")
            .await
            .unwrap();

        assert_eq!(token.secret(), "access-1");
        let row = store.get_authorization("user-1").await.unwrap();
        assert!(!row.access_token.as_stored().contains("access-1"));
        assert_eq!(cipher().decrypt(&row.access_token).unwrap(), "access-1");
        assert_eq!(cipher().decrypt(&row.refresh_token).unwrap(), "refresh-1");
        assert!(row.expires_at > Utc::now() + Duration::hours(3));
        assert_eq!(row.scope.as_deref(), Some("write:self-assessment"));
    }

    #[tokio::test]
    async fn missing_row_is_not_authorized() {
        let store = Arc::new(InMemoryStore::new());

        let err = manager(store, Arc::new(FakeEndpoint::default()))
            .get_access_token("user-1")
            .await
            .unwrap_err();

        assert!(matches!(err, MtdError::NotAuthorized { user_id } if user_id == "user-1"));
    }

    #[tokio::test]
    async fn invalid_grant_requires_reauthorization() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, Duration::zero()).await;
        let endpoint = Arc::new(FakeEndpoint::failing(TokenEndpointError::InvalidGrant));

        let err = manager(store, endpoint)
            .get_access_token("user-1")
            .await
            .unwrap_err();

        assert!(matches!(err, MtdError::ReauthorizationRequired { .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn other_refresh_failures_are_retryable() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, Duration::zero()).await;
        let endpoint = Arc::new(FakeEndpoint::failing(TokenEndpointError::Transport(
            "connection reset".to_string(),
        )));

        let err = manager(store, endpoint)
            .get_access_token("user-1")
            .await
            .unwrap_err();

        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let store = Arc::new(InMemoryStore::new());
        let endpoint = Arc::new(FakeEndpoint::default());
        seed(&store, Duration::minutes(1)).await;
        let manager = manager(store, endpoint.clone());

        let (a, b, c) = tokio::join!(
            manager.get_access_token("user-1"),
            manager.get_access_token("user-1"),
            manager.get_access_token("user-1"),
        );

        assert_eq!(endpoint.refreshes.load(Ordering::SeqCst), 1);
        for token in [a, b, c] {
            assert_eq!(token.unwrap().secret(), "access-1");
        }
    }

    #[tokio::test]
    async fn refresh_without_new_refresh_token_keeps_old_one() {
        let store = Arc::new(InMemoryStore::new());
        let endpoint = Arc::new(FakeEndpoint {
            omit_refresh_token: true,
            ..Default::default()
        });
        seed(&store, Duration::zero()).await;

        manager(store.clone(), endpoint)
            .get_access_token("user-1")
            .await
            .unwrap();

        let row = store.get_authorization("user-1").await.unwrap();
        assert_eq!(cipher().decrypt(&row.refresh_token).unwrap(), "stored-refresh");
    }

    // ── grants and disconnect ────────────────────────────────────────────
    #[tokio::test]
    async fn exchange_code_stores_grant() {
        let store = Arc::new(InMemoryStore::new());
        let manager = manager(store.clone(), Arc::new(FakeEndpoint::default()));

        manager
            .exchange_code("user-2", "code", "http://localhost/callback")
            .await
            .unwrap();

        assert!(manager.is_connected("user-2").await.unwrap());
        assert_eq!(
            manager.get_access_token("user-2").await.unwrap().secret(),
            "access-0"
        );
    }

    #[tokio::test]
    async fn first_grant_without_refresh_token_is_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let manager = manager(store, Arc::new(FakeEndpoint::default()));

        let err = manager
            .store_grant(
                "user-3",
                TokenGrant {
                    access_token: "a".to_string(),
                    refresh_token: None,
                    expires_in: 60,
                    scope: None,
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, MtdError::Validation(_)));
    }

    #[tokio::test]
    async fn out_of_range_expiry_is_rejected_without_storing() {
        let store = Arc::new(InMemoryStore::new());
        let manager = manager(store, Arc::new(FakeEndpoint::default()));

        let err = manager
            .store_grant(
                "user-4",
                TokenGrant {
                    access_token: "a".to_string(),
                    refresh_token: Some("r".to_string()),
                    expires_in: i64::MAX,
                    scope: None,
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, MtdError::Validation(_)));
        assert!(!manager.is_connected("user-4").await.unwrap());
    }

    #[tokio::test]
    async fn disconnect_revokes_and_deletes() {
        let store = Arc::new(InMemoryStore::new());
        let endpoint = Arc::new(FakeEndpoint::default());
        seed(&store, Duration::hours(1)).await;
        let manager = manager(store, endpoint.clone());

        manager.disconnect("user-1").await.unwrap();

        assert_eq!(endpoint.revocations.load(Ordering::SeqCst), 1);
        assert!(!manager.is_connected("user-1").await.unwrap());
    }

    #[tokio::test]
    async fn disconnect_deletes_even_when_revocation_fails() {
        let store = Arc::new(InMemoryStore::new());
        let endpoint = Arc::new(FakeEndpoint::failing(TokenEndpointError::Transport(
            "down".to_string(),
        )));
        seed(&store, Duration::hours(1)).await;
        let manager = manager(store, endpoint);

        manager.disconnect("user-1").await.unwrap();

        assert!(!manager.is_connected("user-1").await.unwrap());
    }

    #[test]
    fn access_token_debug_is_redacted() {
        assert_eq!(format!("{:?}", AccessToken::new("secret")), "AccessToken(..)");
    }
}
