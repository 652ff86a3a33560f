use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ciphertext of a token as it sits in storage.
///
/// Stores only ever see this type; turning it back into a usable token
/// requires a [`crate::auth::TokenCipher`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedSecret(String);

impl EncryptedSecret {
    /// Wraps a value read back from storage. The value must already be
    /// ciphertext.
    pub fn from_stored(ciphertext: impl Into<String>) -> Self {
        Self(ciphertext.into())
    }

    pub fn as_stored(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EncryptedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptedSecret(..)")
    }
}

/// The single stored OAuth grant for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HmrcAuthorization {
    pub user_id: String,
    pub access_token: EncryptedSecret,
    pub refresh_token: EncryptedSecret,
    pub expires_at: DateTime<Utc>,
    pub scope: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl HmrcAuthorization {
    /// True when the access token expires within `buffer` of `now`.
    pub fn expires_within(&self, now: DateTime<Utc>, buffer: chrono::Duration) -> bool {
        self.expires_at <= now + buffer
    }
}
