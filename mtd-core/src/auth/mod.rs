pub mod cipher;
pub mod endpoint;
pub mod manager;

pub use cipher::{AesGcmCipher, CipherError, TokenCipher};
pub use endpoint::{TokenEndpoint, TokenEndpointError, TokenGrant};
pub use manager::{AccessToken, DEFAULT_EXPIRY_BUFFER_SECS, OAuthTokenManager};
