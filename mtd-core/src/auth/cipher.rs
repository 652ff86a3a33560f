use std::fmt;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use thiserror::Error;

use crate::models::EncryptedSecret;

const NONCE_LEN: usize = 12;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("encryption key must be 32 bytes (64 hex characters): {0}")]
    InvalidKey(String),

    #[error("failed to encrypt token")]
    Encrypt,

    /// Wrong key, or the stored value was tampered with.
    #[error("failed to decrypt token")]
    Decrypt,

    #[error("stored token is malformed: {0}")]
    Malformed(String),
}

/// Encrypts tokens for storage and decrypts them at the point of use.
pub trait TokenCipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<EncryptedSecret, CipherError>;
    fn decrypt(&self, secret: &EncryptedSecret) -> Result<String, CipherError>;
}

/// AES-256-GCM with a random nonce per value. Stored form is
/// `hex(nonce || ciphertext)`.
#[derive(Clone)]
pub struct AesGcmCipher {
    cipher: Aes256Gcm,
}

impl AesGcmCipher {
    pub fn new_from_slice(key: &[u8]) -> Result<Self, CipherError> {
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|_| CipherError::InvalidKey(format!("got {} bytes", key.len())))?;
        Ok(Self { cipher })
    }

    /// Key given as 64 hex characters.
    pub fn from_hex(key: &str) -> Result<Self, CipherError> {
        let bytes = hex::decode(key.trim()).map_err(|e| CipherError::InvalidKey(e.to_string()))?;
        Self::new_from_slice(&bytes)
    }
}

impl fmt::Debug for AesGcmCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AesGcmCipher(..)")
    }
}

impl TokenCipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &str) -> Result<EncryptedSecret, CipherError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CipherError::Encrypt)?;

        let mut stored = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        stored.extend_from_slice(&nonce);
        stored.extend_from_slice(&ciphertext);
        Ok(EncryptedSecret::from_stored(hex::encode(stored)))
    }

    fn decrypt(&self, secret: &EncryptedSecret) -> Result<String, CipherError> {
        let bytes =
            hex::decode(secret.as_stored()).map_err(|e| CipherError::Malformed(e.to_string()))?;
        if bytes.len() <= NONCE_LEN {
            return Err(CipherError::Malformed("value is too short".to_string()));
        }
        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CipherError::Decrypt)?;
        String::from_utf8(plaintext).map_err(|e| CipherError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    fn cipher() -> AesGcmCipher {
        AesGcmCipher::from_hex(KEY).unwrap()
    }

    #[test]
    fn decrypt_recovers_plaintext() {
        let secret = cipher().encrypt("access-token-123").unwrap();

        assert_eq!(cipher().decrypt(&secret).unwrap(), "access-token-123");
    }

    #[test]
    fn stored_form_hides_plaintext_and_varies_per_call() {
        let a = cipher().encrypt("same").unwrap();
        let b = cipher().encrypt("same").unwrap();

        assert!(!a.as_stored().contains("same"));
        assert_ne!(a.as_stored(), b.as_stored());
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let secret = cipher().encrypt("token").unwrap();
        let other = AesGcmCipher::new_from_slice(&[7u8; 32]).unwrap();

        assert_eq!(other.decrypt(&secret), Err(CipherError::Decrypt));
    }

    #[test]
    fn tampered_ciphertext_fails_to_decrypt() {
        let secret = cipher().encrypt("token").unwrap();
        let mut bytes = hex::decode(secret.as_stored()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;

        let tampered = EncryptedSecret::from_stored(hex::encode(bytes));

        assert_eq!(cipher().decrypt(&tampered), Err(CipherError::Decrypt));
    }

    #[test]
    fn short_or_non_hex_values_are_malformed() {
        assert!(matches!(
            cipher().decrypt(&EncryptedSecret::from_stored("zz")),
            Err(CipherError::Malformed(_))
        ));
        assert!(matches!(
            cipher().decrypt(&EncryptedSecret::from_stored("00ff")),
            Err(CipherError::Malformed(_))
        ));
    }

    #[test]
    fn key_must_be_32_bytes() {
        assert!(matches!(
            AesGcmCipher::from_hex("abcd"),
            Err(CipherError::InvalidKey(_))
        ));
        assert!(matches!(
            AesGcmCipher::from_hex("not hex"),
            Err(CipherError::InvalidKey(_))
        ));
    }
}
