//! Boundary to the encrypted secrets store (out of scope here — the
//! engine only ever calls `put`/`get`/`decrypt`). `AesGcmSecretsClient` is a
//! standalone stand-in so the engine is runnable without the production
//! secrets service wired in; real deployments inject their own
//! `SecretsClient` impl.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::RngCore;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecretsError {
    #[error("secret not found")]
    NotFound,
    #[error("encryption error: {0}")]
    Crypto(String),
    #[error("invalid ciphertext encoding")]
    InvalidEncoding,
}

#[async_trait]
pub trait SecretsClient: Send + Sync {
    /// Encrypt `plaintext` and return an opaque ciphertext blob.
    async fn put(&self, plaintext: &str) -> Result<String, SecretsError>;
    /// Decrypt a previously-stored ciphertext blob.
    async fn get(&self, ciphertext: &str) -> Result<String, SecretsError>;
    /// Alias for `get`, named to match the `put`/`get`/`decrypt` triad.
    async fn decrypt(&self, ciphertext: &str) -> Result<String, SecretsError> {
        self.get(ciphertext).await
    }
}

/// AES-256-GCM secrets client keyed by `ENCRYPTION_KEY` (32 raw bytes,
/// base64-encoded). Ciphertext encoding is `base64(nonce || tag || bytes)`.
pub struct AesGcmSecretsClient {
    cipher: Aes256Gcm,
}

impl AesGcmSecretsClient {
    pub fn new(key_b64: &str) -> Result<Self, SecretsError> {
        let key_bytes = BASE64
            .decode(key_b64)
            .map_err(|_| SecretsError::InvalidEncoding)?;
        if key_bytes.len() != 32 {
            return Err(SecretsError::Crypto(
                "ENCRYPTION_KEY must decode to 32 bytes".into(),
            ));
        }
        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Generate a fresh random key suitable for `ENCRYPTION_KEY`, for local
    /// development and tests.
    pub fn generate_key() -> String {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        BASE64.encode(key)
    }
}

#[async_trait]
impl SecretsClient for AesGcmSecretsClient {
    async fn put(&self, plaintext: &str) -> Result<String, SecretsError> {
        let mut nonce_bytes = [0u8; 12];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let mut ct = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| SecretsError::Crypto(e.to_string()))?;

        let mut blob = nonce_bytes.to_vec();
        blob.append(&mut ct);
        Ok(BASE64.encode(blob))
    }

    async fn get(&self, ciphertext: &str) -> Result<String, SecretsError> {
        let blob = BASE64
            .decode(ciphertext)
            .map_err(|_| SecretsError::InvalidEncoding)?;
        if blob.len() < 12 {
            return Err(SecretsError::InvalidEncoding);
        }
        let (nonce_bytes, ct) = blob.split_at(12);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = self
            .cipher
            .decrypt(nonce, ct)
            .map_err(|e| SecretsError::Crypto(e.to_string()))?;
        String::from_utf8(plaintext).map_err(|_| SecretsError::InvalidEncoding)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[tokio::test]
    async fn round_trips_plaintext() {
        let client = AesGcmSecretsClient::new(&AesGcmSecretsClient::generate_key())
            .expect("valid key should construct a client");
        let ciphertext = client.put("super-secret-token").await.expect("encrypt");
        assert_ne!(ciphertext, "super-secret-token");
        let plaintext = client.decrypt(&ciphertext).await.expect("decrypt");
        assert_eq!(plaintext, "super-secret-token");
    }

    #[tokio::test]
    async fn rejects_malformed_ciphertext() {
        let client = AesGcmSecretsClient::new(&AesGcmSecretsClient::generate_key())
            .expect("valid key should construct a client");
        let err = client.get("not-valid-base64!!").await.unwrap_err();
        assert!(matches!(err, SecretsError::InvalidEncoding));
    }
}
