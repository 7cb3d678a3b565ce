use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

/// A wrapper for sensitive passenger data that masks its value in Debug and Display output.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Masked<T>(pub T);

impl<T> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // Status responses carry the real value back to the passenger; only log
        // formatting is masked.
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn expose(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PiiError {
    #[error("Invalid PII key: {0}")]
    InvalidKey(String),
    #[error("Encryption failed: {0}")]
    Encrypt(String),
    #[error("Decryption failed: {0}")]
    Decrypt(String),
}

/// Reversible cipher applied to sensitive passenger fields before they are persisted.
pub trait PiiCipher: Send + Sync {
    fn encode(&self, plaintext: &str) -> Result<String, PiiError>;
    fn decode(&self, ciphertext: &str) -> Result<String, PiiError>;
}

const NONCE_LEN: usize = 12;

/// AES-256-GCM cipher. Output is base64 of `nonce || ciphertext`.
#[derive(Clone)]
pub struct AesGcmCipher {
    cipher: Arc<Aes256Gcm>,
}

impl AesGcmCipher {
    pub fn new(key: &[u8]) -> Result<Self, PiiError> {
        if key.len() != 32 {
            return Err(PiiError::InvalidKey(format!(
                "expected 32 bytes, got {}",
                key.len()
            )));
        }
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| PiiError::InvalidKey(e.to_string()))?;
        Ok(Self {
            cipher: Arc::new(cipher),
        })
    }

    /// Build from a base64-encoded 32 byte key, as stored in configuration.
    pub fn from_base64_key(encoded: &str) -> Result<Self, PiiError> {
        let key = STANDARD
            .decode(encoded.trim())
            .map_err(|e| PiiError::InvalidKey(e.to_string()))?;
        Self::new(&key)
    }
}

impl PiiCipher for AesGcmCipher {
    fn encode(&self, plaintext: &str) -> Result<String, PiiError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| PiiError::Encrypt(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }

    fn decode(&self, ciphertext: &str) -> Result<String, PiiError> {
        let sealed = STANDARD
            .decode(ciphertext)
            .map_err(|e| PiiError::Decrypt(e.to_string()))?;
        if sealed.len() <= NONCE_LEN {
            return Err(PiiError::Decrypt("ciphertext too short".to_string()));
        }

        let (nonce_bytes, body) = sealed.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = self
            .cipher
            .decrypt(nonce, body)
            .map_err(|e| PiiError::Decrypt(e.to_string()))?;

        String::from_utf8(plaintext).map_err(|e| PiiError::Decrypt(e.to_string()))
    }
}
