//! Token cipher for OAuth tokens at rest.
//!
//! Tokens are sealed with AES-256-GCM under a 32-byte key taken from the
//! plugin configuration. Each call uses a fresh random nonce; the nonce is
//! prepended to the ciphertext and the whole blob is base64-encoded so it can
//! sit inside a JSON record.
//!
//! ```text
//! base64( nonce[12] || ciphertext || tag[16] )
//! ```
//!
//! A decrypt failure means the record was tampered with or the key changed.
//! Callers must force the user to re-connect rather than drop the error.

mod encryption;

pub use encryption::{decrypt, encrypt, validate_key};

use crate::error::BridgeError;

/// Encrypts and decrypts token strings under one key.
#[derive(Clone)]
pub struct TokenCipher {
    key: Vec<u8>,
}

impl TokenCipher {
    /// Build a cipher from the base64-encoded key in the configuration.
    pub fn from_base64(key_base64: &str) -> Result<Self, BridgeError> {
        let key = validate_key(key_base64)
            .map_err(|e| BridgeError::CryptoError(format!("{:#}", e)))?;
        Ok(Self { key })
    }

    /// Build a cipher from raw key bytes. Fails unless the key is 32 bytes.
    pub fn from_bytes(key: &[u8]) -> Result<Self, BridgeError> {
        if key.len() != encryption::KEY_SIZE {
            return Err(BridgeError::CryptoError(format!(
                "Encryption key must be {} bytes, got {}",
                encryption::KEY_SIZE,
                key.len()
            )));
        }
        Ok(Self { key: key.to_vec() })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, BridgeError> {
        encrypt(plaintext, &self.key).map_err(|e| BridgeError::CryptoError(format!("{:#}", e)))
    }

    pub fn decrypt(&self, ciphertext: &str) -> Result<String, BridgeError> {
        decrypt(ciphertext, &self.key).map_err(|e| BridgeError::CryptoError(format!("{:#}", e)))
    }
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCipher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

    #[test]
    fn test_cipher_from_base64() {
        let key = BASE64.encode([3u8; 32]);
        let cipher = TokenCipher::from_base64(&key).unwrap();

        let sealed = cipher.encrypt("EwB4A8l6BAAU").unwrap();
        assert_ne!(sealed, "EwB4A8l6BAAU");
        assert_eq!(cipher.decrypt(&sealed).unwrap(), "EwB4A8l6BAAU");
    }

    #[test]
    fn test_cipher_rejects_bad_keys() {
        assert!(matches!(
            TokenCipher::from_base64("short"),
            Err(BridgeError::CryptoError(_))
        ));
        assert!(matches!(
            TokenCipher::from_bytes(&[0u8; 16]),
            Err(BridgeError::CryptoError(_))
        ));
    }

    #[test]
    fn test_wrong_key_is_crypto_error() {
        let a = TokenCipher::from_bytes(&[1u8; 32]).unwrap();
        let b = TokenCipher::from_bytes(&[2u8; 32]).unwrap();

        let sealed = a.encrypt("token").unwrap();
        assert!(matches!(b.decrypt(&sealed), Err(BridgeError::CryptoError(_))));
    }

    #[test]
    fn test_debug_hides_key() {
        let cipher = TokenCipher::from_bytes(&[9u8; 32]).unwrap();
        assert!(!format!("{:?}", cipher).contains('9'));
    }
}
