//! # Message Encryption
//!
//! AES-256-GCM encryption for chat messages at rest.
//!
//! Stored format: `base64(nonce || ciphertext)` with a random 96-bit nonce per
//! message.

use crate::error::CipherError;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use lib_utils::{b64_decode, b64_encode};

/// AES-256 key length in bytes
pub const KEY_LEN: usize = 32;

/// AES-GCM nonce length in bytes (96-bit)
const NONCE_LEN: usize = 12;

/// Symmetric cipher shared by every chat room.
#[derive(Clone)]
pub struct MessageCipher {
    cipher: Aes256Gcm,
}

impl MessageCipher {
    /// Build a cipher from raw key bytes.
    pub fn new(key: &[u8]) -> Result<Self, CipherError> {
        if key.len() != KEY_LEN {
            return Err(CipherError::InvalidKeyLength {
                expected: KEY_LEN,
                got: key.len(),
            });
        }
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CipherError::InvalidKeyLength {
            expected: KEY_LEN,
            got: key.len(),
        })?;
        Ok(Self { cipher })
    }

    /// Build a cipher from a base64 key, as found in `MESSAGE_KEY`.
    pub fn from_base64(key_b64: &str) -> Result<Self, CipherError> {
        let key = b64_decode(key_b64).map_err(|_| CipherError::KeyEncoding)?;
        Self::new(&key)
    }

    /// Generate a fresh random key, base64 encoded.
    pub fn generate_key() -> String {
        let key = Aes256Gcm::generate_key(OsRng);
        b64_encode(key.as_slice())
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CipherError::EncryptionFailed)?;

        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(nonce.as_slice());
        payload.extend_from_slice(&ciphertext);
        Ok(b64_encode(payload))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String, CipherError> {
        let payload = b64_decode(encoded).map_err(|_| CipherError::Malformed)?;
        if payload.len() <= NONCE_LEN {
            return Err(CipherError::Malformed);
        }
        let (nonce, ciphertext) = payload.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CipherError::DecryptionFailed)?;
        String::from_utf8(plaintext).map_err(|_| CipherError::Malformed)
    }
}

impl std::fmt::Debug for MessageCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageCipher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> MessageCipher {
        MessageCipher::new(&[7u8; KEY_LEN]).unwrap()
    }

    #[test]
    fn test_encrypt_then_decrypt() {
        let c = cipher();
        let encoded = c.encrypt("merhaba dünya").unwrap();
        assert_ne!(encoded, "merhaba dünya");
        assert_eq!(c.decrypt(&encoded).unwrap(), "merhaba dünya");
    }

    #[test]
    fn test_nonce_is_fresh_per_message() {
        let c = cipher();
        assert_ne!(c.encrypt("same").unwrap(), c.encrypt("same").unwrap());
    }

    #[test]
    fn test_wrong_key_fails() {
        let encoded = cipher().encrypt("secret").unwrap();
        let other = MessageCipher::new(&[9u8; KEY_LEN]).unwrap();
        assert_eq!(other.decrypt(&encoded).unwrap_err(), CipherError::DecryptionFailed);
    }

    #[test]
    fn test_rejects_short_key_and_bad_payload() {
        assert!(matches!(
            MessageCipher::new(&[1u8; 16]),
            Err(CipherError::InvalidKeyLength { expected: 32, got: 16 })
        ));
        assert_eq!(cipher().decrypt("AAAA").unwrap_err(), CipherError::Malformed);
    }

    #[test]
    fn test_generated_key_is_usable() {
        let key = MessageCipher::generate_key();
        assert!(MessageCipher::from_base64(&key).is_ok());
    }
}
