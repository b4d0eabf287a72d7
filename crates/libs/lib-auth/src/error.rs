//! # Auth Errors

use thiserror::Error;

/// Failure to turn a credential into a username.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Token is missing")]
    MissingToken,

    #[error("Token has expired. Please log in again.")]
    Expired,

    #[error("Invalid token: {0}")]
    Invalid(String),

    #[error("Failed to encode token: {0}")]
    Encode(String),
}

/// Failure to encrypt or decrypt a chat message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("Message key must be {expected} bytes, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("Message key is not valid base64")]
    KeyEncoding,

    #[error("Ciphertext is malformed")]
    Malformed,

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed (wrong key or corrupted data)")]
    DecryptionFailed,
}
