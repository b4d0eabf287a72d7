//! # Authentication Library
//!
//! Credential verification (JWT) and at-rest message encryption.

pub mod cipher;
pub mod error;
pub mod token;
pub mod verifier;

// Re-export commonly used types
pub use cipher::MessageCipher;
pub use error::{AuthError, CipherError};
pub use token::{decode_jwt, encode_jwt, Claims};
pub use verifier::{IdentityVerifier, JwtVerifier};
