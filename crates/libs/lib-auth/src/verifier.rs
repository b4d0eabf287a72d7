//! # Identity Verification
//!
//! The chat core only needs "credential in, username out". [`JwtVerifier`] is
//! the production implementation; tests can substitute their own.

use crate::error::AuthError;
use crate::token::decode_jwt;
use tracing::debug;

/// Resolves an opaque credential to a username.
pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, credential: &str) -> Result<String, AuthError>;
}

/// HS256 JWT verifier sharing its secret with the account service.
#[derive(Clone)]
pub struct JwtVerifier {
    secret: String,
}

impl JwtVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl IdentityVerifier for JwtVerifier {
    fn verify(&self, credential: &str) -> Result<String, AuthError> {
        let claims = decode_jwt(credential, &self.secret)?;
        if claims.username.trim().is_empty() {
            return Err(AuthError::Invalid("token has no username".to_string()));
        }
        debug!("[AUTH] Verified token for {}", claims.username);
        Ok(claims.username)
    }
}

impl std::fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtVerifier").finish_non_exhaustive()
    }
}
