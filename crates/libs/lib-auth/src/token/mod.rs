//! # JWT Token Management
//!
//! Tokens are issued by the account service; this server only verifies them.
//! [`encode_jwt`] exists for the `issue-token` utility and for tests.

use crate::error::AuthError;
use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// JWT Claims structure containing user authentication information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (username)
    pub sub: String,
    /// Username
    pub username: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at time (Unix timestamp)
    pub iat: i64,
}

/// Encode a JWT token for `username`.
pub fn encode_jwt(username: &str, secret: &str, expiration_hours: i64) -> Result<String, AuthError> {
    let now = Utc::now();
    let exp = now + Duration::hours(expiration_hours);

    let claims = Claims {
        sub: username.to_string(),
        username: username.to_string(),
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AuthError::Encode(e.to_string()))
}

/// Decode and validate a JWT token, including its expiry.
pub fn decode_jwt(token: &str, secret: &str) -> Result<Claims, AuthError> {
    if token.trim().is_empty() {
        return Err(AuthError::MissingToken);
    }

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        _ => AuthError::Invalid(e.to_string()),
    })?;

    Ok(token_data.claims)
}
