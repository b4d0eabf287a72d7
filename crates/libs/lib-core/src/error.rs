//! # Centralized Error Handling
//!
//! [`AppError`] is the single error type flowing through the chat core, the
//! repositories and the HTTP handlers.
//!
//! ## Error Categories
//!
//! 1. **Client Errors** (4xx)
//!    - [`Unauthenticated`](AppError::Unauthenticated) → 401
//!    - [`InvalidInput`](AppError::InvalidInput) → 400
//!    - [`NotFound`](AppError::NotFound) → 404
//!    - [`InvalidState`](AppError::InvalidState) → 409
//!
//! 2. **Server Errors** (5xx)
//!    - [`Store`](AppError::Store), [`Crypto`](AppError::Crypto),
//!      [`Config`](AppError::Config), [`Internal`](AppError::Internal) → 500
//!    - [`Moderator`](AppError::Moderator) → 502, though the relay never
//!      surfaces it
//!
//! Over the WebSocket, errors are turned into an `error` event carrying
//! [`AppError::user_message`], sent only to the connection that caused them.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use lib_auth::{AuthError, CipherError};
use serde_json::json;
use thiserror::Error;

/// Convenience type alias for `Result<T, AppError>`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application-wide error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad, missing or expired credential.
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// The operation is not valid for the current presence or chat state.
    ///
    /// No state is mutated when this is returned.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Requested resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Persistence call failed.
    #[error("Store error: {0}")]
    Store(String),

    /// Message moderator unavailable or returned garbage.
    #[error("Moderator error: {0}")]
    Moderator(String),

    /// Message encryption or decryption failed.
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Invalid user input validation error.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error during startup or environment loading.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error (unexpected failures).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidState(_) => StatusCode::CONFLICT,
            AppError::Moderator(_) => StatusCode::BAD_GATEWAY,
            AppError::Store(_) | AppError::Crypto(_) | AppError::Config(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get a user-friendly error message.
    ///
    /// For server-side errors, returns a generic message to avoid exposing implementation details.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Unauthenticated(msg)
            | AppError::InvalidState(msg)
            | AppError::NotFound(msg)
            | AppError::InvalidInput(msg) => msg.clone(),
            AppError::Store(_) => "Could not save your changes, please try again".to_string(),
            AppError::Moderator(_) => "Service temporarily unavailable".to_string(),
            AppError::Crypto(_) | AppError::Config(_) | AppError::Internal(_) => {
                "An internal error occurred".to_string()
            }
        }
    }

    /// Variant name, used as the `code` field of HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthenticated(_) => "Unauthenticated",
            AppError::InvalidState(_) => "InvalidState",
            AppError::NotFound(_) => "NotFound",
            AppError::Store(_) => "Store",
            AppError::Moderator(_) => "Moderator",
            AppError::Crypto(_) => "Crypto",
            AppError::InvalidInput(_) => "InvalidInput",
            AppError::Config(_) => "Config",
            AppError::Internal(_) => "Internal",
        }
    }
}

/// Implement Axum's `IntoResponse` for automatic error handling.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.user_message();

        if status.is_server_error() {
            tracing::error!("Server error: {}", self);
        } else {
            tracing::debug!("Client error: {}", self);
        }

        let body = Json(json!({
            "error": message,
            "code": self.code(),
        }));

        (status, body).into_response()
    }
}

/// Convert `anyhow::Error` to `AppError`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Convert `sqlx::Error` to `AppError`.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Database record not found".to_string()),
            sqlx::Error::Database(db_err) => {
                AppError::Store(format!("Database error: {}", db_err.message()))
            }
            _ => AppError::Store(format!("Database error: {}", err)),
        }
    }
}

/// Convert `serde_json::Error` to `AppError`.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("Malformed event: {}", err))
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Unauthenticated(err.to_string())
    }
}

impl From<CipherError> for AppError {
    fn from(err: CipherError) -> Self {
        AppError::Crypto(err.to_string())
    }
}
