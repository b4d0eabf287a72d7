//! # Authentication Middleware
//!
//! Bearer-token check for the HTTP routes.
//!
//! Extracts `Authorization: Bearer <token>`, resolves it to a username through
//! the shared [`IdentityVerifier`], and injects an [`AuthUser`] into the
//! request extensions.
//!
//! ```rust,ignore
//! let api = Router::new()
//!     .route("/api/users", get(list_users))
//!     .route_layer(axum::middleware::from_fn_with_state(state.clone(), require_auth));
//! ```

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use lib_auth::{AuthError, IdentityVerifier};
use lib_core::AppError;
use std::sync::Arc;
use tracing::{debug, warn};

/// The authenticated caller, available to handlers as `Extension<AuthUser>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub username: String,
}

/// Reject the request with `401` unless it carries a valid bearer token.
pub async fn require_auth(
    State(verifier): State<Arc<dyn IdentityVerifier>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| {
            warn!(path = %req.uri().path(), "[AUTH] Missing or malformed Authorization header");
            AppError::from(AuthError::MissingToken)
        })?;

    let username = verifier.verify(token).map_err(|e| {
        warn!(path = %req.uri().path(), error = %e, "[AUTH] Token rejected");
        AppError::from(e)
    })?;

    debug!("[AUTH] Authenticated user: {}", username);
    req.extensions_mut().insert(AuthUser { username });

    Ok(next.run(req).await)
}
