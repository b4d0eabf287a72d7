//! # User Directory Handlers
//!
//! - `GET /api/users` - Everyone known to the server except the caller

use crate::chat::ChatService;
use crate::middleware::AuthUser;
use axum::extract::{Extension, State};
use axum::Json;
use lib_core::dto::UsersResponse;
use std::sync::Arc;
use tracing::debug;

/// Directory users with their live status. The caller is left out.
///
/// **Route**: `GET /api/users` (Bearer token)
///
/// ```json
/// { "users": [ { "username": "bob", "status": "idle", "avatar": "/assets/Uzaylı_3.png" } ] }
/// ```
pub async fn list_users(
    State(service): State<Arc<ChatService>>,
    Extension(user): Extension<AuthUser>,
) -> Json<UsersResponse> {
    let users = service.user_list(Some(&user.username)).await;
    debug!(username = %user.username, count = users.len(), "[HTTP] User list requested");
    Json(UsersResponse { users })
}
