//! # HTTP Request Handlers
//!
//! Axum handlers for the chat server, one module per surface.
//!
//! ## Handler Modules
//!
//! - **[`websocket`]**: the chat connection
//!   - `GET /api/ws/chat?token=<jwt>` - Authenticated WebSocket upgrade
//!
//! - **[`users`]**: directory queries
//!   - `GET /api/users` - Everyone except the caller, with live status
//!
//! ## Authentication
//!
//! `/api/users` sits behind [`crate::middleware::require_auth`] and reads the
//! caller from `Extension<AuthUser>`. Browsers cannot set headers on a
//! WebSocket handshake, so the chat route takes its token from the query
//! string and verifies it before upgrading.
//!
//! ## Error Handling
//!
//! Handlers return [`lib_core::AppError`], which renders as
//! `{ "error": "...", "code": "..." }` with the matching status.

pub mod users;
pub mod websocket;
