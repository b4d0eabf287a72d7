//! # Web Library
//!
//! The chat orchestrator, its WebSocket and HTTP handlers, middleware, and
//! server startup.

pub mod chat;
pub mod handlers;
pub mod middleware;
pub mod server;

pub use chat::ChatAppState;
pub use server::{create_router, start_server, ServerConfig};
