//! # Chat Application State
//!
//! Shared by the WebSocket handler, the HTTP handlers and the auth middleware.

use super::service::ChatService;
use lib_auth::IdentityVerifier;
use std::sync::Arc;

#[derive(Clone)]
pub struct ChatAppState {
    pub service: Arc<ChatService>,
    pub verifier: Arc<dyn IdentityVerifier>,
}

impl ChatAppState {
    pub fn new(service: Arc<ChatService>, verifier: Arc<dyn IdentityVerifier>) -> Self {
        Self { service, verifier }
    }
}

impl axum::extract::FromRef<ChatAppState> for Arc<ChatService> {
    fn from_ref(state: &ChatAppState) -> Self {
        state.service.clone()
    }
}

impl axum::extract::FromRef<ChatAppState> for Arc<dyn IdentityVerifier> {
    fn from_ref(state: &ChatAppState) -> Self {
        state.verifier.clone()
    }
}
