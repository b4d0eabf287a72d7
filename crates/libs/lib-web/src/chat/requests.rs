//! # Chat Request Broker
//!
//! Pending chat invitations. A request is `Pending` until it is accepted,
//! rejected or swept; all three remove it. Acceptance is only a claim: the
//! session manager re-validates both parties when it establishes the chat.

use super::clock::Clock;
use super::presence::PresenceRegistry;
use super::sessions::ChatSessionManager;
use chrono::{DateTime, TimeDelta, Utc};
use lib_core::{AppError, Result};
use lib_utils::validate_username;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub id: String,
    pub sender: String,
    pub target: String,
    pub created_at: DateTime<Utc>,
}

/// Outcome of [`ChatRequestBroker::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Unknown id, or the responder is not the target.
    Ignored,
    Accepted(ChatRequest),
    Rejected(ChatRequest),
}

pub struct ChatRequestBroker {
    pending: Mutex<HashMap<String, ChatRequest>>,
    clock: Arc<dyn Clock>,
    ttl: TimeDelta,
}

impl ChatRequestBroker {
    pub fn new(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            clock,
            ttl: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX),
        }
    }

    /// Store a request from `sender` to `target`.
    ///
    /// Fails if either user is in (or being put into) a chat, or if the target
    /// is offline. A sender may have several requests outstanding.
    pub async fn create(
        &self,
        sender: &str,
        target: &str,
        presence: &PresenceRegistry,
        sessions: &ChatSessionManager,
    ) -> Result<ChatRequest> {
        validate_username(target).map_err(AppError::InvalidInput)?;
        if sender == target {
            return Err(AppError::InvalidInput(
                "You cannot send a chat request to yourself".to_string(),
            ));
        }
        if sessions.is_occupied(sender).await {
            return Err(AppError::InvalidState("You are already in a chat".to_string()));
        }
        if !presence.is_connected(target).await {
            return Err(AppError::InvalidState(format!("{} is not online", target)));
        }
        if sessions.is_occupied(target).await {
            return Err(AppError::InvalidState(format!("{} is already in a chat", target)));
        }

        let request = ChatRequest {
            id: Uuid::new_v4().to_string(),
            sender: sender.to_string(),
            target: target.to_string(),
            created_at: self.clock.now(),
        };

        self.pending
            .lock()
            .await
            .insert(request.id.clone(), request.clone());

        info!(
            request_id = %request.id,
            sender,
            target,
            "[REQUEST] {} invited {}",
            sender,
            target
        );
        Ok(request)
    }

    /// Accept or reject a request. Only the target may act on it.
    pub async fn resolve(&self, request_id: &str, responder: &str, accept: bool) -> Resolution {
        let mut pending = self.pending.lock().await;

        match pending.get(request_id) {
            None => {
                debug!(request_id, responder, "[REQUEST] Unknown or expired request");
                Resolution::Ignored
            }
            Some(request) if request.target != responder => {
                debug!(
                    request_id,
                    responder,
                    target = %request.target,
                    "[REQUEST] Ignoring response from someone other than the target"
                );
                Resolution::Ignored
            }
            Some(_) => match pending.remove(request_id) {
                Some(request) if accept => {
                    info!(request_id, responder, "[REQUEST] Accepted");
                    Resolution::Accepted(request)
                }
                Some(request) => {
                    info!(request_id, responder, "[REQUEST] Rejected");
                    Resolution::Rejected(request)
                }
                None => Resolution::Ignored,
            },
        }
    }

    /// Drop every request at least `ttl` old. Nobody is notified.
    pub async fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut pending = self.pending.lock().await;
        let before = pending.len();
        pending.retain(|_, request| now - request.created_at < self.ttl);
        before - pending.len()
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Requests waiting on `target`, oldest first.
    pub async fn pending_for(&self, target: &str) -> Vec<ChatRequest> {
        let mut requests: Vec<ChatRequest> = self
            .pending
            .lock()
            .await
            .values()
            .filter(|r| r.target == target)
            .cloned()
            .collect();
        requests.sort_by_key(|r| r.created_at);
        requests
    }

    pub async fn get(&self, request_id: &str) -> Option<ChatRequest> {
        self.pending.lock().await.get(request_id).cloned()
    }
}
