//! # Message Relay
//!
//! Moderates, encrypts, stores and broadcasts a message inside an established
//! chat. Moderation can replace the text but never blocks delivery.

use super::moderation::MessageModerator;
use super::sessions::ChatSessionManager;
use lib_auth::MessageCipher;
use lib_core::dto::ServerEvent;
use lib_core::model::store::ChatStore;
use lib_core::{AppError, Result};
use lib_utils::chat_timestamp;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Which chat a message is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatTarget {
    ChatId(i64),
    Peer(String),
}

/// What was stored and broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredMessage {
    pub chat_id: i64,
    pub sender: String,
    pub message: String,
    pub time: String,
    /// How many room members the broadcast reached.
    pub recipients: usize,
}

pub struct MessageRelay {
    sessions: Arc<ChatSessionManager>,
    store: Arc<dyn ChatStore>,
    moderator: Arc<dyn MessageModerator>,
    cipher: MessageCipher,
    moderator_timeout: Duration,
    placeholder: String,
}

impl MessageRelay {
    pub fn new(
        sessions: Arc<ChatSessionManager>,
        store: Arc<dyn ChatStore>,
        moderator: Arc<dyn MessageModerator>,
        cipher: MessageCipher,
        moderator_timeout: Duration,
        placeholder: impl Into<String>,
    ) -> Self {
        Self {
            sessions,
            store,
            moderator,
            cipher,
            moderator_timeout,
            placeholder: placeholder.into(),
        }
    }

    pub async fn send(&self, username: &str, target: ChatTarget, plaintext: &str) -> Result<DeliveredMessage> {
        if plaintext.trim().is_empty() {
            return Err(AppError::InvalidInput("Message cannot be empty".to_string()));
        }

        let session = self
            .sessions
            .session_of(username)
            .await
            .filter(|session| match &target {
                ChatTarget::ChatId(chat_id) => session.chat_id == *chat_id,
                ChatTarget::Peer(peer) => session.peer_of(username) == Some(peer.as_str()),
            })
            .ok_or_else(|| AppError::InvalidState("Chat room not found".to_string()))?;
        let chat_id = session.chat_id;

        let message = self.moderate(chat_id, username, plaintext).await;

        let ciphertext = self.cipher.encrypt(&message)?;
        let time = chat_timestamp();
        self.store
            .append_message(chat_id, username, &ciphertext, &time)
            .await?;

        let recipients = self
            .sessions
            .broadcast(
                chat_id,
                ServerEvent::NewMessage {
                    sender: username.to_string(),
                    message: message.clone(),
                    time: time.clone(),
                },
            )
            .await;

        debug!(chat_id, sender = username, recipients, "[RELAY] Message delivered");

        Ok(DeliveredMessage {
            chat_id,
            sender: username.to_string(),
            message,
            time,
            recipients,
        })
    }

    /// The text to store: the original, or the placeholder if flagged.
    async fn moderate(&self, chat_id: i64, username: &str, plaintext: &str) -> String {
        match tokio::time::timeout(self.moderator_timeout, self.moderator.evaluate(plaintext)).await {
            Ok(Ok(verdict)) if verdict.flagged => {
                info!(chat_id, sender = username, "[RELAY] Message flagged, replacing content");
                self.placeholder.clone()
            }
            Ok(Ok(_)) => plaintext.to_string(),
            Ok(Err(e)) => {
                warn!(chat_id, error = %e, "[RELAY] Moderator failed, delivering unmoderated");
                plaintext.to_string()
            }
            Err(_) => {
                warn!(
                    chat_id,
                    timeout_ms = self.moderator_timeout.as_millis() as u64,
                    "[RELAY] Moderator timed out, delivering unmoderated"
                );
                plaintext.to_string()
            }
        }
    }
}
