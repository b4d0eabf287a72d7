//! # Chat Service
//!
//! Entry point for every connection event. Routes each one to the presence
//! registry, the request broker, the session manager or the relay, and turns
//! failures into an `error` event for the acting connection only.

use super::clock::Clock;
use super::connection::{ConnectionHandle, ConnectionId};
use super::moderation::MessageModerator;
use super::presence::PresenceRegistry;
use super::relay::{ChatTarget, DeliveredMessage, MessageRelay};
use super::requests::{ChatRequestBroker, Resolution};
use super::sessions::{ChatSessionManager, Teardown};
use lib_auth::MessageCipher;
use lib_core::config::{DEFAULT_AVATAR, DEFAULT_MODERATION_PLACEHOLDER};
use lib_core::dto::{ChatIdField, ClientEvent, PresenceUser, ServerEvent, TeardownReason};
use lib_core::model::store::{ChatStore, UserDirectory};
use lib_core::{AppError, Config, Result, UserStatus};
use lib_utils::validate_username;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

// region: --- Settings

/// Tunables of the chat core.
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub request_ttl: Duration,
    pub moderator_timeout: Duration,
    pub moderation_placeholder: String,
    pub default_avatar: String,
}

impl ChatSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            request_ttl: config.chat_request_ttl(),
            moderator_timeout: config.moderator_timeout(),
            moderation_placeholder: config.moderation_placeholder.clone(),
            default_avatar: config.default_avatar.clone(),
        }
    }
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            request_ttl: Duration::from_secs(300),
            moderator_timeout: Duration::from_millis(2000),
            moderation_placeholder: DEFAULT_MODERATION_PLACEHOLDER.to_string(),
            default_avatar: DEFAULT_AVATAR.to_string(),
        }
    }
}

// endregion: --- Settings

pub struct ChatService {
    presence: Arc<PresenceRegistry>,
    broker: Arc<ChatRequestBroker>,
    sessions: Arc<ChatSessionManager>,
    relay: MessageRelay,
    directory: Arc<dyn UserDirectory>,
    default_avatar: String,
}

impl ChatService {
    pub fn new(
        settings: ChatSettings,
        store: Arc<dyn ChatStore>,
        directory: Arc<dyn UserDirectory>,
        moderator: Arc<dyn MessageModerator>,
        cipher: MessageCipher,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let presence = Arc::new(PresenceRegistry::new());
        let broker = Arc::new(ChatRequestBroker::new(clock, settings.request_ttl));
        let sessions = Arc::new(ChatSessionManager::new(
            presence.clone(),
            store.clone(),
            directory.clone(),
            cipher.clone(),
        ));
        let relay = MessageRelay::new(
            sessions.clone(),
            store,
            moderator,
            cipher,
            settings.moderator_timeout,
            settings.moderation_placeholder,
        );

        Self {
            presence,
            broker,
            sessions,
            relay,
            directory,
            default_avatar: settings.default_avatar,
        }
    }

    pub fn presence(&self) -> &Arc<PresenceRegistry> {
        &self.presence
    }

    pub fn broker(&self) -> &Arc<ChatRequestBroker> {
        &self.broker
    }

    pub fn sessions(&self) -> &Arc<ChatSessionManager> {
        &self.sessions
    }

    // region: --- Connection lifecycle

    /// A verified user opened a connection.
    pub async fn connect(&self, username: &str, handle: ConnectionHandle) {
        if let Some(evicted) = self.presence.register(username, handle).await {
            evicted.terminate(TeardownReason::Replaced.as_str());
            if let Some(teardown) = self.sessions.teardown(username, TeardownReason::Replaced).await {
                self.notify_peer(username, &teardown).await;
            }
        }

        if let Err(e) = self.directory.ensure_user(username).await {
            warn!(username, error = %e, "[PRESENCE] Failed to create directory entry");
        }
        self.project_status(username, UserStatus::Idle).await;
        self.broadcast_user_list().await;
    }

    /// A connection closed. Stale connections (already replaced) are ignored.
    pub async fn disconnect(&self, username: &str, connection_id: ConnectionId) {
        if !self.presence.unregister(username, connection_id).await {
            return;
        }

        if let Some(teardown) = self.sessions.teardown(username, TeardownReason::Disconnected).await {
            self.notify_peer(username, &teardown).await;
        }

        self.project_status(username, UserStatus::Offline).await;
        self.broadcast_user_list().await;
    }

    // endregion: --- Connection lifecycle

    // region: --- Dispatch

    /// Parse a text frame and dispatch it.
    pub async fn dispatch_frame(&self, username: &str, handle: &ConnectionHandle, frame: &str) {
        match ClientEvent::from_frame(frame) {
            Ok(event) => self.dispatch(username, handle, event).await,
            Err(e) => {
                debug!(username, error = %e, "[WS] Unparseable frame");
                handle.send(ServerEvent::error(AppError::from(e).user_message()));
            }
        }
    }

    /// [`Self::dispatch_frame`] on its own task.
    ///
    /// The dispatch runs to completion even if the caller is cancelled, so
    /// reservations, relayed messages and log drops are never cut short.
    /// Awaiting the handle keeps frames from one connection in order.
    pub fn spawn_dispatch(self: &Arc<Self>, username: String, handle: ConnectionHandle, frame: String) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move { service.dispatch_frame(&username, &handle, &frame).await })
    }

    /// Handle one client event. Errors go back to `handle` only.
    pub async fn dispatch(&self, username: &str, handle: &ConnectionHandle, event: ClientEvent) {
        if !self.presence.is_current(username, handle.id()).await {
            debug!(
                username,
                connection_id = %handle.id(),
                event = event.name(),
                "[WS] Dropping event from a replaced connection"
            );
            return;
        }

        let name = event.name();
        let result = match event {
            ClientEvent::UpdateStatus { status } => self.update_status(username, &status).await,
            ClientEvent::ChatRequest { target_username } => self.chat_request(username, &target_username).await,
            ClientEvent::ChatRequestResponse { request_id, accepted } => {
                self.respond(username, &request_id, accepted).await
            }
            ClientEvent::JoinChat { other_user } => self.join_chat(username, &other_user).await,
            ClientEvent::SendMessage {
                other_user,
                chat_id,
                message,
            } => self
                .send_message(username, other_user, chat_id, &message)
                .await
                .map(|_| ()),
            ClientEvent::LeaveChat { chat_id } => self.leave_chat(username, &chat_id).await,
            ClientEvent::CloseChat { other_username } => self.close_chat(username, &other_username).await,
            ClientEvent::EndChat { other_user } => self.close_chat(username, &other_user).await,
        };

        if let Err(e) = result {
            match &e {
                AppError::InvalidInput(_) | AppError::InvalidState(_) | AppError::NotFound(_) => {
                    debug!(username, event = name, error = %e, "[WS] Event rejected")
                }
                _ => warn!(username, event = name, error = %e, "[WS] Event failed"),
            }
            handle.send(ServerEvent::error(e.user_message()));
        }
    }

    // endregion: --- Dispatch

    // region: --- Event handlers

    pub async fn update_status(&self, username: &str, status: &str) -> Result<()> {
        let status: UserStatus = status.parse().map_err(AppError::InvalidInput)?;
        self.presence.set_status(username, status).await?;
        self.project_status(username, status).await;

        let user = PresenceUser {
            username: username.to_string(),
            status,
            avatar: self.avatar_of(username).await,
        };
        self.presence.broadcast(ServerEvent::UserStatusUpdate { user }).await;
        Ok(())
    }

    pub async fn chat_request(&self, username: &str, target: &str) -> Result<()> {
        let request = self
            .broker
            .create(username, target, &self.presence, &self.sessions)
            .await?;

        let delivered = self
            .presence
            .deliver(
                target,
                ServerEvent::ChatRequestReceived {
                    request_id: request.id.clone(),
                    sender_username: username.to_string(),
                    sender_avatar: self.avatar_of(username).await,
                },
            )
            .await;
        if !delivered {
            debug!(request_id = %request.id, target, "[REQUEST] Target went away before delivery");
        }
        Ok(())
    }

    /// `username` answers a request addressed to them.
    pub async fn respond(&self, username: &str, request_id: &str, accepted: bool) -> Result<()> {
        let request = match self.broker.resolve(request_id, username, accepted).await {
            Resolution::Ignored => return Ok(()),
            Resolution::Rejected(request) => {
                self.send_refusal(&request.sender, &request.target).await;
                return Ok(());
            }
            Resolution::Accepted(request) => request,
        };

        let session = match self.sessions.establish(&request.sender, &request.target).await {
            Ok(session) => session,
            Err(e) => {
                info!(
                    request_id,
                    sender = %request.sender,
                    target = %request.target,
                    error = %e,
                    "[REQUEST] Acceptance failed re-validation, reporting as rejected"
                );
                self.send_refusal(&request.sender, &request.target).await;
                return Err(e);
            }
        };

        let target_avatar = self.avatar_of(&request.target).await;
        let sender_avatar = self.avatar_of(&request.sender).await;

        self.presence
            .deliver(
                &request.sender,
                ServerEvent::ChatRequestResponse {
                    accepted: true,
                    target_username: request.target.clone(),
                    target_avatar,
                    chat_id: Some(session.chat_id),
                },
            )
            .await;
        self.presence
            .deliver(
                &request.target,
                ServerEvent::OpenChatWindow {
                    username: request.sender.clone(),
                    avatar: sender_avatar,
                    chat_id: session.chat_id,
                },
            )
            .await;

        self.broadcast_user_list().await;
        Ok(())
    }

    pub async fn join_chat(&self, username: &str, other: &str) -> Result<()> {
        validate_username(other).map_err(AppError::InvalidInput)?;

        let joined = self.sessions.join(username, other).await?;
        let chat_id = joined.session.chat_id;
        let messages = self.sessions.history_of(chat_id).await?;

        self.presence
            .deliver(
                username,
                ServerEvent::ChatStarted {
                    chat_id: chat_id.to_string(),
                    other_user: other.to_string(),
                    messages,
                },
            )
            .await;

        if joined.established {
            self.presence
                .deliver(
                    other,
                    ServerEvent::OpenChatWindow {
                        username: username.to_string(),
                        avatar: self.avatar_of(username).await,
                        chat_id,
                    },
                )
                .await;
            self.broadcast_user_list().await;
        }
        Ok(())
    }

    /// `chat_id` wins over `other_user` when both are given and parse.
    pub async fn send_message(
        &self,
        username: &str,
        other_user: Option<String>,
        chat_id: Option<ChatIdField>,
        message: &str,
    ) -> Result<DeliveredMessage> {
        let target = match (chat_id.as_ref().and_then(ChatIdField::as_i64), other_user) {
            (Some(chat_id), _) => ChatTarget::ChatId(chat_id),
            (None, Some(peer)) => ChatTarget::Peer(peer),
            (None, None) => {
                return Err(AppError::InvalidInput(
                    "A message needs a chat_id or other_user".to_string(),
                ))
            }
        };

        self.relay.send(username, target, message).await
    }

    /// Leaving a chat you are not in is a no-op.
    pub async fn leave_chat(&self, username: &str, chat_id: &ChatIdField) -> Result<()> {
        let chat_id = chat_id
            .as_i64()
            .ok_or_else(|| AppError::InvalidInput("chat_id must be a number".to_string()))?;

        match self.sessions.teardown_chat(username, chat_id, TeardownReason::Left).await {
            Some(teardown) => {
                self.notify_peer(username, &teardown).await;
                self.broadcast_user_list().await;
            }
            None => debug!(username, chat_id, "[SESSION] leave_chat for a chat the user is not in"),
        }
        Ok(())
    }

    /// Closing a chat with someone you are not chatting with is a no-op.
    pub async fn close_chat(&self, username: &str, other: &str) -> Result<()> {
        match self
            .sessions
            .teardown_with_peer(username, other, TeardownReason::Closed)
            .await
        {
            Some(teardown) => {
                self.notify_peer(username, &teardown).await;
                self.broadcast_user_list().await;
            }
            None => debug!(username, other, "[SESSION] close_chat with no matching chat"),
        }
        Ok(())
    }

    // endregion: --- Event handlers

    // region: --- Presence helpers

    /// Every directory user with their live status, plus any connected user
    /// the directory does not know yet. Sorted by username.
    pub async fn user_list(&self, exclude: Option<&str>) -> Vec<PresenceUser> {
        let profiles = self.directory.list_users().await.unwrap_or_else(|e| {
            warn!(error = %e, "[PRESENCE] Failed to read directory, listing live users only");
            Vec::new()
        });

        let mut users: BTreeMap<String, PresenceUser> = profiles
            .into_iter()
            .map(|profile| {
                let user = PresenceUser {
                    username: profile.username.clone(),
                    status: UserStatus::Offline,
                    avatar: profile.avatar,
                };
                (profile.username, user)
            })
            .collect();

        for entry in self.presence.snapshot(None).await {
            users
                .entry(entry.username.clone())
                .or_insert_with(|| PresenceUser {
                    username: entry.username.clone(),
                    status: UserStatus::Offline,
                    avatar: self.default_avatar.clone(),
                })
                .status = entry.status;
        }

        users
            .into_values()
            .filter(|user| Some(user.username.as_str()) != exclude)
            .collect()
    }

    async fn broadcast_user_list(&self) {
        let users = self.user_list(None).await;
        let reached = self.presence.broadcast(ServerEvent::UserList { users }).await;
        debug!(reached, "[PRESENCE] Broadcast user list");
    }

    async fn avatar_of(&self, username: &str) -> String {
        match self.directory.profile(username).await {
            Ok(Some(profile)) => profile.avatar,
            Ok(None) => self.default_avatar.clone(),
            Err(e) => {
                warn!(username, error = %e, "[PRESENCE] Avatar lookup failed");
                self.default_avatar.clone()
            }
        }
    }

    async fn project_status(&self, username: &str, status: UserStatus) {
        if let Err(e) = self.directory.set_status(username, status).await {
            warn!(username, %status, error = %e, "[PRESENCE] Failed to persist status");
        }
    }

    async fn notify_peer(&self, username: &str, teardown: &Teardown) {
        self.presence
            .deliver(
                &teardown.peer,
                ServerEvent::ForceCloseChat {
                    username: username.to_string(),
                    reason: teardown.reason,
                },
            )
            .await;
    }

    async fn send_refusal(&self, sender: &str, target: &str) {
        let target_avatar = self.avatar_of(target).await;
        self.presence
            .deliver(
                sender,
                ServerEvent::ChatRequestResponse {
                    accepted: false,
                    target_username: target.to_string(),
                    target_avatar,
                    chat_id: None,
                },
            )
            .await;
    }

    // endregion: --- Presence helpers
}
