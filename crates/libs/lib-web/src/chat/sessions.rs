//! # Chat Session Manager
//!
//! Owns the pairwise chat sessions and their rooms.
//!
//! Every user has at most one slot. A slot is either `Reserved` while a pair is
//! being established or `Active` once the room exists. Establishment reserves
//! both users under the lock, does its store work unlocked, then promotes the
//! reservations only if they still carry the same ticket. Any teardown that
//! runs in between clears the reservation and the promotion fails.
//!
//! Teardown leaves both users in a `Closing` slot until the chat log has been
//! dropped, so the pair cannot re-establish on top of a log that is about to
//! disappear. Chats whose drop failed are remembered and dropped again before
//! their id is handed out.
//!
//! Lock order is slots then presence registry. No lock is held across a store
//! call.

use super::connection::ConnectionHandle;
use super::presence::PresenceRegistry;
use lib_auth::MessageCipher;
use lib_core::dto::{HistoryEntry, ServerEvent, TeardownReason};
use lib_core::model::store::{ChatStore, UserDirectory};
use lib_core::{AppError, Result, UserStatus};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

// region: --- Types

/// An established chat between two users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSession {
    pub chat_id: i64,
    pub user_a: String,
    pub user_b: String,
}

impl ChatSession {
    pub fn involves(&self, username: &str) -> bool {
        self.user_a == username || self.user_b == username
    }

    pub fn peer_of(&self, username: &str) -> Option<&str> {
        if self.user_a == username {
            Some(&self.user_b)
        } else if self.user_b == username {
            Some(&self.user_a)
        } else {
            None
        }
    }
}

/// Result of a teardown: who to notify and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Teardown {
    pub chat_id: i64,
    pub peer: String,
    pub reason: TeardownReason,
}

/// Result of [`ChatSessionManager::join`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Joined {
    pub session: ChatSession,
    /// `false` when the caller was already in this chat.
    pub established: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
    Reserved { peer: String, ticket: u64 },
    Active { chat_id: i64, peer: String },
    Closing { chat_id: i64 },
}

/// Which chat a teardown may end.
#[derive(Debug, Clone, Copy)]
enum Scope<'a> {
    Any,
    Chat(i64),
    Peer(&'a str),
}

impl Scope<'_> {
    fn covers(&self, chat_id: i64, peer: &str) -> bool {
        match self {
            Scope::Any => true,
            Scope::Chat(id) => *id == chat_id,
            Scope::Peer(p) => *p == peer,
        }
    }
}

#[derive(Debug)]
struct Room {
    session: ChatSession,
    members: Vec<ConnectionHandle>,
}

#[derive(Debug, Default)]
struct SessionTable {
    slots: HashMap<String, Slot>,
    rooms: HashMap<i64, Room>,
    /// Ended chats whose log could not be dropped.
    undropped: HashSet<i64>,
    next_ticket: u64,
}

impl SessionTable {
    fn issue_ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }

    fn holds_reservation(&self, username: &str, ticket: u64) -> bool {
        matches!(self.slots.get(username), Some(Slot::Reserved { ticket: t, .. }) if *t == ticket)
    }

    fn release(&mut self, username: &str, ticket: u64) {
        if self.holds_reservation(username, ticket) {
            self.slots.remove(username);
        }
    }

    fn finish_closing(&mut self, username: &str, chat_id: i64) {
        if matches!(self.slots.get(username), Some(Slot::Closing { chat_id: id }) if *id == chat_id) {
            self.slots.remove(username);
        }
    }

    fn check_free(&self, username: &str) -> Result<()> {
        match self.slots.get(username) {
            None => Ok(()),
            Some(Slot::Closing { .. }) => Err(AppError::InvalidState(format!(
                "{} is still leaving a chat, try again",
                username
            ))),
            Some(_) => Err(AppError::InvalidState(format!("{} is already in a chat", username))),
        }
    }
}

// endregion: --- Types

pub struct ChatSessionManager {
    table: Mutex<SessionTable>,
    presence: Arc<PresenceRegistry>,
    store: Arc<dyn ChatStore>,
    directory: Arc<dyn UserDirectory>,
    cipher: MessageCipher,
}

impl ChatSessionManager {
    pub fn new(
        presence: Arc<PresenceRegistry>,
        store: Arc<dyn ChatStore>,
        directory: Arc<dyn UserDirectory>,
        cipher: MessageCipher,
    ) -> Self {
        Self {
            table: Mutex::new(SessionTable::default()),
            presence,
            store,
            directory,
            cipher,
        }
    }

    // region: --- Establish

    /// Create a chat between two connected, free users.
    ///
    /// Reuses a chat already on file for the pair in either ordering.
    pub async fn establish(&self, user_a: &str, user_b: &str) -> Result<ChatSession> {
        if user_a == user_b {
            return Err(AppError::InvalidInput("You cannot chat with yourself".to_string()));
        }

        let ticket = self.reserve(user_a, user_b).await?;

        let (chat_id, allocated) = match self.locate_or_allocate(user_a, user_b).await {
            Ok(found) => found,
            Err(e) => {
                warn!(user_a, user_b, error = %e, "[SESSION] Store failed during establish");
                let mut table = self.table.lock().await;
                table.release(user_a, ticket);
                table.release(user_b, ticket);
                return Err(e);
            }
        };

        let promoted = self.promote(user_a, user_b, ticket, chat_id).await;

        match promoted {
            Some(session) => {
                self.project(user_a).await;
                self.project(user_b).await;
                info!(
                    chat_id,
                    user_a,
                    user_b,
                    reused = !allocated,
                    "[SESSION] Chat {} established between {} and {}",
                    chat_id,
                    user_a,
                    user_b
                );
                Ok(session)
            }
            None => {
                if allocated {
                    if let Err(e) = self.store.drop_chat(chat_id).await {
                        warn!(chat_id, error = %e, "[SESSION] Failed to drop abandoned chat");
                    }
                }
                info!(
                    user_a,
                    user_b,
                    "[SESSION] Establish abandoned, a participant left or was claimed meanwhile"
                );
                Err(AppError::InvalidState(
                    "The other user is no longer available".to_string(),
                ))
            }
        }
    }

    async fn reserve(&self, user_a: &str, user_b: &str) -> Result<u64> {
        let mut table = self.table.lock().await;

        table.check_free(user_a)?;
        table.check_free(user_b)?;
        if !self.presence.is_connected(user_a).await {
            return Err(AppError::InvalidState(format!("{} is not online", user_a)));
        }
        if !self.presence.is_connected(user_b).await {
            return Err(AppError::InvalidState(format!("{} is not online", user_b)));
        }

        let ticket = table.issue_ticket();
        table.slots.insert(
            user_a.to_string(),
            Slot::Reserved {
                peer: user_b.to_string(),
                ticket,
            },
        );
        table.slots.insert(
            user_b.to_string(),
            Slot::Reserved {
                peer: user_a.to_string(),
                ticket,
            },
        );
        debug!(user_a, user_b, ticket, "[SESSION] Pair reserved");
        Ok(ticket)
    }

    async fn locate_or_allocate(&self, user_a: &str, user_b: &str) -> Result<(i64, bool)> {
        if let Some(chat_id) = self.store.find_chat(user_a, user_b).await? {
            let leftover = self.table.lock().await.undropped.contains(&chat_id);
            if !leftover {
                return Ok((chat_id, false));
            }

            // The previous session's log is still on file. Clear it before starting over.
            self.store.drop_chat(chat_id).await?;
            self.table.lock().await.undropped.remove(&chat_id);
            info!(chat_id, user_a, user_b, "[SESSION] Dropped leftover chat log before re-establishing");
        }
        let chat_id = self.store.allocate_chat(user_a, user_b).await?;
        Ok((chat_id, true))
    }

    async fn promote(&self, user_a: &str, user_b: &str, ticket: u64, chat_id: i64) -> Option<ChatSession> {
        let mut table = self.table.lock().await;

        let reserved = table.holds_reservation(user_a, ticket) && table.holds_reservation(user_b, ticket);
        let handles = if reserved {
            match (
                self.presence.handle_of(user_a).await,
                self.presence.handle_of(user_b).await,
            ) {
                (Some(a), Some(b)) => Some((a, b)),
                _ => None,
            }
        } else {
            None
        };

        let Some((handle_a, handle_b)) = handles else {
            table.release(user_a, ticket);
            table.release(user_b, ticket);
            return None;
        };

        let session = ChatSession {
            chat_id,
            user_a: user_a.to_string(),
            user_b: user_b.to_string(),
        };
        table.slots.insert(
            user_a.to_string(),
            Slot::Active {
                chat_id,
                peer: user_b.to_string(),
            },
        );
        table.slots.insert(
            user_b.to_string(),
            Slot::Active {
                chat_id,
                peer: user_a.to_string(),
            },
        );
        table.rooms.insert(
            chat_id,
            Room {
                session: session.clone(),
                members: vec![handle_a, handle_b],
            },
        );

        for user in [user_a, user_b] {
            if let Err(e) = self.presence.set_status(user, UserStatus::Busy).await {
                debug!(user, error = %e, "[SESSION] Could not mark user busy");
            }
        }

        Some(session)
    }

    // endregion: --- Establish

    // region: --- Teardown

    /// End whatever chat `username` is in, or clear a pending reservation.
    ///
    /// Returns `None` when there was nothing to tear down, including when the
    /// user only held a reservation.
    pub async fn teardown(&self, username: &str, reason: TeardownReason) -> Option<Teardown> {
        self.teardown_scoped(username, reason, Scope::Any).await
    }

    /// Tear down only if the user's active chat has `chat_id`.
    pub async fn teardown_chat(&self, username: &str, chat_id: i64, reason: TeardownReason) -> Option<Teardown> {
        self.teardown_scoped(username, reason, Scope::Chat(chat_id)).await
    }

    /// Tear down only if the user is chatting with `peer`.
    pub async fn teardown_with_peer(&self, username: &str, peer: &str, reason: TeardownReason) -> Option<Teardown> {
        self.teardown_scoped(username, reason, Scope::Peer(peer)).await
    }

    async fn teardown_scoped(&self, username: &str, reason: TeardownReason, scope: Scope<'_>) -> Option<Teardown> {
        let (chat_id, peer) = {
            let mut table = self.table.lock().await;

            match table.slots.get(username).cloned() {
                None | Some(Slot::Closing { .. }) => return None,
                Some(Slot::Reserved { peer, ticket }) => {
                    if !matches!(scope, Scope::Any) {
                        return None;
                    }
                    table.release(username, ticket);
                    table.release(&peer, ticket);
                    debug!(username, peer, "[SESSION] Cleared pending reservation");
                    return None;
                }
                Some(Slot::Active { chat_id, peer }) => {
                    if !scope.covers(chat_id, &peer) {
                        return None;
                    }

                    table.slots.insert(username.to_string(), Slot::Closing { chat_id });
                    if matches!(table.slots.get(&peer), Some(Slot::Active { chat_id: id, .. }) if *id == chat_id) {
                        table.slots.insert(peer.clone(), Slot::Closing { chat_id });
                    }

                    if let Some(room) = table.rooms.remove(&chat_id) {
                        let ended = ServerEvent::ChatEnded {
                            chat_id,
                            username: username.to_string(),
                        };
                        for member in &room.members {
                            member.send(ended.clone());
                        }
                    }

                    for user in [username, peer.as_str()] {
                        if self.presence.is_connected(user).await {
                            if let Err(e) = self.presence.set_status(user, UserStatus::Idle).await {
                                debug!(user, error = %e, "[SESSION] Could not mark user idle");
                            }
                        }
                    }

                    (chat_id, peer)
                }
            }
        };

        let dropped = self.store.drop_chat(chat_id).await;
        {
            let mut table = self.table.lock().await;
            if let Err(e) = &dropped {
                warn!(chat_id, error = %e, "[SESSION] Failed to drop chat log, will retry before reuse");
                table.undropped.insert(chat_id);
            }
            table.finish_closing(username, chat_id);
            table.finish_closing(&peer, chat_id);
        }
        self.project(username).await;
        self.project(&peer).await;

        info!(
            chat_id,
            username,
            peer,
            reason = reason.as_str(),
            "[SESSION] Chat {} ended ({})",
            chat_id,
            reason.as_str()
        );

        Some(Teardown { chat_id, peer, reason })
    }

    // endregion: --- Teardown

    // region: --- Queries

    pub async fn session_of(&self, username: &str) -> Option<ChatSession> {
        let table = self.table.lock().await;
        match table.slots.get(username) {
            Some(Slot::Active { chat_id, .. }) => table.rooms.get(chat_id).map(|room| room.session.clone()),
            _ => None,
        }
    }

    /// Whether the user is in a chat, reserved for one, or still leaving one.
    pub async fn is_occupied(&self, username: &str) -> bool {
        self.table.lock().await.slots.contains_key(username)
    }

    pub async fn active_count(&self) -> usize {
        self.table.lock().await.rooms.len()
    }

    /// Send to both members of the room. Returns how many accepted it.
    pub async fn broadcast(&self, chat_id: i64, event: ServerEvent) -> usize {
        let table = self.table.lock().await;
        match table.rooms.get(&chat_id) {
            Some(room) => room
                .members
                .iter()
                .filter(|member| member.send(event.clone()))
                .count(),
            None => 0,
        }
    }

    /// Decrypted history in stored order. Undecryptable rows are skipped.
    pub async fn history_of(&self, chat_id: i64) -> Result<Vec<HistoryEntry>> {
        let rows = self.store.read_messages(chat_id).await?;

        let history = rows
            .into_iter()
            .filter_map(|row| match self.cipher.decrypt(&row.ciphertext) {
                Ok(message) => Some(HistoryEntry {
                    time: row.sent_at,
                    sender: row.sender,
                    message,
                }),
                Err(e) => {
                    debug!(chat_id, message_id = row.id, error = %e, "[SESSION] Skipping unreadable message");
                    None
                }
            })
            .collect();

        Ok(history)
    }

    /// Enter a chat with `other` directly, without a request.
    pub async fn join(&self, username: &str, other: &str) -> Result<Joined> {
        if let Some(session) = self.session_of(username).await {
            return if session.peer_of(username) == Some(other) {
                Ok(Joined {
                    session,
                    established: false,
                })
            } else {
                Err(AppError::InvalidState("You are already in another chat".to_string()))
            };
        }

        let session = self.establish(username, other).await?;
        Ok(Joined {
            session,
            established: true,
        })
    }

    // endregion: --- Queries

    /// Copy the live status to the directory. Failures are only logged.
    async fn project(&self, username: &str) {
        let Some(status) = self.presence.status_of(username).await else {
            return;
        };
        if let Err(e) = self.directory.set_status(username, status).await {
            warn!(username, error = %e, "[SESSION] Failed to persist status");
        }
    }
}
