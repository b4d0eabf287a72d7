//! # Presence Registry
//!
//! One [`Session`] per connected username. The registry is the source of truth
//! for who is online and for their status; the directory only receives a
//! projection.
//!
//! Duplicate logins are resolved by [`PresenceRegistry::register`] handing the
//! evicted handle back to the caller, and stale disconnects by
//! [`PresenceRegistry::unregister`] comparing connection ids.

use super::connection::{ConnectionHandle, ConnectionId};
use chrono::{DateTime, Utc};
use lib_core::dto::ServerEvent;
use lib_core::{AppError, Result, UserStatus};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Live connection record of a logged-in user.
#[derive(Debug, Clone)]
pub struct Session {
    pub username: String,
    pub handle: ConnectionHandle,
    pub status: UserStatus,
    pub connected_at: DateTime<Utc>,
}

/// Entry of a presence snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceEntry {
    pub username: String,
    pub status: UserStatus,
}

#[derive(Debug, Default)]
pub struct PresenceRegistry {
    sessions: RwLock<HashMap<String, Session>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handle` as the user's session with status `idle`.
    ///
    /// Returns the handle it replaced, if the user was already connected.
    pub async fn register(&self, username: &str, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        let session = Session {
            username: username.to_string(),
            handle,
            status: UserStatus::Idle,
            connected_at: Utc::now(),
        };
        let connection_id = session.handle.id();

        let previous = self
            .sessions
            .write()
            .await
            .insert(username.to_string(), session);

        match &previous {
            Some(old) => info!(
                username,
                %connection_id,
                evicted = %old.handle.id(),
                "[PRESENCE] {} reconnected, evicting previous connection",
                username
            ),
            None => info!(username, %connection_id, "[PRESENCE] {} is online", username),
        }

        previous.map(|session| session.handle)
    }

    /// Remove the session only if `connection_id` is still the current one.
    pub async fn unregister(&self, username: &str, connection_id: ConnectionId) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get(username) {
            Some(session) if session.handle.id() == connection_id => {
                sessions.remove(username);
                info!(username, %connection_id, "[PRESENCE] {} is offline", username);
                true
            }
            _ => {
                debug!(
                    username,
                    %connection_id,
                    "[PRESENCE] Ignoring stale disconnect for {}",
                    username
                );
                false
            }
        }
    }

    pub async fn set_status(&self, username: &str, status: UserStatus) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(username)
            .ok_or_else(|| AppError::InvalidState(format!("{} is not connected", username)))?;
        session.status = status;
        debug!(username, %status, "[PRESENCE] Status changed");
        Ok(())
    }

    pub async fn status_of(&self, username: &str) -> Option<UserStatus> {
        self.sessions.read().await.get(username).map(|s| s.status)
    }

    pub async fn handle_of(&self, username: &str) -> Option<ConnectionHandle> {
        self.sessions
            .read()
            .await
            .get(username)
            .map(|s| s.handle.clone())
    }

    pub async fn is_connected(&self, username: &str) -> bool {
        self.sessions.read().await.contains_key(username)
    }

    /// Whether `connection_id` is the user's current connection.
    pub async fn is_current(&self, username: &str, connection_id: ConnectionId) -> bool {
        self.sessions
            .read()
            .await
            .get(username)
            .is_some_and(|s| s.handle.id() == connection_id)
    }

    /// Connected users sorted by username, optionally without `exclude`.
    pub async fn snapshot(&self, exclude: Option<&str>) -> Vec<PresenceEntry> {
        let mut entries: Vec<PresenceEntry> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| Some(s.username.as_str()) != exclude)
            .map(|s| PresenceEntry {
                username: s.username.clone(),
                status: s.status,
            })
            .collect();
        entries.sort_by(|a, b| a.username.cmp(&b.username));
        entries
    }

    /// Send to the user's private channel.
    pub async fn deliver(&self, username: &str, event: ServerEvent) -> bool {
        match self.sessions.read().await.get(username) {
            Some(session) => session.handle.send(event),
            None => false,
        }
    }

    /// Send to every connected user. Returns how many accepted it.
    pub async fn broadcast(&self, event: ServerEvent) -> usize {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| s.handle.send(event.clone()))
            .count()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::connection::Outbound;

    #[tokio::test]
    async fn test_register_evicts_previous_handle() {
        // Arrange
        let registry = PresenceRegistry::new();
        let (first, _rx1) = ConnectionHandle::new();
        let (second, _rx2) = ConnectionHandle::new();

        // Act
        assert!(registry.register("alice", first.clone()).await.is_none());
        let evicted = registry.register("alice", second.clone()).await;

        // Assert
        assert_eq!(evicted.map(|h| h.id()), Some(first.id()));
        assert_eq!(registry.len().await, 1);
        assert!(registry.is_current("alice", second.id()).await);
        assert_eq!(registry.status_of("alice").await, Some(UserStatus::Idle));
    }

    #[tokio::test]
    async fn test_stale_unregister_is_ignored() {
        let registry = PresenceRegistry::new();
        let (first, _rx1) = ConnectionHandle::new();
        let (second, _rx2) = ConnectionHandle::new();
        registry.register("alice", first.clone()).await;
        registry.register("alice", second.clone()).await;

        assert!(!registry.unregister("alice", first.id()).await);
        assert!(registry.is_connected("alice").await);

        assert!(registry.unregister("alice", second.id()).await);
        assert!(!registry.is_connected("alice").await);
    }

    #[tokio::test]
    async fn test_set_status_requires_session() {
        let registry = PresenceRegistry::new();
        let err = registry.set_status("ghost", UserStatus::Busy).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_snapshot_sorted_and_excludes_viewer() {
        let registry = PresenceRegistry::new();
        let mut receivers = Vec::new();
        for name in ["carol", "alice", "bob"] {
            let (handle, rx) = ConnectionHandle::new();
            receivers.push(rx);
            registry.register(name, handle).await;
        }
        registry.set_status("carol", UserStatus::Busy).await.unwrap();

        let snapshot = registry.snapshot(Some("bob")).await;
        assert_eq!(
            snapshot,
            vec![
                PresenceEntry { username: "alice".into(), status: UserStatus::Idle },
                PresenceEntry { username: "carol".into(), status: UserStatus::Busy },
            ]
        );
    }

    #[tokio::test]
    async fn test_deliver_and_broadcast() {
        let registry = PresenceRegistry::new();
        let (alice, mut alice_rx) = ConnectionHandle::new();
        let (bob, mut bob_rx) = ConnectionHandle::new();
        registry.register("alice", alice).await;
        registry.register("bob", bob).await;

        assert!(registry.deliver("alice", ServerEvent::error("only alice")).await);
        assert!(!registry.deliver("nobody", ServerEvent::error("lost")).await);
        assert_eq!(registry.broadcast(ServerEvent::error("all")).await, 2);

        assert_eq!(
            alice_rx.try_recv().unwrap(),
            Outbound::Event(ServerEvent::error("only alice"))
        );
        assert_eq!(bob_rx.try_recv().unwrap(), Outbound::Event(ServerEvent::error("all")));
    }
}
