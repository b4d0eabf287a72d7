//! # Connection Handles
//!
//! A [`ConnectionHandle`] is the core's only way to reach a client. Each one
//! owns the sending half of an unbounded mailbox; the WebSocket task drains the
//! other half.

use lib_core::dto::ServerEvent;
use std::fmt;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Identity of one physical connection, distinct across reconnects of the
/// same user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Items queued for a connection.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Event(ServerEvent),
    /// Close the socket with this reason; nothing after it is delivered.
    Close(String),
}

#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ConnectionHandle {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Self {
            id: ConnectionId::new(),
            tx,
        };
        (handle, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue an event. Returns `false` once the connection is gone.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.tx.send(Outbound::Event(event)).is_ok()
    }

    /// Ask the transport to close this connection.
    pub fn terminate(&self, reason: &str) -> bool {
        self.tx.send(Outbound::Close(reason.to_string())).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
