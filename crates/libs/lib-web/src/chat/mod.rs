//! # Chat Module
//!
//! The presence and chat-session orchestrator: who is online, pending chat
//! requests, established pairwise chats, and message relay.
//!
//! Events from every WebSocket connection enter through [`ChatService`]. The
//! sweeper runs on its own timer and only touches the request broker.

pub mod clock;
pub mod connection;
pub mod moderation;
pub mod presence;
pub mod relay;
pub mod requests;
pub mod service;
pub mod sessions;
pub mod state;
pub mod sweeper;

#[cfg(test)]
mod tests;

pub use clock::{Clock, SystemClock};
#[cfg(test)]
pub use clock::ManualClock;
pub use connection::{ConnectionHandle, ConnectionId, Outbound};
pub use moderation::{HttpModerator, MessageModerator, NoopModerator, Verdict};
pub use presence::{PresenceEntry, PresenceRegistry, Session};
pub use relay::{ChatTarget, DeliveredMessage, MessageRelay};
pub use requests::{ChatRequest, ChatRequestBroker, Resolution};
pub use service::{ChatService, ChatSettings};
pub use sessions::{ChatSession, ChatSessionManager, Joined, Teardown};
pub use state::ChatAppState;
pub use sweeper::{spawn_sweeper, sweep_once};
