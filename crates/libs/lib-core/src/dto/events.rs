//! # Chat Wire Events
//!
//! Every WebSocket text frame is a JSON object `{"event": "<name>", "data": {...}}`.
//! Event and field names are fixed by existing web clients, hence the mix of
//! camelCase and snake_case.

use crate::model::UserStatus;
use serde::{Deserialize, Serialize};

// region: --- Shared payloads

/// A user as shown in the presence list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceUser {
    pub username: String,
    pub status: UserStatus,
    pub avatar: String,
}

/// One decrypted message of a chat history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub time: String,
    pub sender: String,
    pub message: String,
}

/// Why a chat session ended, as told to the peer in `force_close_chat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeardownReason {
    /// `leave_chat`
    Left,
    /// `close_chat` / `end_chat`
    Closed,
    Disconnected,
    /// The user logged in again from another connection.
    Replaced,
}

impl TeardownReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TeardownReason::Left => "left",
            TeardownReason::Closed => "closed",
            TeardownReason::Disconnected => "disconnected",
            TeardownReason::Replaced => "replaced",
        }
    }
}

/// Chat ids arrive as numbers from some clients and as strings from others.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatIdField {
    Number(i64),
    Text(String),
}

impl ChatIdField {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ChatIdField::Number(n) => Some(*n),
            ChatIdField::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl From<i64> for ChatIdField {
    fn from(id: i64) -> Self {
        ChatIdField::Number(id)
    }
}

// endregion: --- Shared payloads

// region: --- Client events

/// Events sent by a connected client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "update_status")]
    UpdateStatus { status: String },

    #[serde(rename = "chat_request")]
    ChatRequest {
        #[serde(rename = "targetUsername")]
        target_username: String,
    },

    #[serde(rename = "chat_request_response")]
    ChatRequestResponse {
        #[serde(rename = "requestId")]
        request_id: String,
        accepted: bool,
    },

    #[serde(rename = "join_chat")]
    JoinChat { other_user: String },

    #[serde(rename = "send_message")]
    SendMessage {
        #[serde(default)]
        other_user: Option<String>,
        #[serde(default)]
        chat_id: Option<ChatIdField>,
        message: String,
    },

    #[serde(rename = "leave_chat")]
    LeaveChat { chat_id: ChatIdField },

    #[serde(rename = "close_chat")]
    CloseChat {
        #[serde(rename = "otherUsername")]
        other_username: String,
    },

    /// Sent by browsers on tab close; handled like `close_chat`.
    #[serde(rename = "end_chat")]
    EndChat { other_user: String },
}

impl ClientEvent {
    pub fn from_frame(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Wire name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::UpdateStatus { .. } => "update_status",
            ClientEvent::ChatRequest { .. } => "chat_request",
            ClientEvent::ChatRequestResponse { .. } => "chat_request_response",
            ClientEvent::JoinChat { .. } => "join_chat",
            ClientEvent::SendMessage { .. } => "send_message",
            ClientEvent::LeaveChat { .. } => "leave_chat",
            ClientEvent::CloseChat { .. } => "close_chat",
            ClientEvent::EndChat { .. } => "end_chat",
        }
    }
}

// endregion: --- Client events

// region: --- Server events

/// Events pushed to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "userList")]
    UserList { users: Vec<PresenceUser> },

    #[serde(rename = "userStatusUpdate")]
    UserStatusUpdate { user: PresenceUser },

    #[serde(rename = "chat_request_received")]
    ChatRequestReceived {
        #[serde(rename = "requestId")]
        request_id: String,
        #[serde(rename = "senderUsername")]
        sender_username: String,
        #[serde(rename = "senderAvatar")]
        sender_avatar: String,
    },

    #[serde(rename = "chat_request_response")]
    ChatRequestResponse {
        accepted: bool,
        #[serde(rename = "targetUsername")]
        target_username: String,
        #[serde(rename = "targetAvatar")]
        target_avatar: String,
        #[serde(rename = "chatId", default, skip_serializing_if = "Option::is_none")]
        chat_id: Option<i64>,
    },

    #[serde(rename = "open_chat_window")]
    OpenChatWindow {
        username: String,
        avatar: String,
        #[serde(rename = "chatId")]
        chat_id: i64,
    },

    #[serde(rename = "chat_started")]
    ChatStarted {
        chat_id: String,
        other_user: String,
        messages: Vec<HistoryEntry>,
    },

    #[serde(rename = "new_message")]
    NewMessage {
        sender: String,
        message: String,
        time: String,
    },

    /// Broadcast to the room; `username` is whoever ended it.
    #[serde(rename = "chat_ended")]
    ChatEnded { chat_id: i64, username: String },

    #[serde(rename = "force_close_chat")]
    ForceCloseChat {
        username: String,
        reason: TeardownReason,
    },

    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }

    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Wire name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::UserList { .. } => "userList",
            ServerEvent::UserStatusUpdate { .. } => "userStatusUpdate",
            ServerEvent::ChatRequestReceived { .. } => "chat_request_received",
            ServerEvent::ChatRequestResponse { .. } => "chat_request_response",
            ServerEvent::OpenChatWindow { .. } => "open_chat_window",
            ServerEvent::ChatStarted { .. } => "chat_started",
            ServerEvent::NewMessage { .. } => "new_message",
            ServerEvent::ChatEnded { .. } => "chat_ended",
            ServerEvent::ForceCloseChat { .. } => "force_close_chat",
            ServerEvent::Error { .. } => "error",
        }
    }
}

// endregion: --- Server events

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_parse_client_frames() {
        let event = ClientEvent::from_frame(
            r#"{"event":"chat_request_response","data":{"requestId":"r-1","accepted":true}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::ChatRequestResponse {
                request_id: "r-1".to_string(),
                accepted: true
            }
        );

        let event =
            ClientEvent::from_frame(r#"{"event":"close_chat","data":{"otherUsername":"bob"}}"#)
                .unwrap();
        assert_eq!(event.name(), "close_chat");
    }

    #[test]
    fn test_send_message_chat_id_number_or_string() {
        let numeric = ClientEvent::from_frame(
            r#"{"event":"send_message","data":{"chat_id":7,"message":"hi"}}"#,
        )
        .unwrap();
        let text = ClientEvent::from_frame(
            r#"{"event":"send_message","data":{"chat_id":"7","other_user":"bob","message":"hi"}}"#,
        )
        .unwrap();

        for event in [numeric, text] {
            match event {
                ClientEvent::SendMessage { chat_id, .. } => {
                    assert_eq!(chat_id.and_then(|c| c.as_i64()), Some(7))
                }
                other => panic!("unexpected event {:?}", other),
            }
        }
    }

    #[test]
    fn test_unknown_event_is_an_error() {
        assert!(ClientEvent::from_frame(r#"{"event":"dance","data":{}}"#).is_err());
        assert!(ClientEvent::from_frame("not json").is_err());
    }

    #[test]
    fn test_server_frames_use_client_field_names() {
        let frame = ServerEvent::ChatRequestResponse {
            accepted: false,
            target_username: "bob".to_string(),
            target_avatar: "/assets/Uzaylı_2.png".to_string(),
            chat_id: None,
        }
        .to_frame()
        .unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();

        assert_eq!(value["event"], "chat_request_response");
        assert_eq!(value["data"]["targetUsername"], "bob");
        assert!(value["data"].get("chatId").is_none());

        let frame = ServerEvent::ForceCloseChat {
            username: "alice".to_string(),
            reason: TeardownReason::Disconnected,
        }
        .to_frame()
        .unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(
            value,
            json!({"event": "force_close_chat", "data": {"username": "alice", "reason": "disconnected"}})
        );
    }
}
