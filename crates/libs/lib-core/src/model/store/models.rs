use crate::model::UserStatus;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Directory row for a user.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub status: String,
    pub avatar: String,
}

/// Public view of a directory user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: String,
    pub avatar: String,
    /// Last projected status; the live presence registry takes precedence.
    pub status: UserStatus,
}

impl From<UserRow> for UserProfile {
    fn from(row: UserRow) -> Self {
        Self {
            status: row.status.parse().unwrap_or_default(),
            username: row.username,
            avatar: row.avatar,
        }
    }
}

/// One encrypted entry of a chat's message log.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct StoredMessage {
    pub id: i64,
    pub chat_id: i64,
    pub sender: String,
    pub ciphertext: String,
    pub sent_at: String,
}
