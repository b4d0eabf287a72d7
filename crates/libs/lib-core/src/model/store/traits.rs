//! # Store Seams
//!
//! The chat core talks to persistence only through these traits so tests can
//! inject failing or slow stores.

use super::models::{StoredMessage, UserProfile};
use crate::error::Result;
use crate::model::UserStatus;
use async_trait::async_trait;

/// Ephemeral per-chat message log.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Create a chat row for the pair and return its id.
    async fn allocate_chat(&self, user_a: &str, user_b: &str) -> Result<i64>;

    /// Look up a chat for the pair in either ordering.
    async fn find_chat(&self, user_a: &str, user_b: &str) -> Result<Option<i64>>;

    async fn append_message(
        &self,
        chat_id: i64,
        sender: &str,
        ciphertext: &str,
        sent_at: &str,
    ) -> Result<()>;

    /// Messages in insertion order.
    async fn read_messages(&self, chat_id: i64) -> Result<Vec<StoredMessage>>;

    /// Delete the chat row and every message in it.
    async fn drop_chat(&self, chat_id: i64) -> Result<()>;
}

/// Avatars and the persisted status projection.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Return the user's profile, creating the row on first sight.
    async fn ensure_user(&self, username: &str) -> Result<UserProfile>;

    async fn profile(&self, username: &str) -> Result<Option<UserProfile>>;

    async fn list_users(&self) -> Result<Vec<UserProfile>>;

    async fn set_status(&self, username: &str, status: UserStatus) -> Result<()>;
}
