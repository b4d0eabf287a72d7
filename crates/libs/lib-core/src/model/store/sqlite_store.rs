//! SQLite-backed implementation of the store seams.

use super::chat_repository::ChatRepository;
use super::models::{StoredMessage, UserProfile};
use super::traits::{ChatStore, UserDirectory};
use super::user_repository::UserRepository;
use super::DbPool;
use crate::error::Result;
use crate::model::UserStatus;
use async_trait::async_trait;

#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl ChatStore for SqliteStore {
    async fn allocate_chat(&self, user_a: &str, user_b: &str) -> Result<i64> {
        Ok(ChatRepository::allocate(&self.pool, user_a, user_b).await?)
    }

    async fn find_chat(&self, user_a: &str, user_b: &str) -> Result<Option<i64>> {
        Ok(ChatRepository::find(&self.pool, user_a, user_b).await?)
    }

    async fn append_message(
        &self,
        chat_id: i64,
        sender: &str,
        ciphertext: &str,
        sent_at: &str,
    ) -> Result<()> {
        Ok(ChatRepository::append(&self.pool, chat_id, sender, ciphertext, sent_at).await?)
    }

    async fn read_messages(&self, chat_id: i64) -> Result<Vec<StoredMessage>> {
        Ok(ChatRepository::read(&self.pool, chat_id).await?)
    }

    async fn drop_chat(&self, chat_id: i64) -> Result<()> {
        Ok(ChatRepository::delete(&self.pool, chat_id).await?)
    }
}

#[async_trait]
impl UserDirectory for SqliteStore {
    async fn ensure_user(&self, username: &str) -> Result<UserProfile> {
        Ok(UserRepository::ensure(&self.pool, username).await?)
    }

    async fn profile(&self, username: &str) -> Result<Option<UserProfile>> {
        Ok(UserRepository::find_by_username(&self.pool, username).await?)
    }

    async fn list_users(&self) -> Result<Vec<UserProfile>> {
        Ok(UserRepository::list(&self.pool).await?)
    }

    async fn set_status(&self, username: &str, status: UserStatus) -> Result<()> {
        UserRepository::set_status(&self.pool, username, status).await?;
        Ok(())
    }
}
