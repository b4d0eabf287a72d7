//! # Chat Repository
//!
//! Chat rows and their message logs. A chat row lives exactly as long as the
//! chat session it backs.

use super::models::StoredMessage;
use super::DbPool;
use sqlx::query_as;

pub struct ChatRepository;

impl ChatRepository {
    /// Insert a chat row for the pair and return the new `chat_id`.
    pub async fn allocate(pool: &DbPool, user_a: &str, user_b: &str) -> Result<i64, sqlx::Error> {
        let result = sqlx::query("INSERT INTO chats (main_user, connection_user) VALUES (?, ?)")
            .bind(user_a)
            .bind(user_b)
            .execute(pool)
            .await?;

        Ok(result.last_insert_rowid())
    }

    /// The stored row is directional; the pair is not.
    pub async fn find(pool: &DbPool, user_a: &str, user_b: &str) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT chat_id FROM chats \
             WHERE (main_user = ?1 AND connection_user = ?2) \
                OR (main_user = ?2 AND connection_user = ?1) \
             ORDER BY chat_id LIMIT 1",
        )
        .bind(user_a)
        .bind(user_b)
        .fetch_optional(pool)
        .await
    }

    pub async fn append(
        pool: &DbPool,
        chat_id: i64,
        sender: &str,
        ciphertext: &str,
        sent_at: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO chat_messages (chat_id, sender, ciphertext, sent_at) VALUES (?, ?, ?, ?)",
        )
        .bind(chat_id)
        .bind(sender)
        .bind(ciphertext)
        .bind(sent_at)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn read(pool: &DbPool, chat_id: i64) -> Result<Vec<StoredMessage>, sqlx::Error> {
        query_as::<_, StoredMessage>(
            "SELECT id, chat_id, sender, ciphertext, sent_at FROM chat_messages \
             WHERE chat_id = ? ORDER BY id",
        )
        .bind(chat_id)
        .fetch_all(pool)
        .await
    }

    /// Delete the messages and the chat row in one transaction.
    pub async fn delete(pool: &DbPool, chat_id: i64) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM chat_messages WHERE chat_id = ?")
            .bind(chat_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chats WHERE chat_id = ?")
            .bind(chat_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await
    }
}
