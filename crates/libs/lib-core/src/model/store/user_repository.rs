//! # User Repository
//!
//! Directory rows for chat users. Accounts live in the external auth service;
//! a row is created here the first time a username connects.

use super::models::{UserProfile, UserRow};
use super::DbPool;
use crate::model::UserStatus;
use sqlx::query_as;

/// Number of bundled avatar images.
const AVATAR_COUNT: u32 = 4;

/// Deterministic avatar for a username.
pub fn avatar_for(username: &str) -> String {
    let sum: u32 = username.bytes().map(u32::from).sum();
    format!("/assets/Uzaylı_{}.png", sum % AVATAR_COUNT + 1)
}

/// User repository for database operations.
pub struct UserRepository;

impl UserRepository {
    /// Insert the user if missing and return the stored row.
    pub async fn ensure(pool: &DbPool, username: &str) -> Result<UserProfile, sqlx::Error> {
        sqlx::query(
            "INSERT INTO users (username, status, avatar) VALUES (?, ?, ?) \
             ON CONFLICT(username) DO NOTHING",
        )
        .bind(username)
        .bind(UserStatus::Offline.as_str())
        .bind(avatar_for(username))
        .execute(pool)
        .await?;

        let row = query_as::<_, UserRow>(
            "SELECT id, username, status, avatar FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_one(pool)
        .await?;

        Ok(row.into())
    }

    /// Find a user by their username.
    pub async fn find_by_username(
        pool: &DbPool,
        username: &str,
    ) -> Result<Option<UserProfile>, sqlx::Error> {
        let row = query_as::<_, UserRow>(
            "SELECT id, username, status, avatar FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// All users, ordered by username.
    pub async fn list(pool: &DbPool) -> Result<Vec<UserProfile>, sqlx::Error> {
        let rows = query_as::<_, UserRow>(
            "SELECT id, username, status, avatar FROM users ORDER BY username",
        )
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Write the status projection. Returns `false` if no row matched.
    pub async fn set_status(
        pool: &DbPool,
        username: &str,
        status: UserStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET status = ? WHERE username = ?")
            .bind(status.as_str())
            .bind(username)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
