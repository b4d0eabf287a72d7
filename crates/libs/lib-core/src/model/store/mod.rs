//! # Database Store
//!
//! SQLite connection pool, repositories, and the [`ChatStore`] / [`UserDirectory`]
//! seams the chat core depends on.

// region: --- Modules
pub mod chat_repository;
pub mod models;
pub mod sqlite_store;
pub mod traits;
pub mod user_repository;
// endregion: --- Modules

// region: --- Re-exports
pub use chat_repository::ChatRepository;
pub use models::{StoredMessage, UserProfile};
pub use sqlite_store::SqliteStore;
pub use traits::{ChatStore, UserDirectory};
pub use user_repository::UserRepository;
// endregion: --- Re-exports

// region: --- Types and Functions
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::time::Duration;

/// Type alias for SQLite connection pool.
pub type DbPool = SqlitePool;

/// Store calls give up waiting for a connection after this long.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Create a new SQLite connection pool for `database_url`.
pub async fn create_pool(database_url: &str) -> anyhow::Result<DbPool> {
    let options = database_url
        .parse::<SqliteConnectOptions>()?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Apply the embedded migrations in `migrations/`.
pub async fn migrate(pool: &DbPool) -> anyhow::Result<()> {
    sqlx::migrate!("../../../migrations").run(pool).await?;
    Ok(())
}

/// In-memory database with the schema applied, for tests.
///
/// Every pooled connection to `sqlite::memory:` would see its own empty
/// database, so the pool is pinned to one connection.
pub async fn memory_pool() -> anyhow::Result<DbPool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    migrate(&pool).await?;
    Ok(pool)
}
// endregion: --- Types and Functions
