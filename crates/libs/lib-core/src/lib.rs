//! # Core Library
//!
//! Configuration, errors, wire events and persistence shared by the chat server.

pub mod config;
pub mod dto;
pub mod error;
pub mod model;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, Result};
pub use model::store::{create_pool, DbPool};
pub use model::UserStatus;
