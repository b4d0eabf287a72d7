//! # Utilities Library
//!
//! Shared helpers for base64 payloads, environment variables, chat timestamps and
//! username validation.

pub mod b64;
pub mod envs;
pub mod time;
pub mod validation;

// Re-export commonly used functions
pub use b64::{b64_decode, b64_encode};
pub use envs::{get_env, get_env_opt, get_env_parse_or};
pub use time::{chat_timestamp, now_utc, CHAT_TIME_FORMAT};
pub use validation::validate_username;
