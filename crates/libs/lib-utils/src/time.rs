//! # Time Utilities
//!
//! Chat messages carry a second-resolution local timestamp, matching what web
//! clients already render.

use chrono::{DateTime, Local, Utc};

/// Format used for `new_message.time` and stored message rows.
pub const CHAT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Get current UTC time.
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// Current local time formatted with [`CHAT_TIME_FORMAT`].
pub fn chat_timestamp() -> String {
    Local::now().format(CHAT_TIME_FORMAT).to_string()
}
