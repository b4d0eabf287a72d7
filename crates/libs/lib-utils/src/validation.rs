//! # Validation Utilities
//!
//! Input validation helpers.

/// Longest username accepted on the wire.
pub const MAX_USERNAME_LEN: usize = 64;

/// Validate a username received from a client event.
pub fn validate_username(value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err("Username cannot be empty".to_string());
    }
    if value.len() > MAX_USERNAME_LEN {
        return Err(format!(
            "Username must be at most {} characters",
            MAX_USERNAME_LEN
        ));
    }
    if value.chars().any(char::is_control) {
        return Err("Username contains invalid characters".to_string());
    }
    Ok(())
}
