//! # Application Configuration
//!
//! This module manages application configuration loaded from environment variables.
//! All configuration is validated on startup to fail fast if misconfigured.
//!
//! ## Global Config Access
//!
//! Use [`core_config()`] to access the global configuration instance:
//!
//! ```rust,no_run
//! use lib_core::config::core_config;
//!
//! let config = core_config();
//! let ttl = config.chat_request_ttl();
//! ```
//!
//! The config must be initialized once at application startup using [`init_config()`].

use lib_utils::{b64_decode, get_env, get_env_opt, get_env_parse_or};
use std::sync::OnceLock;
use std::time::Duration;

/// Text stored and broadcast in place of a message the moderator flagged.
pub const DEFAULT_MODERATION_PLACEHOLDER: &str =
    "This message was hidden because it looks like spam or abuse.";

/// Avatar used when the directory has no row for a user.
pub const DEFAULT_AVATAR: &str = "/assets/Uzaylı_1.png";

/// Application configuration loaded from environment variables.
#[derive(Clone, Debug)]
pub struct Config {
    /// SQLite database connection URL
    pub database_url: String,

    /// Secret shared with the account service for JWT verification
    ///
    /// **Must be at least 32 characters long** for security.
    pub jwt_secret: String,

    /// Lifetime of tokens minted by the `issue-token` tool.
    ///
    /// Valid range: 1-720 hours (1 hour to 30 days)
    pub jwt_expiration_hours: i64,

    /// Base64-encoded 32 byte AES-256-GCM key for stored messages
    pub message_key: String,

    /// Age at which a pending chat request is swept
    pub chat_request_ttl_secs: u64,

    /// How often the sweeper runs
    pub sweep_interval_secs: u64,

    /// Classifier endpoint; moderation is disabled when unset
    pub moderator_url: Option<String>,

    /// Upper bound on a single moderator call
    pub moderator_timeout_ms: u64,

    pub moderation_placeholder: String,

    pub default_avatar: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, String> {
        let database_url =
            get_env_opt("DATABASE_URL").unwrap_or_else(|| "sqlite:data/pairchat.db".to_string());

        let jwt_secret = get_env("JWT_SECRET").map_err(|e| e.to_string())?;
        let jwt_expiration_hours =
            get_env_parse_or("JWT_EXPIRATION_HOURS", 24).map_err(|e| e.to_string())?;

        let message_key = get_env("MESSAGE_KEY").map_err(|e| e.to_string())?;

        let chat_request_ttl_secs =
            get_env_parse_or("CHAT_REQUEST_TTL_SECS", 300).map_err(|e| e.to_string())?;
        let sweep_interval_secs =
            get_env_parse_or("SWEEP_INTERVAL_SECS", 60).map_err(|e| e.to_string())?;

        let moderator_url = get_env_opt("MODERATOR_URL");
        let moderator_timeout_ms =
            get_env_parse_or("MODERATOR_TIMEOUT_MS", 2000).map_err(|e| e.to_string())?;
        let moderation_placeholder = get_env_opt("MODERATION_PLACEHOLDER")
            .unwrap_or_else(|| DEFAULT_MODERATION_PLACEHOLDER.to_string());

        let default_avatar =
            get_env_opt("DEFAULT_AVATAR").unwrap_or_else(|| DEFAULT_AVATAR.to_string());

        Ok(Self {
            database_url,
            jwt_secret,
            jwt_expiration_hours,
            message_key,
            chat_request_ttl_secs,
            sweep_interval_secs,
            moderator_url,
            moderator_timeout_ms,
            moderation_placeholder,
            default_avatar,
        })
    }

    /// Validate configuration values against security and business rules.
    pub fn validate(&self) -> Result<(), String> {
        if self.jwt_secret.len() < 32 {
            return Err("JWT_SECRET must be at least 32 characters long".to_string());
        }

        if self.jwt_expiration_hours < 1 || self.jwt_expiration_hours > 720 {
            return Err("JWT_EXPIRATION_HOURS must be between 1 and 720 (30 days)".to_string());
        }

        match b64_decode(&self.message_key) {
            Ok(key) if key.len() == 32 => {}
            Ok(key) => {
                return Err(format!(
                    "MESSAGE_KEY must decode to 32 bytes, got {}",
                    key.len()
                ))
            }
            Err(_) => return Err("MESSAGE_KEY must be valid base64".to_string()),
        }

        if self.chat_request_ttl_secs == 0 {
            return Err("CHAT_REQUEST_TTL_SECS must be greater than 0".to_string());
        }
        if self.sweep_interval_secs == 0 {
            return Err("SWEEP_INTERVAL_SECS must be greater than 0".to_string());
        }
        if self.moderator_timeout_ms == 0 {
            return Err("MODERATOR_TIMEOUT_MS must be greater than 0".to_string());
        }

        Ok(())
    }

    pub fn chat_request_ttl(&self) -> Duration {
        Duration::from_secs(self.chat_request_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn moderator_timeout(&self) -> Duration {
        Duration::from_millis(self.moderator_timeout_ms)
    }
}

/// Global configuration instance (initialized once at startup).
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Initialize the global configuration.
///
/// Call once at startup, after `dotenvy::dotenv()`.
///
/// # Errors
///
/// Returns an error if:
/// - Environment variables are missing or invalid
/// - Configuration validation fails
/// - Config has already been initialized
pub fn init_config() -> Result<&'static Config, String> {
    let config = Config::from_env()?;
    config.validate()?;

    CONFIG
        .set(config)
        .map_err(|_| "Config has already been initialized".to_string())?;
    Ok(core_config())
}

/// Get a reference to the global configuration.
///
/// # Panics
///
/// Panics if [`init_config()`] has not been called yet.
pub fn core_config() -> &'static Config {
    CONFIG
        .get()
        .expect("Config must be initialized with init_config() before use")
}
