//! # Domain Model

pub mod store;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Presence status of a user, serialized lowercase on the wire and in the
/// `users.status` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    Offline,
    Idle,
    Busy,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Offline => "offline",
            UserStatus::Idle => "idle",
            UserStatus::Busy => "busy",
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "offline" => Ok(UserStatus::Offline),
            "idle" => Ok(UserStatus::Idle),
            "busy" => Ok(UserStatus::Busy),
            other => Err(format!("Unknown status '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_and_serialize() {
        assert_eq!("Busy".parse::<UserStatus>().unwrap(), UserStatus::Busy);
        assert!("away".parse::<UserStatus>().is_err());
        assert_eq!(serde_json::to_string(&UserStatus::Idle).unwrap(), "\"idle\"");
    }
}
