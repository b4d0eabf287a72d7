use serde::{Deserialize, Serialize};

use super::events::PresenceUser;

/// Response body of `GET /api/users`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsersResponse {
    pub users: Vec<PresenceUser>,
}
