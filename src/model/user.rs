use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered identity. The record id is the identity's storage key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub instance_id: String,
    pub registration_token: String,
    pub last_update_time: DateTime<Utc>,
}
