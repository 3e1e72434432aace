use serde::{Deserialize, Serialize};

/// A user-named notification group. Stored under its name, which is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    /// Storage key of the creator. Always `members[0]`.
    pub owner: String,
    pub members: Vec<String>,
    pub notification_key: String,
}

impl Group {
    pub fn new(name: impl Into<String>, owner: impl Into<String>, notification_key: impl Into<String>) -> Self {
        let owner = owner.into();
        Self {
            name: name.into(),
            members: vec![owner.clone()],
            owner,
            notification_key: notification_key.into(),
        }
    }

    pub fn contains(&self, user_key: &str) -> bool {
        self.members.iter().any(|m| m == user_key)
    }

    pub fn is_owner(&self, user_key: &str) -> bool {
        self.owner == user_key
    }
}
