use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Add,
    Remove,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Create => f.write_str("create"),
            OperationKind::Add => f.write_str("add"),
            OperationKind::Remove => f.write_str("remove"),
        }
    }
}

/// A create/add/remove command for one device group. Built per call, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupOperation {
    pub operation: OperationKind,
    /// Stable name of the group on the provider side.
    #[serde(rename = "notification_key_name")]
    pub key_name: String,
    /// Provider-assigned key; absent on create.
    #[serde(rename = "notification_key", default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(rename = "registration_ids")]
    pub addresses: Vec<String>,
}

impl GroupOperation {
    pub fn create(key_name: impl Into<String>, owner_address: impl Into<String>) -> Self {
        Self {
            operation: OperationKind::Create,
            key_name: key_name.into(),
            key: None,
            addresses: vec![owner_address.into()],
        }
    }

    pub fn add(key_name: impl Into<String>, key: impl Into<String>, addresses: Vec<String>) -> Self {
        Self {
            operation: OperationKind::Add,
            key_name: key_name.into(),
            key: Some(key.into()),
            addresses,
        }
    }

    pub fn remove(key_name: impl Into<String>, key: impl Into<String>, addresses: Vec<String>) -> Self {
        Self {
            operation: OperationKind::Remove,
            key_name: key_name.into(),
            key: Some(key.into()),
            addresses,
        }
    }
}

/// Provider reply to a group operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupOperationReply {
    #[serde(default)]
    pub notification_key: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Data delivered to every device of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub message: String,
    #[serde(rename = "ItemId", default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    #[serde(rename = "RequestUserId", default, skip_serializing_if = "Option::is_none")]
    pub request_user_id: Option<String>,
}

impl NotificationPayload {
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            item_id: None,
            request_user_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_operation_wire_shape() {
        let op = GroupOperation::create("u1-17f", "addr-1");
        assert_eq!(
            serde_json::to_value(&op).unwrap(),
            json!({
                "operation": "create",
                "notification_key_name": "u1-17f",
                "registration_ids": ["addr-1"]
            })
        );
    }

    #[test]
    fn test_add_operation_carries_key() {
        let op = GroupOperation::add("teamA", "K1", vec!["addr-2".into()]);
        let wire = serde_json::to_value(&op).unwrap();
        assert_eq!(wire["operation"], "add");
        assert_eq!(wire["notification_key"], "K1");
    }

    #[test]
    fn test_payload_omits_unset_ids() {
        let wire = serde_json::to_value(NotificationPayload::text("hello")).unwrap();
        assert_eq!(wire, json!({"message": "hello"}));
    }
}
