use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// A participant's identity plus their individual attendant contribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Storage key of the participant in the identity directory.
    pub user_key: String,
    pub attendant: i64,
}

impl Member {
    pub fn new(user_key: impl Into<String>, attendant: i64) -> Self {
        Self {
            user_key: user_key.into(),
            attendant,
        }
    }
}

/// A shared meetup record. `members[0]` is always the owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Store-assigned identifier; absent until the record is first written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub image: String,
    pub people: i64,
    pub attendant: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub create_time: DateTime<Utc>,
    pub members: Vec<Member>,
    pub group_name: String,
    pub group_key: String,
}

impl Item {
    pub fn owner(&self) -> Option<&Member> {
        self.members.first()
    }

    pub fn is_owner(&self, user_key: &str) -> bool {
        self.owner().is_some_and(|owner| owner.user_key == user_key)
    }

    pub fn member(&self, user_key: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.user_key == user_key)
    }

    pub fn is_full(&self) -> bool {
        self.attendant == self.people
    }

    /// Sum of all member contributions. Equal to `attendant` for any consistent item.
    pub fn committed_attendance(&self) -> i64 {
        self.members.iter().map(|m| m.attendant).sum()
    }

    /// Body written to the record store. The id lives in the record key, not the body.
    pub fn to_record_body(&self) -> Result<serde_json::Value, serde_json::Error> {
        let mut body = serde_json::to_value(self)?;
        if let Some(fields) = body.as_object_mut() {
            fields.remove("id");
        }
        Ok(body)
    }
}

/// Creation request submitted by the future owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_capacity"))]
pub struct NewItem {
    #[validate(length(min = 1, message = "image reference is required"))]
    pub image: String,
    #[validate(range(min = 1, message = "people must be positive"))]
    pub people: i64,
    #[validate(range(min = 1, message = "owner must bring at least one attendant"))]
    pub attendant: i64,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
}

fn validate_capacity(item: &NewItem) -> Result<(), ValidationError> {
    if item.attendant >= item.people {
        let mut error = ValidationError::new("capacity");
        error.message = Some("attendant must be smaller than people".into());
        return Err(error);
    }
    Ok(())
}

impl NewItem {
    /// Seed the stored item: the owner is the sole member carrying the requested attendance.
    pub fn into_item(
        self,
        owner_key: &str,
        group_name: String,
        group_key: String,
        now: DateTime<Utc>,
    ) -> Item {
        Item {
            id: None,
            members: vec![Member::new(owner_key, self.attendant)],
            image: self.image,
            people: self.people,
            attendant: self.attendant,
            latitude: self.latitude,
            longitude: self.longitude,
            create_time: now.trunc_subsecs(0),
            group_name,
            group_key,
        }
    }
}

/// Owner-only updates applied alongside an attendance change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldUpdates {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub people: Option<i64>,
}

impl FieldUpdates {
    pub fn is_empty(&self) -> bool {
        self.image.is_none() && self.people.is_none()
    }
}

/// Equality filter used by item search. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemQuery {
    pub image: Option<String>,
    pub people: Option<i64>,
    pub attendant: Option<i64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl ItemQuery {
    /// Field constraints as `(field, value)` pairs, in declaration order.
    pub fn constraints(&self) -> Vec<(&'static str, serde_json::Value)> {
        let mut constraints = Vec::new();
        if let Some(image) = &self.image {
            constraints.push(("image", serde_json::json!(image)));
        }
        if let Some(people) = self.people {
            constraints.push(("people", serde_json::json!(people)));
        }
        if let Some(attendant) = self.attendant {
            constraints.push(("attendant", serde_json::json!(attendant)));
        }
        if let Some(latitude) = self.latitude {
            constraints.push(("latitude", serde_json::json!(latitude)));
        }
        if let Some(longitude) = self.longitude {
            constraints.push(("longitude", serde_json::json!(longitude)));
        }
        constraints
    }

    pub fn matches(&self, item: &Item) -> bool {
        self.image.as_ref().is_none_or(|v| *v == item.image)
            && self.people.is_none_or(|v| v == item.people)
            && self.attendant.is_none_or(|v| v == item.attendant)
            && self.latitude.is_none_or(|v| v == item.latitude)
            && self.longitude.is_none_or(|v| v == item.longitude)
    }
}
