use chrono::{DateTime, SubsecRound, Utc};

use super::state_machine::{transition, MembershipChange, MembershipError, Outcome, PlannedOp, Roster};
use crate::model::{FieldUpdates, Item};

/// An attendance change applied to a whole Item.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemTransition {
    /// The item to persist. Meaningless once the outcome is `CloseItem`.
    pub item: Item,
    pub change: MembershipChange,
    /// The owner changed image or capacity in the same request.
    pub fields_updated: bool,
}

impl ItemTransition {
    pub fn outcome(&self) -> Outcome {
        self.change.outcome
    }

    pub fn is_closing(&self) -> bool {
        self.change.outcome == Outcome::CloseItem
    }

    pub fn is_full(&self) -> bool {
        !self.is_closing() && self.item.is_full()
    }

    pub fn operations(&self) -> &[PlannedOp] {
        &self.change.operations
    }

    /// Nothing to write back.
    pub fn is_noop(&self) -> bool {
        self.change.outcome == Outcome::Unchanged && !self.fields_updated
    }
}

impl From<&Item> for Roster {
    fn from(item: &Item) -> Self {
        Roster {
            capacity: Some(item.people),
            attendant: item.attendant,
            members: item.members.clone(),
        }
    }
}

/// Apply `delta` for `acting` to `item`, plus owner field updates.
///
/// Geolocation never changes after creation. Field updates from anyone but the
/// owner are ignored, as are updates riding on the owner's departure.
pub fn transition_item(
    item: &Item,
    acting: &str,
    delta: i64,
    updates: &FieldUpdates,
    now: DateTime<Utc>,
) -> Result<ItemTransition, MembershipError> {
    let change = transition(&Roster::from(item), acting, delta)?;

    let mut next = item.clone();
    next.attendant = change.roster.attendant;
    next.members = change.roster.members.clone();

    let mut fields_updated = false;
    if item.is_owner(acting) && !change.is_departure() {
        if let Some(image) = updates.image.as_deref().filter(|i| !i.is_empty()) {
            if image != next.image {
                next.image = image.to_string();
                fields_updated = true;
            }
        }
        if let Some(people) = updates.people {
            if people <= 0 || people < next.attendant {
                return Err(MembershipError::InvalidUpdate(format!(
                    "people {people} cannot hold {} attendants",
                    next.attendant
                )));
            }
            if people != next.people {
                next.people = people;
                fields_updated = true;
            }
        }
        if fields_updated {
            next.create_time = now.trunc_subsecs(0);
        }
    }

    Ok(ItemTransition {
        item: next,
        change,
        fields_updated,
    })
}
