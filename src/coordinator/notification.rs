use crate::membership::{ItemTransition, Outcome};
use crate::provider::NotificationPayload;

/// Human-readable summary of a committed change, sent to the item's group.
pub fn compose_message(transition: &ItemTransition) -> String {
    let item = &transition.item;
    let delta = transition.change.delta;
    let mut parts = Vec::new();

    match transition.outcome() {
        Outcome::AppendMember => parts.push(format!(
            "A new member joined and the item now has {}/{}.",
            item.attendant, item.people
        )),
        Outcome::AddAttendant if delta > 0 => parts.push(format!(
            "A member is bringing {delta} more and the item now has {}/{}.",
            item.attendant, item.people
        )),
        Outcome::AddAttendant => parts.push(format!(
            "A member is bringing {} fewer and the item now has {}/{}.",
            -delta, item.attendant, item.people
        )),
        Outcome::RemoveMember => parts.push(format!(
            "A member left and the item now has {}/{}.",
            item.attendant, item.people
        )),
        Outcome::CloseItem => parts.push("The item was closed because its owner left.".to_string()),
        Outcome::Unchanged => {}
    }

    if transition.fields_updated {
        parts.push("The owner updated the item.".to_string());
    }
    if transition.is_full() {
        parts.push("The item is full. Time to get together!".to_string());
    }

    parts.join(" ")
}

pub fn item_payload(transition: &ItemTransition, item_id: &str, requested_by: &str) -> NotificationPayload {
    NotificationPayload {
        message: compose_message(transition),
        item_id: Some(item_id.to_string()),
        request_user_id: Some(requested_by.to_string()),
    }
}
