use statig::prelude::*;

use crate::membership::Outcome as MembershipOutcome;
use crate::model::Group;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupEvent {
    Create { owner: String },
    AddMember { member: String },
    RemoveMember { member: String },
    /// The owner left; the group cascades away.
    RemoveOwner,
}

impl GroupEvent {
    /// Event for `member` leaving with the given roster outcome.
    pub fn departure(outcome: MembershipOutcome, member: &str) -> Self {
        match outcome {
            MembershipOutcome::CloseItem => GroupEvent::RemoveOwner,
            _ => GroupEvent::RemoveMember {
                member: member.to_string(),
            },
        }
    }
}

/// Existence of one named group: `NonExistent` until created, `Active` until its
/// owner leaves. There are no intermediate states, so a decided deletion
/// always lands in `NonExistent`.
#[derive(Debug, Default)]
pub struct GroupLifecycle {
    pub name: String,
    pub owner: Option<String>,
}

impl GroupLifecycle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: None,
        }
    }

    /// An owner is recorded exactly while the machine is `Active`.
    pub fn is_active(&self) -> bool {
        self.owner.is_some()
    }

    /// Replays a stored group (created by its owner, joined by each member)
    /// and applies `event`. Returns whether the group is still active after it.
    pub fn survives(group: &Group, event: &GroupEvent) -> bool {
        let mut machine = Self::new(group.name.as_str()).state_machine();
        machine.handle(&GroupEvent::Create {
            owner: group.owner.clone(),
        });
        for member in group.members.iter().filter(|m| **m != group.owner) {
            machine.handle(&GroupEvent::AddMember { member: member.clone() });
        }
        machine.handle(event);
        machine.inner().is_active()
    }
}

#[state_machine(initial = "State::non_existent()")]
impl GroupLifecycle {
    #[state]
    fn non_existent(&mut self, event: &GroupEvent) -> Outcome<State> {
        match event {
            GroupEvent::Create { owner } => {
                self.owner = Some(owner.clone());
                tracing::debug!(group = %self.name, owner = %owner, "Group active");
                Transition(State::active())
            }
            _ => {
                tracing::debug!(group = %self.name, event = ?event, "Ignoring event for missing group");
                Handled
            }
        }
    }

    #[state]
    fn active(&mut self, event: &GroupEvent) -> Outcome<State> {
        match event {
            GroupEvent::RemoveOwner => {
                tracing::info!(group = %self.name, owner = ?self.owner, "Owner left, group dissolved");
                self.owner = None;
                Transition(State::non_existent())
            }
            GroupEvent::RemoveMember { member } if self.owner.as_deref() == Some(member.as_str()) => {
                tracing::info!(group = %self.name, "Owner removed, group dissolved");
                self.owner = None;
                Transition(State::non_existent())
            }
            GroupEvent::AddMember { .. } | GroupEvent::RemoveMember { .. } => Handled,
            GroupEvent::Create { .. } => {
                tracing::debug!(group = %self.name, "Group already active");
                Handled
            }
        }
    }
}
