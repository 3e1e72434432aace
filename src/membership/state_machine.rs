use thiserror::Error;

use crate::model::Member;
use crate::provider::{GroupOperation, OperationKind};

/// Membership view shared by Items and named Groups. `members[0]` is the owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roster {
    /// Upper bound for `attendant`; named groups are unbounded.
    pub capacity: Option<i64>,
    pub attendant: i64,
    pub members: Vec<Member>,
}

impl Roster {
    pub fn position(&self, user_key: &str) -> Option<usize> {
        self.members.iter().position(|m| m.user_key == user_key)
    }

    pub fn contribution(&self, user_key: &str) -> Option<i64> {
        self.position(user_key).map(|i| self.members[i].attendant)
    }

    pub fn is_full(&self) -> bool {
        self.capacity == Some(self.attendant)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A new participant joined, or a zero-contribution member rejoined.
    AppendMember,
    /// An existing member changed their contribution without leaving.
    AddAttendant,
    /// A non-owner's contribution reached zero and they were spliced out.
    RemoveMember,
    /// The owner's contribution reached zero; the whole record goes away.
    CloseItem,
    /// Zero delta: nothing to do.
    Unchanged,
}

/// A group operation the caller must run before committing the change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedOp {
    pub kind: OperationKind,
    /// Storage key of the member whose address the operation carries.
    pub user_key: String,
    /// Failures are logged and skipped instead of aborting the change.
    pub best_effort: bool,
}

impl PlannedOp {
    /// Bind the op to a concrete provider group and the member's resolved address.
    pub fn bind(&self, key_name: &str, key: &str, address: String) -> GroupOperation {
        match self.kind {
            OperationKind::Create => GroupOperation::create(key_name, address),
            OperationKind::Add => GroupOperation::add(key_name, key, vec![address]),
            OperationKind::Remove => GroupOperation::remove(key_name, key, vec![address]),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MembershipError {
    #[error("too many attendants: {attendant} + {delta} exceeds capacity {capacity}")]
    TooManyAttendants { attendant: i64, delta: i64, capacity: i64 },

    #[error("too few attendants: {attendant} + {delta} is negative")]
    TooFewAttendants { attendant: i64, delta: i64 },

    #[error("{user_key} is not a member")]
    NotAMember { user_key: String },

    #[error("{user_key} cannot withdraw {requested} with {contribution} committed")]
    OverWithdrawal { user_key: String, contribution: i64, requested: i64 },

    #[error("invalid update: {0}")]
    InvalidUpdate(String),
}

impl MembershipError {
    pub fn is_capacity_violation(&self) -> bool {
        matches!(
            self,
            MembershipError::TooManyAttendants { .. } | MembershipError::TooFewAttendants { .. }
        )
    }
}

/// Result of applying one attendance delta to a roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipChange {
    pub roster: Roster,
    pub outcome: Outcome,
    pub acting: String,
    pub delta: i64,
    /// Contribution of the acting identity before the change (0 if new).
    pub previous_contribution: i64,
    pub operations: Vec<PlannedOp>,
}

impl MembershipChange {
    pub fn is_full(&self) -> bool {
        self.outcome != Outcome::CloseItem && self.roster.is_full()
    }

    pub fn is_departure(&self) -> bool {
        matches!(self.outcome, Outcome::RemoveMember | Outcome::CloseItem)
    }
}

/// Compute the next roster for `acting` changing their contribution by `delta`,
/// together with the group operations that realize it.
pub fn transition(roster: &Roster, acting: &str, delta: i64) -> Result<MembershipChange, MembershipError> {
    let too_many = || MembershipError::TooManyAttendants {
        attendant: roster.attendant,
        delta,
        capacity: roster.capacity.unwrap_or(i64::MAX),
    };
    let too_few = || MembershipError::TooFewAttendants {
        attendant: roster.attendant,
        delta,
    };

    let attendant = roster
        .attendant
        .checked_add(delta)
        .ok_or_else(|| if delta > 0 { too_many() } else { too_few() })?;
    if roster.capacity.is_some_and(|capacity| attendant > capacity) {
        return Err(too_many());
    }
    if attendant < 0 {
        return Err(too_few());
    }

    let mut next = roster.clone();
    let unchanged = |previous_contribution| MembershipChange {
        roster: roster.clone(),
        outcome: Outcome::Unchanged,
        acting: acting.to_string(),
        delta,
        previous_contribution,
        operations: Vec::new(),
    };

    let Some(index) = roster.position(acting) else {
        return match delta {
            0 => Ok(unchanged(0)),
            d if d < 0 => Err(MembershipError::NotAMember {
                user_key: acting.to_string(),
            }),
            _ => {
                next.attendant = attendant;
                next.members.push(Member::new(acting, delta));
                Ok(MembershipChange {
                    roster: next,
                    outcome: Outcome::AppendMember,
                    acting: acting.to_string(),
                    delta,
                    previous_contribution: 0,
                    operations: vec![PlannedOp {
                        kind: OperationKind::Add,
                        user_key: acting.to_string(),
                        best_effort: false,
                    }],
                })
            }
        };
    };

    let previous = roster.members[index].attendant;
    if delta == 0 {
        return Ok(unchanged(previous));
    }

    let contribution = previous
        .checked_add(delta)
        .ok_or_else(|| if delta > 0 { too_many() } else { too_few() })?;
    if contribution < 0 {
        return Err(MembershipError::OverWithdrawal {
            user_key: acting.to_string(),
            contribution: previous,
            requested: -delta,
        });
    }

    next.attendant = attendant;
    next.members[index].attendant = contribution;

    let (outcome, operations) = if contribution == 0 && index == 0 {
        // Every member, owner included, is removed so the provider group dissolves.
        let removals = roster
            .members
            .iter()
            .map(|m| PlannedOp {
                kind: OperationKind::Remove,
                user_key: m.user_key.clone(),
                best_effort: true,
            })
            .collect();
        (Outcome::CloseItem, removals)
    } else if contribution == 0 {
        next.members.swap_remove(index);
        let removal = PlannedOp {
            kind: OperationKind::Remove,
            user_key: acting.to_string(),
            best_effort: false,
        };
        (Outcome::RemoveMember, vec![removal])
    } else if previous == 0 {
        let rejoin = PlannedOp {
            kind: OperationKind::Add,
            user_key: acting.to_string(),
            best_effort: false,
        };
        (Outcome::AppendMember, vec![rejoin])
    } else {
        (Outcome::AddAttendant, Vec::new())
    };

    Ok(MembershipChange {
        roster: next,
        outcome,
        acting: acting.to_string(),
        delta,
        previous_contribution: previous,
        operations,
    })
}
