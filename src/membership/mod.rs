//! Membership state machine
//!
//! One pure transition function drives both per-Item attendance and named
//! Groups: given a roster and an attendance delta it yields the next roster,
//! the outcome and the group operations that make the provider match.

pub mod item;
pub mod state_machine;

pub use item::{transition_item, ItemTransition};
pub use state_machine::{transition, MembershipChange, MembershipError, Outcome, PlannedOp, Roster};
