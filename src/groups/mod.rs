//! Named groups and direct messaging
//!
//! A group exists from its first join until its owner leaves. Membership
//! changes reuse the roster transition used for Items, with every member
//! contributing exactly one seat.

pub mod lifecycle;
pub mod manager;
pub mod messages;

pub use lifecycle::{GroupEvent, GroupLifecycle};
pub use manager::{GroupLifecycleManager, GroupStatus};
pub use messages::{Messenger, Recipient};
