//! Records shared between the coordinator, the group manager and the store.

pub mod group;
pub mod item;
pub mod user;

pub use group::Group;
pub use item::{FieldUpdates, Item, ItemQuery, Member, NewItem};
pub use user::User;
