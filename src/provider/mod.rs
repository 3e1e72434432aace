//! External push-notification group provider: operation client, broadcast
//! notifier and in-memory doubles of both.

pub mod client;
pub mod errors;
pub mod memory;
pub mod notifier;
pub mod types;

pub use client::{GroupOperationClient, HttpGroupClient};
pub use errors::ProviderError;
pub use memory::{InMemoryGroupProvider, RecordingNotifier};
pub use notifier::{BroadcastNotifier, HttpBroadcastNotifier};
pub use types::{GroupOperation, GroupOperationReply, NotificationPayload, OperationKind};

#[cfg(any(test, feature = "testing"))]
pub use client::MockGroupOperationClient;
#[cfg(any(test, feature = "testing"))]
pub use notifier::MockBroadcastNotifier;
