// Rallypoint Library - meetup membership coordination
// This exposes the core components for the CLI, tests and embedding services

pub mod config;
pub mod coordinator;
pub mod errors;
pub mod groups;
pub mod identity;
pub mod membership;
pub mod model;
pub mod observability;
pub mod provider;
pub mod store;
pub mod telemetry;

// Re-export key types for easy access
pub use config::{load_env_file, RallypointConfig};
pub use coordinator::{AttendanceCoordinator, AttendanceReport, ItemCreated, OperationRunner};
pub use errors::{CoordinatorError, ErrorKind, ErrorPayload, Reply};
pub use groups::{GroupLifecycleManager, GroupStatus, Messenger, Recipient};
pub use identity::{
    CachingDirectory, HttpTokenVerifier, Identity, IdentityDirectory, IdentityRegistrar, StoreIdentityDirectory,
    TokenVerifier,
};
pub use membership::{transition, transition_item, MembershipError, Outcome, Roster};
pub use model::{FieldUpdates, Group, Item, ItemQuery, Member, NewItem, User};
pub use observability::{membership_metrics, MembershipMetrics, OperationTimer};
pub use provider::{
    BroadcastNotifier, GroupOperation, GroupOperationClient, HttpBroadcastNotifier, HttpGroupClient, ProviderError,
};
pub use store::{run_in_transaction, InMemoryRecordStore, RecordStore, StoreError, TransactionPolicy};
pub use telemetry::{create_membership_span, generate_correlation_id, init_telemetry};
