//! Shared wiring for integration tests: in-memory store, provider and notifier
//! behind the real coordinator and group manager.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use rallypoint::config::CoordinatorConfig;
use rallypoint::identity::{IdentityDirectory, StoreIdentityDirectory};
use rallypoint::model::{NewItem, User};
use rallypoint::provider::{GroupOperationClient, InMemoryGroupProvider, RecordingNotifier};
use rallypoint::store::{InMemoryRecordStore, Kind, Precondition, RecordKey, RecordStore, StoreError, Versioned};
use rallypoint::{AttendanceCoordinator, GroupLifecycleManager, Messenger};

pub struct Harness {
    pub store: Arc<InMemoryRecordStore>,
    pub provider: Arc<InMemoryGroupProvider>,
    pub notifier: Arc<RecordingNotifier>,
    pub directory: Arc<dyn IdentityDirectory>,
    pub config: CoordinatorConfig,
}

/// Messaging address registered for `instance_id`.
pub fn address(instance_id: &str) -> String {
    format!("{instance_id}:device")
}

pub fn new_item(people: i64, attendant: i64) -> NewItem {
    NewItem {
        image: "gs://meetups/park.jpg".to_string(),
        people,
        attendant,
        latitude: 35.6812,
        longitude: 139.7671,
    }
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryRecordStore::new());
        Self {
            directory: Arc::new(StoreIdentityDirectory::new(store.clone())),
            store,
            provider: Arc::new(InMemoryGroupProvider::new()),
            notifier: Arc::new(RecordingNotifier::new()),
            config: CoordinatorConfig {
                max_store_retries: 5,
                retry_base_delay_ms: 1,
                retry_max_delay_ms: 5,
                provider_deadline_ms: 200,
            },
        }
    }

    /// Register a user and return its storage key.
    pub async fn register(&self, instance_id: &str) -> String {
        let user = User {
            instance_id: instance_id.to_string(),
            registration_token: address(instance_id),
            last_update_time: Utc::now(),
        };
        self.store
            .put(
                Kind::User,
                RecordKey::Incomplete,
                serde_json::to_value(&user).unwrap(),
                Precondition::None,
            )
            .await
            .unwrap()
    }

    pub fn coordinator(&self) -> AttendanceCoordinator {
        self.coordinator_with(self.store.clone(), self.provider.clone())
    }

    pub fn coordinator_with(
        &self,
        store: Arc<dyn RecordStore>,
        client: Arc<dyn GroupOperationClient>,
    ) -> AttendanceCoordinator {
        AttendanceCoordinator::new(
            store,
            self.directory.clone(),
            client,
            self.notifier.clone(),
            &self.config,
        )
    }

    pub fn groups(&self) -> GroupLifecycleManager {
        self.groups_with(self.store.clone())
    }

    pub fn groups_with(&self, store: Arc<dyn RecordStore>) -> GroupLifecycleManager {
        GroupLifecycleManager::new(store, self.directory.clone(), self.provider.clone(), &self.config)
    }

    pub fn messenger(&self) -> Messenger {
        Messenger::new(self.store.clone(), self.directory.clone(), self.notifier.clone())
    }
}

/// Store wrapper that answers the next `n` conditional writes with a conflict,
/// as if another request had committed first.
pub struct ConflictingStore {
    inner: Arc<InMemoryRecordStore>,
    remaining: AtomicUsize,
    inserts: bool,
    pub conflicts_raised: AtomicUsize,
}

impl ConflictingStore {
    pub fn new(inner: Arc<InMemoryRecordStore>, conflicts: usize) -> Self {
        Self {
            inner,
            remaining: AtomicUsize::new(conflicts),
            inserts: false,
            conflicts_raised: AtomicUsize::new(0),
        }
    }

    /// Conflicts the next `n` must-not-exist inserts instead of versioned writes.
    pub fn on_insert(inner: Arc<InMemoryRecordStore>, conflicts: usize) -> Self {
        Self {
            inserts: true,
            ..Self::new(inner, conflicts)
        }
    }

    fn take_conflict(&self, kind: Kind, id: &str, precondition: Precondition) -> Result<(), StoreError> {
        let targeted = match precondition {
            Precondition::Version(_) => !self.inserts,
            Precondition::Absent => self.inserts,
            _ => false,
        };
        if !targeted {
            return Ok(());
        }
        let injected = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            self.conflicts_raised.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::Conflict {
                kind,
                id: id.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for ConflictingStore {
    async fn get(&self, kind: Kind, id: &str) -> Result<Versioned, StoreError> {
        self.inner.get(kind, id).await
    }

    async fn query_by_field(
        &self,
        kind: Kind,
        field: &str,
        value: &serde_json::Value,
    ) -> Result<Vec<Versioned>, StoreError> {
        self.inner.query_by_field(kind, field, value).await
    }

    async fn list(&self, kind: Kind) -> Result<Vec<Versioned>, StoreError> {
        self.inner.list(kind).await
    }

    async fn put(
        &self,
        kind: Kind,
        key: RecordKey,
        body: serde_json::Value,
        precondition: Precondition,
    ) -> Result<String, StoreError> {
        if let RecordKey::Complete(id) = &key {
            self.take_conflict(kind, id, precondition)?;
        }
        self.inner.put(kind, key, body, precondition).await
    }

    async fn delete(&self, kind: Kind, id: &str, precondition: Precondition) -> Result<(), StoreError> {
        self.take_conflict(kind, id, precondition)?;
        self.inner.delete(kind, id, precondition).await
    }
}
