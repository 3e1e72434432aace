//! In-process stand-ins for the push provider.
//!
//! `InMemoryGroupProvider` behaves like the real service where it matters to the
//! coordinator: adds and removes are idempotent, a group disappears once its last
//! member leaves, and keys are only handed out by `create`. Failures can be queued
//! to exercise abort and cascade paths.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::client::GroupOperationClient;
use super::errors::ProviderError;
use super::notifier::BroadcastNotifier;
use super::types::{GroupOperation, NotificationPayload, OperationKind};

#[derive(Debug, Default)]
struct ProviderState {
    next_key: u64,
    /// key -> member addresses
    groups: HashMap<String, BTreeSet<String>>,
    /// key name -> key
    names: HashMap<String, String>,
    log: Vec<GroupOperation>,
    queued_failures: VecDeque<ProviderError>,
    failing_addresses: HashMap<String, ProviderError>,
}

#[derive(Debug, Default)]
pub struct InMemoryGroupProvider {
    state: Mutex<ProviderState>,
}

impl InMemoryGroupProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next call with `error`, before it has any effect.
    pub async fn fail_next(&self, error: ProviderError) {
        self.state.lock().await.queued_failures.push_back(error);
    }

    /// Fail every operation that involves `address`.
    pub async fn fail_address(&self, address: impl Into<String>, error: ProviderError) {
        self.state.lock().await.failing_addresses.insert(address.into(), error);
    }

    /// Current members of the group with `key`, if it exists.
    pub async fn members(&self, key: &str) -> Option<BTreeSet<String>> {
        self.state.lock().await.groups.get(key).cloned()
    }

    pub async fn key_for(&self, key_name: &str) -> Option<String> {
        self.state.lock().await.names.get(key_name).cloned()
    }

    pub async fn group_count(&self) -> usize {
        self.state.lock().await.groups.len()
    }

    /// Every operation received, including failed ones, in arrival order.
    pub async fn operations(&self) -> Vec<GroupOperation> {
        self.state.lock().await.log.clone()
    }

    pub async fn operations_of(&self, kind: OperationKind) -> Vec<GroupOperation> {
        self.operations()
            .await
            .into_iter()
            .filter(|op| op.operation == kind)
            .collect()
    }
}

fn rejected(operation: &GroupOperation, reason: &str) -> ProviderError {
    ProviderError::Rejected {
        operation: operation.operation.to_string(),
        status: 400,
        reason: reason.to_string(),
    }
}

#[async_trait]
impl GroupOperationClient for InMemoryGroupProvider {
    async fn send(&self, operation: &GroupOperation) -> Result<String, ProviderError> {
        let mut state = self.state.lock().await;
        state.log.push(operation.clone());

        if let Some(error) = state.queued_failures.pop_front() {
            return Err(error);
        }
        if let Some(error) = operation
            .addresses
            .iter()
            .find_map(|address| state.failing_addresses.get(address))
        {
            return Err(error.clone());
        }
        if operation.addresses.is_empty() {
            return Err(rejected(operation, "no registration ids"));
        }

        match operation.operation {
            OperationKind::Create => {
                if state.names.contains_key(&operation.key_name) {
                    return Err(rejected(operation, "notification_key already exists"));
                }
                state.next_key += 1;
                let key = format!("APA91-{:04}", state.next_key);
                state
                    .groups
                    .insert(key.clone(), operation.addresses.iter().cloned().collect());
                state.names.insert(operation.key_name.clone(), key.clone());
                debug!(key_name = %operation.key_name, key = %key, "Created in-memory group");
                Ok(key)
            }
            OperationKind::Add => {
                let key = operation
                    .key
                    .clone()
                    .ok_or_else(|| rejected(operation, "notification_key missing"))?;
                let members = state
                    .groups
                    .get_mut(&key)
                    .ok_or_else(|| rejected(operation, "notification_key not found"))?;
                members.extend(operation.addresses.iter().cloned());
                Ok(key)
            }
            OperationKind::Remove => {
                let key = operation
                    .key
                    .clone()
                    .ok_or_else(|| rejected(operation, "notification_key missing"))?;
                let dissolved = match state.groups.get_mut(&key) {
                    Some(members) => {
                        for address in &operation.addresses {
                            members.remove(address);
                        }
                        members.is_empty()
                    }
                    // Removing from a group that is already gone is a no-op.
                    None => false,
                };
                if dissolved {
                    state.groups.remove(&key);
                    state.names.retain(|_, k| *k != key);
                    debug!(key = %key, "In-memory group dissolved");
                }
                Ok(key)
            }
        }
    }
}

/// Broadcast notifier that records deliveries instead of sending them.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, NotificationPayload)>>,
    failing: Mutex<HashSet<String>>,
    fail_all: Mutex<Option<ProviderError>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every delivery with `error`.
    pub async fn fail_with(&self, error: ProviderError) {
        *self.fail_all.lock().await = Some(error);
    }

    /// Fail deliveries to one group key.
    pub async fn fail_for(&self, group_key: impl Into<String>) {
        self.failing.lock().await.insert(group_key.into());
    }

    pub async fn sent(&self) -> Vec<(String, NotificationPayload)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl BroadcastNotifier for RecordingNotifier {
    async fn send(&self, group_key: &str, payload: &NotificationPayload) -> Result<(), ProviderError> {
        if let Some(error) = self.fail_all.lock().await.clone() {
            return Err(error);
        }
        if self.failing.lock().await.contains(group_key) {
            return Err(ProviderError::unavailable(format!("delivery to {group_key} failed")));
        }
        self.sent
            .lock()
            .await
            .push((group_key.to_string(), payload.clone()));
        Ok(())
    }
}
