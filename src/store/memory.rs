use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{Kind, Precondition, RecordKey, RecordStore, StoreError, Versioned};

#[derive(Debug, Clone)]
struct Entry {
    version: u64,
    body: serde_json::Value,
}

/// Process-local record store with per-record versions.
///
/// Used by the CLI simulation and integration tests. A single lock serializes
/// writes, so every conditional write observes the latest committed version.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<(Kind, String), Entry>>,
    unavailable: AtomicBool,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `Unavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn len(&self, kind: Kind) -> usize {
        self.records.read().await.keys().filter(|(k, _)| *k == kind).count()
    }

    pub async fn is_empty(&self, kind: Kind) -> bool {
        self.len(kind).await == 0
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                message: "in-memory store switched off".to_string(),
            });
        }
        Ok(())
    }
}

fn conflict(kind: Kind, id: &str) -> StoreError {
    StoreError::Conflict {
        kind,
        id: id.to_string(),
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get(&self, kind: Kind, id: &str) -> Result<Versioned, StoreError> {
        self.check_available()?;
        let records = self.records.read().await;
        records
            .get(&(kind, id.to_string()))
            .map(|entry| Versioned {
                id: id.to_string(),
                version: entry.version,
                body: entry.body.clone(),
            })
            .ok_or_else(|| StoreError::NotFound {
                kind,
                id: id.to_string(),
            })
    }

    async fn query_by_field(
        &self,
        kind: Kind,
        field: &str,
        value: &serde_json::Value,
    ) -> Result<Vec<Versioned>, StoreError> {
        let matching = self
            .list(kind)
            .await?
            .into_iter()
            .filter(|record| record.body.get(field) == Some(value))
            .collect();
        Ok(matching)
    }

    async fn list(&self, kind: Kind) -> Result<Vec<Versioned>, StoreError> {
        self.check_available()?;
        let records = self.records.read().await;
        let mut listed: Vec<Versioned> = records
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|((_, id), entry)| Versioned {
                id: id.clone(),
                version: entry.version,
                body: entry.body.clone(),
            })
            .collect();
        listed.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(listed)
    }

    async fn put(
        &self,
        kind: Kind,
        key: RecordKey,
        body: serde_json::Value,
        precondition: Precondition,
    ) -> Result<String, StoreError> {
        self.check_available()?;
        let mut records = self.records.write().await;

        let id = match key {
            RecordKey::Incomplete => Uuid::new_v4().simple().to_string(),
            RecordKey::Complete(id) => id,
        };
        let slot = (kind, id.clone());
        let current = records.get(&slot).map(|entry| entry.version);

        match (precondition, current) {
            (Precondition::Absent, Some(_)) => return Err(conflict(kind, &id)),
            (Precondition::Version(_), None) => return Err(conflict(kind, &id)),
            (Precondition::Version(expected), Some(actual)) if expected != actual => {
                return Err(conflict(kind, &id))
            }
            _ => {}
        }

        let version = current.map_or(1, |v| v + 1);
        debug!(kind = %kind, id = %id, version, "Stored record");
        records.insert(slot, Entry { version, body });
        Ok(id)
    }

    async fn delete(&self, kind: Kind, id: &str, precondition: Precondition) -> Result<(), StoreError> {
        self.check_available()?;
        let mut records = self.records.write().await;
        let slot = (kind, id.to_string());

        match (precondition, records.get(&slot).map(|entry| entry.version)) {
            (Precondition::None, None) => {
                return Err(StoreError::NotFound {
                    kind,
                    id: id.to_string(),
                })
            }
            (Precondition::Absent, Some(_)) | (Precondition::Version(_), None) => {
                return Err(conflict(kind, id))
            }
            (Precondition::Version(expected), Some(actual)) if expected != actual => {
                return Err(conflict(kind, id))
            }
            _ => {}
        }

        records.remove(&slot);
        debug!(kind = %kind, id = %id, "Deleted record");
        Ok(())
    }
}
