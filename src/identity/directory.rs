use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use super::{DirectoryError, Identity, IdentityDirectory};
use crate::model::User;
use crate::store::{Kind, RecordStore, StoreError, Versioned};

/// Directory backed by `User` records in the record store.
pub struct StoreIdentityDirectory {
    store: Arc<dyn RecordStore>,
}

impl StoreIdentityDirectory {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

fn to_identity(record: &Versioned) -> Result<Identity, DirectoryError> {
    let user: User = record.decode().map_err(unavailable)?;
    Ok(Identity {
        storage_key: record.id.clone(),
        identity_key: user.instance_id,
        messaging_address: user.registration_token,
    })
}

fn unavailable(err: StoreError) -> DirectoryError {
    DirectoryError::Unavailable(err.to_string())
}

#[async_trait]
impl IdentityDirectory for StoreIdentityDirectory {
    async fn resolve(&self, identity_key: &str) -> Result<Option<Identity>, DirectoryError> {
        let records = self
            .store
            .query_by_field(Kind::User, "instance_id", &json!(identity_key))
            .await
            .map_err(unavailable)?;
        records.first().map(to_identity).transpose()
    }

    async fn lookup(&self, storage_key: &str) -> Result<Option<Identity>, DirectoryError> {
        match self.store.get(Kind::User, storage_key).await {
            Ok(record) => to_identity(&record).map(Some),
            Err(StoreError::NotFound { .. }) => Ok(None),
            Err(err) => Err(unavailable(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryRecordStore, Precondition, RecordKey};
    use chrono::Utc;

    async fn seeded() -> (StoreIdentityDirectory, String) {
        let store = Arc::new(InMemoryRecordStore::new());
        let user = User {
            instance_id: "inst-1".into(),
            registration_token: "inst-1:token".into(),
            last_update_time: Utc::now(),
        };
        let id = store
            .put(Kind::User, RecordKey::Incomplete, serde_json::to_value(&user).unwrap(), Precondition::None)
            .await
            .unwrap();
        (StoreIdentityDirectory::new(store), id)
    }

    #[tokio::test]
    async fn test_resolve_by_identity_key() {
        let (directory, id) = seeded().await;
        let identity = directory.resolve("inst-1").await.unwrap().unwrap();
        assert_eq!(identity.storage_key, id);
        assert_eq!(identity.messaging_address, "inst-1:token");
        assert!(directory.is_known("inst-1").await.unwrap());
        assert!(!directory.is_known("stranger").await.unwrap());
    }

    #[tokio::test]
    async fn test_lookup_by_storage_key() {
        let (directory, id) = seeded().await;
        assert_eq!(directory.lookup(&id).await.unwrap().unwrap().identity_key, "inst-1");
        assert!(directory.lookup("missing").await.unwrap().is_none());
    }
}
