use std::sync::Arc;

use chrono::{SubsecRound, Utc};
use serde_json::json;
use tracing::{info, warn, Instrument};

use super::TokenVerifier;
use crate::config::CoordinatorConfig;
use crate::errors::CoordinatorError;
use crate::model::User;
use crate::store::{run_in_transaction, Kind, Precondition, RecordKey, RecordStore, TransactionPolicy};
use crate::telemetry::{create_membership_span, generate_correlation_id};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub storage_key: String,
    /// False when an identical registration already existed.
    pub changed: bool,
}

/// Registers a device identity and keeps its messaging address current.
pub struct IdentityRegistrar {
    store: Arc<dyn RecordStore>,
    verifier: Arc<dyn TokenVerifier>,
    policy: TransactionPolicy,
}

impl IdentityRegistrar {
    pub fn new(store: Arc<dyn RecordStore>, verifier: Arc<dyn TokenVerifier>, config: &CoordinatorConfig) -> Self {
        Self {
            store,
            verifier,
            policy: TransactionPolicy::from(config),
        }
    }

    pub async fn register(&self, identity_key: &str, messaging_address: &str) -> Result<Registration, CoordinatorError> {
        let correlation_id = generate_correlation_id();
        let span = create_membership_span("register_identity", None, Some(identity_key), Some(&correlation_id));

        async move {
            if identity_key.is_empty() || !messaging_address.starts_with(identity_key) {
                return Err(CoordinatorError::Validation(
                    "messaging address does not belong to the identity".to_string(),
                ));
            }

            if !self.verifier.verify(messaging_address).await? {
                warn!("Messaging address failed verification");
                return Err(CoordinatorError::Validation("messaging address is not authentic".to_string()));
            }

            let registration = run_in_transaction(&self.policy, "register_identity", || {
                self.upsert(identity_key, messaging_address)
            })
            .await?;

            info!(storage_key = %registration.storage_key, changed = registration.changed, "Identity registered");
            Ok(registration)
        }
        .instrument(span)
        .await
    }

    async fn upsert(&self, identity_key: &str, messaging_address: &str) -> Result<Registration, CoordinatorError> {
        let user = User {
            instance_id: identity_key.to_string(),
            registration_token: messaging_address.to_string(),
            last_update_time: Utc::now().trunc_subsecs(0),
        };
        let body = serde_json::to_value(&user).map_err(|e| CoordinatorError::StoreUnavailable(e.to_string()))?;

        let existing = self
            .store
            .query_by_field(Kind::User, "instance_id", &json!(identity_key))
            .await?;

        let Some(record) = existing.first() else {
            let storage_key = self
                .store
                .put(Kind::User, RecordKey::Incomplete, body, Precondition::None)
                .await?;
            return Ok(Registration {
                storage_key,
                changed: true,
            });
        };

        let current: User = record.decode()?;
        if current.registration_token == messaging_address {
            return Ok(Registration {
                storage_key: record.id.clone(),
                changed: false,
            });
        }

        let storage_key = self
            .store
            .put(
                Kind::User,
                RecordKey::Complete(record.id.clone()),
                body,
                Precondition::Version(record.version),
            )
            .await?;
        Ok(Registration {
            storage_key,
            changed: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{IdentityDirectory, MockTokenVerifier, StoreIdentityDirectory, VerificationError};
    use crate::store::InMemoryRecordStore;

    fn verifier(authentic: bool) -> Arc<dyn TokenVerifier> {
        let mut verifier = MockTokenVerifier::new();
        verifier.expect_verify().returning(move |_| Ok(authentic));
        Arc::new(verifier)
    }

    #[tokio::test]
    async fn test_register_then_update_address() {
        let store = Arc::new(InMemoryRecordStore::new());
        let registrar = IdentityRegistrar::new(store.clone(), verifier(true), &CoordinatorConfig::default());

        let first = registrar.register("inst-1", "inst-1:a").await.unwrap();
        assert!(first.changed);

        let repeat = registrar.register("inst-1", "inst-1:a").await.unwrap();
        assert_eq!(repeat, Registration { storage_key: first.storage_key.clone(), changed: false });

        let moved = registrar.register("inst-1", "inst-1:b").await.unwrap();
        assert_eq!(moved.storage_key, first.storage_key);
        assert!(moved.changed);

        let directory = StoreIdentityDirectory::new(store.clone());
        let identity = directory.resolve("inst-1").await.unwrap().unwrap();
        assert_eq!(identity.messaging_address, "inst-1:b");
        assert_eq!(store.len(Kind::User).await, 1);
    }

    #[tokio::test]
    async fn test_address_must_carry_identity_prefix() {
        let registrar = IdentityRegistrar::new(
            Arc::new(InMemoryRecordStore::new()),
            verifier(true),
            &CoordinatorConfig::default(),
        );
        let err = registrar.register("inst-1", "other:a").await.unwrap_err();
        assert!(matches!(err, CoordinatorError::Validation(_)));
    }

    #[tokio::test]
    async fn test_unverified_address_is_rejected() {
        let store = Arc::new(InMemoryRecordStore::new());
        let registrar = IdentityRegistrar::new(store.clone(), verifier(false), &CoordinatorConfig::default());

        let err = registrar.register("inst-1", "inst-1:a").await.unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(store.is_empty(Kind::User).await);
    }

    #[tokio::test]
    async fn test_verifier_outage_is_retryable() {
        let mut verifier = MockTokenVerifier::new();
        verifier
            .expect_verify()
            .returning(|_| Err(VerificationError::BudgetExhausted { attempts: 5 }));
        let registrar = IdentityRegistrar::new(
            Arc::new(InMemoryRecordStore::new()),
            Arc::new(verifier),
            &CoordinatorConfig::default(),
        );

        let err = registrar.register("inst-1", "inst-1:a").await.unwrap_err();
        assert!(err.is_retryable());
    }
}
