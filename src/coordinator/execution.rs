use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};

use crate::errors::CoordinatorError;
use crate::identity::{Identity, IdentityDirectory};
use crate::membership::PlannedOp;
use crate::observability::membership_metrics;
use crate::provider::{GroupOperation, GroupOperationClient, ProviderError};

/// Runs planned group operations against the provider, one at a time.
///
/// Each call is bounded by a deadline so an open transaction never waits on a
/// slow provider; an elapsed deadline counts as `Unavailable`.
pub struct OperationRunner {
    directory: Arc<dyn IdentityDirectory>,
    client: Arc<dyn GroupOperationClient>,
    deadline: Duration,
}

impl OperationRunner {
    pub fn new(
        directory: Arc<dyn IdentityDirectory>,
        client: Arc<dyn GroupOperationClient>,
        deadline: Duration,
    ) -> Self {
        Self {
            directory,
            client,
            deadline,
        }
    }

    pub async fn send(&self, operation: &GroupOperation) -> Result<String, ProviderError> {
        match timeout(self.deadline, self.client.send(operation)).await {
            Ok(result) => result,
            Err(_) => {
                membership_metrics().record_provider_unavailable();
                Err(ProviderError::unavailable(format!(
                    "{} on {} exceeded {}ms",
                    operation.operation,
                    operation.key_name,
                    self.deadline.as_millis()
                )))
            }
        }
    }

    async fn address_of(&self, user_key: &str, actor: Option<&Identity>) -> Result<Option<String>, CoordinatorError> {
        if let Some(actor) = actor.filter(|a| a.storage_key == user_key) {
            return Ok(Some(actor.messaging_address.clone()));
        }
        Ok(self
            .directory
            .lookup(user_key)
            .await?
            .map(|identity| identity.messaging_address))
    }

    /// Execute `plan` against the provider group `key_name`/`key`.
    ///
    /// The first failing required op aborts the run. Best-effort failures are
    /// logged and counted; the number skipped is returned.
    pub async fn run(
        &self,
        plan: &[PlannedOp],
        key_name: &str,
        key: &str,
        actor: Option<&Identity>,
    ) -> Result<usize, CoordinatorError> {
        let mut skipped = 0;

        for planned in plan {
            let address = match self.address_of(&planned.user_key, actor).await {
                Ok(Some(address)) => address,
                Ok(None) if planned.best_effort => {
                    warn!(user_key = %planned.user_key, "No messaging address for member, skipping");
                    membership_metrics().record_cascade_failure();
                    skipped += 1;
                    continue;
                }
                Ok(None) => return Err(CoordinatorError::NotFound(format!("identity {}", planned.user_key))),
                Err(err) if planned.best_effort => {
                    warn!(user_key = %planned.user_key, error = %err, "Member lookup failed, skipping");
                    membership_metrics().record_cascade_failure();
                    skipped += 1;
                    continue;
                }
                Err(err) => return Err(err),
            };

            let operation = planned.bind(key_name, key, address);
            match self.send(&operation).await {
                Ok(_) => debug!(operation = %operation.operation, user_key = %planned.user_key, "Group operation applied"),
                Err(err) if planned.best_effort => {
                    warn!(
                        operation = %operation.operation,
                        user_key = %planned.user_key,
                        error = %err,
                        "Best-effort group operation failed"
                    );
                    membership_metrics().record_cascade_failure();
                    skipped += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }

        Ok(skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::MockIdentityDirectory;
    use crate::provider::{MockGroupOperationClient, OperationKind};
    use mockall::predicate::function;

    fn identity(key: &str) -> Identity {
        Identity {
            storage_key: key.into(),
            identity_key: format!("inst-{key}"),
            messaging_address: format!("addr-{key}"),
        }
    }

    fn removal(user_key: &str, best_effort: bool) -> PlannedOp {
        PlannedOp {
            kind: OperationKind::Remove,
            user_key: user_key.into(),
            best_effort,
        }
    }

    fn directory() -> Arc<dyn IdentityDirectory> {
        let mut directory = MockIdentityDirectory::new();
        directory
            .expect_lookup()
            .returning(|key| Ok((key != "ghost").then(|| identity(key))));
        Arc::new(directory)
    }

    #[tokio::test]
    async fn test_actor_address_needs_no_lookup() {
        let mut directory = MockIdentityDirectory::new();
        directory.expect_lookup().never();
        let mut client = MockGroupOperationClient::new();
        client
            .expect_send()
            .with(function(|op: &GroupOperation| op.addresses == vec!["addr-u2".to_string()]))
            .times(1)
            .returning(|_| Ok("K1".into()));

        let runner = OperationRunner::new(Arc::new(directory), Arc::new(client), Duration::from_secs(1));
        let skipped = runner
            .run(&[removal("u2", false)], "g", "K1", Some(&identity("u2")))
            .await
            .unwrap();
        assert_eq!(skipped, 0);
    }

    #[tokio::test]
    async fn test_required_failure_aborts() {
        let mut client = MockGroupOperationClient::new();
        client.expect_send().times(1).returning(|_| {
            Err(ProviderError::Rejected {
                operation: "remove".into(),
                status: 400,
                reason: "invalid".into(),
            })
        });

        let runner = OperationRunner::new(directory(), Arc::new(client), Duration::from_secs(1));
        let err = runner
            .run(&[removal("u2", false), removal("u3", false)], "g", "K1", None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::ProviderRejected { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_best_effort_failures_are_skipped() {
        let mut client = MockGroupOperationClient::new();
        client
            .expect_send()
            .times(2)
            .returning(|op| match op.addresses[0].as_str() {
                "addr-u1" => Err(ProviderError::unavailable("down")),
                _ => Ok("K1".into()),
            });

        let runner = OperationRunner::new(directory(), Arc::new(client), Duration::from_secs(1));
        let plan = [removal("u1", true), removal("ghost", true), removal("u3", true)];
        let skipped = runner.run(&plan, "g", "K1", None).await.unwrap();
        assert_eq!(skipped, 2);
    }

    #[tokio::test]
    async fn test_missing_identity_for_required_op_is_not_found() {
        let client = MockGroupOperationClient::new();
        let runner = OperationRunner::new(directory(), Arc::new(client), Duration::from_secs(1));
        let err = runner
            .run(&[removal("ghost", false)], "g", "K1", None)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
    }
}
