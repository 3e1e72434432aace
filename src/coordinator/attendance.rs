use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn, Instrument};
use validator::Validate;

use super::execution::OperationRunner;
use super::notification::item_payload;
use super::queries::decode_item;
use crate::config::CoordinatorConfig;
use crate::errors::CoordinatorError;
use crate::identity::{Identity, IdentityDirectory};
use crate::membership::{transition_item, ItemTransition, MembershipError, Outcome, PlannedOp};
use crate::model::{FieldUpdates, Item, NewItem};
use crate::observability::{membership_metrics, OperationTimer};
use crate::provider::{BroadcastNotifier, GroupOperation, GroupOperationClient, OperationKind};
use crate::store::{run_in_transaction, Kind, Precondition, RecordKey, RecordStore, StoreError, TransactionPolicy};
use crate::telemetry::{create_membership_span, generate_correlation_id};

/// A freshly created Item.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemCreated {
    pub id: String,
    pub item: Item,
}

impl ItemCreated {
    pub fn status(&self) -> u16 {
        201
    }
}

/// What one attendance request did.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceReport {
    pub item_id: String,
    pub outcome: Outcome,
    /// Committed state; `None` once the item was closed.
    pub item: Option<Item>,
    pub full: bool,
    pub fields_updated: bool,
    /// Whether the change broadcast reached the provider.
    pub notified: bool,
}

impl AttendanceReport {
    pub fn status(&self) -> u16 {
        200
    }
}

#[derive(Debug, Clone, Copy)]
enum Delta {
    By(i64),
    /// The acting member's whole contribution, read inside the transaction.
    WithdrawAll,
}

/// Keeps Item records and their provider groups in step.
///
/// Every mutation is one read-modify-write against the record store, re-run
/// from the read on conflict. Group operations happen inside the attempt,
/// after the transition is computed and before the conditional write, so a
/// provider refusal leaves the record untouched.
pub struct AttendanceCoordinator {
    store: Arc<dyn RecordStore>,
    directory: Arc<dyn IdentityDirectory>,
    runner: OperationRunner,
    notifier: Arc<dyn BroadcastNotifier>,
    policy: TransactionPolicy,
}

impl AttendanceCoordinator {
    pub fn new(
        store: Arc<dyn RecordStore>,
        directory: Arc<dyn IdentityDirectory>,
        client: Arc<dyn GroupOperationClient>,
        notifier: Arc<dyn BroadcastNotifier>,
        config: &CoordinatorConfig,
    ) -> Self {
        Self {
            runner: OperationRunner::new(
                directory.clone(),
                client,
                Duration::from_millis(config.provider_deadline_ms),
            ),
            store,
            directory,
            notifier,
            policy: TransactionPolicy::from(config),
        }
    }

    pub(super) fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    async fn resolve_actor(&self, identity_key: &str) -> Result<Identity, CoordinatorError> {
        self.directory
            .resolve(identity_key)
            .await?
            .ok_or_else(|| CoordinatorError::NotFound(format!("identity {identity_key}")))
    }

    /// Create an Item owned by the caller together with its provider group.
    pub async fn create_item(&self, identity_key: &str, new_item: NewItem) -> Result<ItemCreated, CoordinatorError> {
        let correlation_id = generate_correlation_id();
        let span = create_membership_span("create_item", None, Some(identity_key), Some(&correlation_id));

        async move {
            new_item.validate()?;
            let owner = self.resolve_actor(identity_key).await?;

            let now = Utc::now();
            let group_name = format!(
                "{}-{:x}",
                owner.storage_key,
                now.timestamp_nanos_opt().unwrap_or_default()
            );
            let key = self
                .runner
                .send(&GroupOperation::create(&group_name, &owner.messaging_address))
                .await?;

            let mut item = new_item.into_item(&owner.storage_key, group_name, key, now);
            let stored = match item.to_record_body() {
                Ok(body) => {
                    self.store
                        .put(Kind::Item, RecordKey::Incomplete, body, Precondition::None)
                        .await
                }
                Err(err) => Err(StoreError::from(err)),
            };

            match stored {
                Ok(id) => {
                    info!(item_id = %id, group_key = %item.group_key, "Item created");
                    item.id = Some(id.clone());
                    Ok(ItemCreated { id, item })
                }
                Err(err) => {
                    warn!(error = %err, "Item insert failed, dissolving its group");
                    let cleanup = PlannedOp {
                        kind: OperationKind::Remove,
                        user_key: owner.storage_key.clone(),
                        best_effort: true,
                    };
                    match self
                        .runner
                        .run(&[cleanup], &item.group_name, &item.group_key, Some(&owner))
                        .await
                    {
                        Ok(0) => {}
                        Ok(skipped) => warn!(skipped, "Group cleanup incomplete, provider group may linger"),
                        Err(cleanup_err) => warn!(error = %cleanup_err, "Group cleanup failed"),
                    }
                    Err(err.into())
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Change the caller's attendance on an Item by `delta`, applying owner
    /// field updates alongside.
    pub async fn apply_attendance(
        &self,
        item_id: &str,
        identity_key: &str,
        delta: i64,
        updates: &FieldUpdates,
    ) -> Result<AttendanceReport, CoordinatorError> {
        self.attend("apply_attendance", item_id, identity_key, Delta::By(delta), updates)
            .await
    }

    /// Withdraw the caller's whole contribution. For the owner this closes the Item.
    pub async fn leave_item(&self, item_id: &str, identity_key: &str) -> Result<AttendanceReport, CoordinatorError> {
        self.attend("leave_item", item_id, identity_key, Delta::WithdrawAll, &FieldUpdates::default())
            .await
    }

    async fn attend(
        &self,
        operation: &str,
        item_id: &str,
        identity_key: &str,
        delta: Delta,
        updates: &FieldUpdates,
    ) -> Result<AttendanceReport, CoordinatorError> {
        let correlation_id = generate_correlation_id();
        let span = create_membership_span(operation, Some(item_id), Some(identity_key), Some(&correlation_id));

        async move {
            let timer = OperationTimer::new(operation);
            let actor = self.resolve_actor(identity_key).await?;

            let committed = run_in_transaction(&self.policy, operation, || {
                self.attend_once(item_id, &actor, delta, updates)
            })
            .await?;

            let notified = !committed.is_noop() && self.broadcast(item_id, &actor, &committed).await;
            info!(
                outcome = ?committed.outcome(),
                attendant = committed.item.attendant,
                full = committed.is_full(),
                "Attendance committed"
            );
            timer.finish();

            Ok(AttendanceReport {
                item_id: item_id.to_string(),
                outcome: committed.outcome(),
                full: committed.is_full(),
                fields_updated: committed.fields_updated,
                item: (!committed.is_closing()).then_some(committed.item),
                notified,
            })
        }
        .instrument(span)
        .await
    }

    async fn attend_once(
        &self,
        item_id: &str,
        actor: &Identity,
        delta: Delta,
        updates: &FieldUpdates,
    ) -> Result<ItemTransition, CoordinatorError> {
        let record = self.store.get(Kind::Item, item_id).await?;
        let item = decode_item(&record)?;

        let delta = match delta {
            Delta::By(delta) => delta,
            Delta::WithdrawAll => {
                let member = item.member(&actor.storage_key).ok_or_else(|| MembershipError::NotAMember {
                    user_key: actor.storage_key.clone(),
                })?;
                -member.attendant
            }
        };

        let transition = transition_item(&item, &actor.storage_key, delta, updates, Utc::now())?;
        if transition.is_noop() {
            return Ok(transition);
        }

        self.runner
            .run(transition.operations(), &item.group_name, &item.group_key, Some(actor))
            .await?;

        if transition.is_closing() {
            self.store
                .delete(Kind::Item, item_id, Precondition::Version(record.version))
                .await?;
        } else {
            let body = transition.item.to_record_body().map_err(StoreError::from)?;
            self.store
                .put(
                    Kind::Item,
                    RecordKey::Complete(item_id.to_string()),
                    body,
                    Precondition::Version(record.version),
                )
                .await?;
        }
        Ok(transition)
    }

    async fn broadcast(&self, item_id: &str, actor: &Identity, transition: &ItemTransition) -> bool {
        let payload = item_payload(transition, item_id, &actor.storage_key);
        match self.notifier.send(&transition.item.group_key, &payload).await {
            Ok(()) => true,
            Err(err) => {
                membership_metrics().record_broadcast_failure();
                warn!(error = %err, "Change broadcast failed");
                false
            }
        }
    }

    /// Delete an Item outright, removing every member from its group first.
    /// Provider failures during the teardown do not block the delete.
    pub async fn delete_item(&self, item_id: &str) -> Result<Item, CoordinatorError> {
        let correlation_id = generate_correlation_id();
        let span = create_membership_span("delete_item", Some(item_id), None, Some(&correlation_id));

        async move {
            let deleted = run_in_transaction(&self.policy, "delete_item", move || async move {
                let record = self.store.get(Kind::Item, item_id).await?;
                let item = decode_item(&record)?;

                let teardown: Vec<PlannedOp> = item
                    .members
                    .iter()
                    .map(|member| PlannedOp {
                        kind: OperationKind::Remove,
                        user_key: member.user_key.clone(),
                        best_effort: true,
                    })
                    .collect();
                let skipped = self
                    .runner
                    .run(&teardown, &item.group_name, &item.group_key, None)
                    .await?;
                if skipped > 0 {
                    warn!(skipped, "Group teardown incomplete, deleting item anyway");
                }

                self.store
                    .delete(Kind::Item, item_id, Precondition::Version(record.version))
                    .await?;
                Ok(item)
            })
            .await?;

            info!("Item deleted");
            Ok(deleted)
        }
        .instrument(span)
        .await
    }
}
