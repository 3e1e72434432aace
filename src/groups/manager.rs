use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn, Instrument};

use super::lifecycle::{GroupEvent, GroupLifecycle};
use crate::config::CoordinatorConfig;
use crate::coordinator::OperationRunner;
use crate::errors::CoordinatorError;
use crate::identity::{Identity, IdentityDirectory};
use crate::membership::{transition, Outcome, PlannedOp, Roster};
use crate::model::{Group, Member};
use crate::provider::{GroupOperation, GroupOperationClient, OperationKind};
use crate::store::{run_in_transaction, Kind, Precondition, RecordKey, RecordStore, StoreError, TransactionPolicy};
use crate::telemetry::{create_membership_span, generate_correlation_id};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupStatus {
    Created,
    Joined,
    AlreadyMember,
    Left,
    Dissolved,
    NotAMember,
    AlreadyGone,
}

impl GroupStatus {
    /// Join and leave answer "no content" whatever they did.
    pub fn status(&self) -> u16 {
        204
    }
}

impl From<&Group> for Roster {
    fn from(group: &Group) -> Self {
        let members: Vec<Member> = std::iter::once(group.owner.as_str())
            .chain(group.members.iter().map(String::as_str).filter(|m| *m != group.owner))
            .map(|m| Member::new(m, 1))
            .collect();
        Roster {
            capacity: None,
            attendant: members.len() as i64,
            members,
        }
    }
}

fn group_body(group: &Group) -> Result<serde_json::Value, CoordinatorError> {
    Ok(serde_json::to_value(group).map_err(StoreError::from)?)
}

/// Named groups: created on first join, dissolved when the owner leaves.
pub struct GroupLifecycleManager {
    store: Arc<dyn RecordStore>,
    directory: Arc<dyn IdentityDirectory>,
    runner: OperationRunner,
    policy: TransactionPolicy,
}

impl GroupLifecycleManager {
    pub fn new(
        store: Arc<dyn RecordStore>,
        directory: Arc<dyn IdentityDirectory>,
        client: Arc<dyn GroupOperationClient>,
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
            policy: TransactionPolicy::from(config),
        }
    }

    async fn resolve_actor(&self, identity_key: &str) -> Result<Identity, CoordinatorError> {
        self.directory
            .resolve(identity_key)
            .await?
            .ok_or_else(|| CoordinatorError::NotFound(format!("identity {identity_key}")))
    }

    pub async fn get_group(&self, group_name: &str) -> Result<Group, CoordinatorError> {
        Ok(self.store.get(Kind::Group, group_name).await?.decode()?)
    }

    /// Join `group_name`, creating it with the caller as owner if it does not exist.
    pub async fn join(&self, identity_key: &str, group_name: &str) -> Result<GroupStatus, CoordinatorError> {
        let correlation_id = generate_correlation_id();
        let span = create_membership_span("join_group", Some(group_name), Some(identity_key), Some(&correlation_id));

        async move {
            if group_name.trim().is_empty() {
                return Err(CoordinatorError::Validation("group name is required".to_string()));
            }
            let actor = self.resolve_actor(identity_key).await?;
            let status = run_in_transaction(&self.policy, "join_group", || self.join_once(group_name, &actor)).await?;
            info!(status = ?status, "Group join handled");
            Ok(status)
        }
        .instrument(span)
        .await
    }

    async fn join_once(&self, group_name: &str, actor: &Identity) -> Result<GroupStatus, CoordinatorError> {
        let record = match self.store.get(Kind::Group, group_name).await {
            Ok(record) => record,
            Err(StoreError::NotFound { .. }) => return self.create(group_name, actor).await,
            Err(err) => return Err(err.into()),
        };
        let mut group: Group = record.decode()?;

        let delta = if group.contains(&actor.storage_key) { 0 } else { 1 };
        let change = transition(&Roster::from(&group), &actor.storage_key, delta)?;
        if change.outcome == Outcome::Unchanged {
            return Ok(GroupStatus::AlreadyMember);
        }

        self.runner
            .run(&change.operations, &group.name, &group.notification_key, Some(actor))
            .await?;

        group.members = change.roster.members.into_iter().map(|m| m.user_key).collect();
        self.store
            .put(
                Kind::Group,
                RecordKey::Complete(group_name.to_string()),
                group_body(&group)?,
                Precondition::Version(record.version),
            )
            .await?;
        Ok(GroupStatus::Joined)
    }

    async fn create(&self, group_name: &str, actor: &Identity) -> Result<GroupStatus, CoordinatorError> {
        let key = self
            .runner
            .send(&GroupOperation::create(group_name, &actor.messaging_address))
            .await?;

        let group = Group::new(group_name, &actor.storage_key, key);
        // Absent precondition: a concurrent creator makes this attempt conflict
        // and the retry takes the join path.
        let stored = self
            .store
            .put(
                Kind::Group,
                RecordKey::Complete(group_name.to_string()),
                group_body(&group)?,
                Precondition::Absent,
            )
            .await;
        if let Err(err) = stored {
            warn!(error = %err, group_key = %group.notification_key, "Group insert failed, removing provider group");
            let cleanup = PlannedOp {
                kind: OperationKind::Remove,
                user_key: actor.storage_key.clone(),
                best_effort: true,
            };
            match self
                .runner
                .run(&[cleanup], &group.name, &group.notification_key, Some(actor))
                .await
            {
                Ok(0) => {}
                Ok(skipped) => warn!(skipped, "Group cleanup incomplete, provider group may linger"),
                Err(cleanup_err) => warn!(error = %cleanup_err, "Group cleanup failed"),
            }
            return Err(err.into());
        }
        info!(group_key = %group.notification_key, "Group created");
        Ok(GroupStatus::Created)
    }

    /// Leave `group_name`. When the owner leaves, every member is removed from the
    /// provider group (best-effort) and the record is deleted regardless.
    pub async fn leave(&self, identity_key: &str, group_name: &str) -> Result<GroupStatus, CoordinatorError> {
        let correlation_id = generate_correlation_id();
        let span = create_membership_span("leave_group", Some(group_name), Some(identity_key), Some(&correlation_id));

        async move {
            let actor = self.resolve_actor(identity_key).await?;
            let status = run_in_transaction(&self.policy, "leave_group", || self.leave_once(group_name, &actor)).await?;
            info!(status = ?status, "Group leave handled");
            Ok(status)
        }
        .instrument(span)
        .await
    }

    async fn leave_once(&self, group_name: &str, actor: &Identity) -> Result<GroupStatus, CoordinatorError> {
        let record = match self.store.get(Kind::Group, group_name).await {
            Ok(record) => record,
            Err(StoreError::NotFound { .. }) => return Ok(GroupStatus::AlreadyGone),
            Err(err) => return Err(err.into()),
        };
        let mut group: Group = record.decode()?;
        if !group.contains(&actor.storage_key) && !group.is_owner(&actor.storage_key) {
            return Ok(GroupStatus::NotAMember);
        }

        let change = transition(&Roster::from(&group), &actor.storage_key, -1)?;

        let skipped = self
            .runner
            .run(&change.operations, &group.name, &group.notification_key, Some(actor))
            .await?;

        let event = GroupEvent::departure(change.outcome, &actor.storage_key);
        if GroupLifecycle::survives(&group, &event) {
            group.members = change.roster.members.into_iter().map(|m| m.user_key).collect();
            self.store
                .put(
                    Kind::Group,
                    RecordKey::Complete(group_name.to_string()),
                    group_body(&group)?,
                    Precondition::Version(record.version),
                )
                .await?;
            Ok(GroupStatus::Left)
        } else {
            if skipped > 0 {
                warn!(skipped, "Provider cascade incomplete, deleting group anyway");
            }
            self.store
                .delete(Kind::Group, group_name, Precondition::Version(record.version))
                .await?;
            Ok(GroupStatus::Dissolved)
        }
    }
}
