use std::sync::Arc;

use tracing::{info, Instrument};

use crate::errors::CoordinatorError;
use crate::identity::{Identity, IdentityDirectory};
use crate::model::Group;
use crate::provider::{BroadcastNotifier, NotificationPayload};
use crate::store::{Kind, RecordStore};
use crate::telemetry::{create_membership_span, generate_correlation_id};

/// Where a direct message goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    /// A user, by storage key.
    User(String),
    /// Every device subscribed to a topic.
    Topic(String),
    /// Every member of a named group.
    Group(String),
}

/// Relays free-text messages from a known sender through the notifier.
///
/// Unlike change broadcasts, delivery failures are returned to the caller.
pub struct Messenger {
    store: Arc<dyn RecordStore>,
    directory: Arc<dyn IdentityDirectory>,
    notifier: Arc<dyn BroadcastNotifier>,
}

impl Messenger {
    pub fn new(
        store: Arc<dyn RecordStore>,
        directory: Arc<dyn IdentityDirectory>,
        notifier: Arc<dyn BroadcastNotifier>,
    ) -> Self {
        Self {
            store,
            directory,
            notifier,
        }
    }

    /// Send `text` from the identity `sender` to `recipient`. Answers 204 on success.
    pub async fn send(&self, sender: &str, recipient: &Recipient, text: &str) -> Result<u16, CoordinatorError> {
        let correlation_id = generate_correlation_id();
        let span = create_membership_span("send_message", None, Some(sender), Some(&correlation_id));

        async move {
            if text.trim().is_empty() {
                return Err(CoordinatorError::Validation("message text is required".to_string()));
            }
            let from = self
                .directory
                .resolve(sender)
                .await?
                .ok_or_else(|| CoordinatorError::NotFound(format!("identity {sender}")))?;

            let to = self.address_of(recipient).await?;
            let mut payload = NotificationPayload::text(text);
            payload.request_user_id = Some(from.storage_key.clone());

            self.notifier.send(&to, &payload).await?;
            info!(recipient = ?recipient, "Message delivered");
            Ok(204)
        }
        .instrument(span)
        .await
    }

    async fn address_of(&self, recipient: &Recipient) -> Result<String, CoordinatorError> {
        match recipient {
            Recipient::User(user_key) => self
                .directory
                .lookup(user_key)
                .await?
                .map(|Identity { messaging_address, .. }| messaging_address)
                .ok_or_else(|| CoordinatorError::NotFound(format!("user {user_key}"))),
            Recipient::Topic(topic) if topic.trim().is_empty() => {
                Err(CoordinatorError::Validation("topic is required".to_string()))
            }
            Recipient::Topic(topic) => Ok(format!("/topics/{topic}")),
            Recipient::Group(name) => {
                let group: Group = self.store.get(Kind::Group, name).await?.decode()?;
                Ok(group.notification_key)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::MockIdentityDirectory;
    use crate::provider::{MockBroadcastNotifier, ProviderError};
    use crate::store::{InMemoryRecordStore, Precondition, RecordKey};

    fn identity(key: &str) -> Identity {
        Identity {
            storage_key: key.into(),
            identity_key: format!("inst-{key}"),
            messaging_address: format!("addr-{key}"),
        }
    }

    fn directory() -> Arc<dyn IdentityDirectory> {
        let mut directory = MockIdentityDirectory::new();
        directory
            .expect_resolve()
            .returning(|inst| Ok(inst.strip_prefix("inst-").map(identity)));
        directory
            .expect_lookup()
            .returning(|key| Ok((key != "ghost").then(|| identity(key))));
        Arc::new(directory)
    }

    #[tokio::test]
    async fn test_topic_message_addresses_topic_path() {
        let mut notifier = MockBroadcastNotifier::new();
        notifier
            .expect_send()
            .withf(|to, _| to == "/topics/news")
            .times(1)
            .returning(|_, _| Ok(()));
        let messenger = Messenger::new(Arc::new(InMemoryRecordStore::new()), directory(), Arc::new(notifier));

        let status = messenger
            .send("inst-u1", &Recipient::Topic("news".into()), "hello")
            .await
            .unwrap();
        assert_eq!(status, 204);
    }

    #[tokio::test]
    async fn test_group_message_uses_notification_key() {
        let store = Arc::new(InMemoryRecordStore::new());
        let group = Group::new("teamA", "u1", "K1");
        store
            .put(
                Kind::Group,
                RecordKey::Complete("teamA".into()),
                serde_json::to_value(&group).unwrap(),
                Precondition::Absent,
            )
            .await
            .unwrap();

        let mut notifier = MockBroadcastNotifier::new();
        notifier
            .expect_send()
            .withf(|to, payload| to == "K1" && payload.request_user_id.as_deref() == Some("u2"))
            .times(1)
            .returning(|_, _| Ok(()));
        let messenger = Messenger::new(store, directory(), Arc::new(notifier));

        messenger
            .send("inst-u2", &Recipient::Group("teamA".into()), "see you")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unknown_sender_and_target_are_not_found() {
        let messenger = Messenger::new(
            Arc::new(InMemoryRecordStore::new()),
            directory(),
            Arc::new(MockBroadcastNotifier::new()),
        );

        let err = messenger
            .send("stranger", &Recipient::User("u2".into()), "hi")
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 404);

        let err = messenger
            .send("inst-u1", &Recipient::User("ghost".into()), "hi")
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 404);

        let err = messenger
            .send("inst-u1", &Recipient::Group("missing".into()), "hi")
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn test_delivery_failure_is_surfaced() {
        let mut notifier = MockBroadcastNotifier::new();
        notifier
            .expect_send()
            .returning(|_, _| Err(ProviderError::unavailable("down")));
        let messenger = Messenger::new(Arc::new(InMemoryRecordStore::new()), directory(), Arc::new(notifier));

        let err = messenger
            .send("inst-u1", &Recipient::User("u2".into()), "hi")
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_empty_text_is_rejected() {
        let messenger = Messenger::new(
            Arc::new(InMemoryRecordStore::new()),
            directory(),
            Arc::new(MockBroadcastNotifier::new()),
        );
        let err = messenger
            .send("inst-u1", &Recipient::Topic("news".into()), "  ")
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }
}
