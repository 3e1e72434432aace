//! Push provider HTTP tests
//!
//! These tests use wiremock to stand in for the device-group and send
//! endpoints, so the wire contract is checked without network access.

use std::time::Duration;

use rallypoint::config::ProviderConfig;
use rallypoint::provider::{
    BroadcastNotifier, GroupOperation, GroupOperationClient, HttpBroadcastNotifier, HttpGroupClient,
    NotificationPayload, ProviderError,
};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Provider mock server with a config pointing at it
struct ProviderMock {
    server: MockServer,
}

impl ProviderMock {
    async fn new() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    fn config(&self) -> ProviderConfig {
        ProviderConfig {
            group_url: format!("{}/gcm/notification", self.server.uri()),
            send_url: format!("{}/gcm/send", self.server.uri()),
            api_key: Some("mock-key".to_string()),
            project_id: "123456789".to_string(),
            request_timeout_ms: 1_000,
            ..ProviderConfig::default()
        }
    }

    fn client(&self) -> HttpGroupClient {
        HttpGroupClient::new(&self.config()).unwrap()
    }

    async fn reply(&self, status: u16, body: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path("/gcm/notification"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.server)
            .await;
    }
}

#[tokio::test]
async fn test_create_sends_credentials_and_returns_new_key() {
    let mock = ProviderMock::new().await;
    Mock::given(method("POST"))
        .and(path("/gcm/notification"))
        .and(header("authorization", "key=mock-key"))
        .and(header("project_id", "123456789"))
        .and(body_json(json!({
            "operation": "create",
            "notification_key_name": "teamA",
            "registration_ids": ["inst-u1:device"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"notification_key": "APA91-K1"})))
        .expect(1)
        .mount(&mock.server)
        .await;

    let key = mock
        .client()
        .send(&GroupOperation::create("teamA", "inst-u1:device"))
        .await
        .unwrap();
    assert_eq!(key, "APA91-K1");
}

#[tokio::test]
async fn test_add_carries_existing_key() {
    let mock = ProviderMock::new().await;
    Mock::given(method("POST"))
        .and(body_json(json!({
            "operation": "add",
            "notification_key_name": "teamA",
            "notification_key": "APA91-K1",
            "registration_ids": ["inst-u2:device"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"notification_key": "APA91-K1"})))
        .expect(1)
        .mount(&mock.server)
        .await;

    let op = GroupOperation::add("teamA", "APA91-K1", vec!["inst-u2:device".into()]);
    assert_eq!(mock.client().send(&op).await.unwrap(), "APA91-K1");
}

#[tokio::test]
async fn test_remove_without_key_in_reply_echoes_request_key() {
    let mock = ProviderMock::new().await;
    mock.reply(200, json!({})).await;

    let op = GroupOperation::remove("teamA", "APA91-K1", vec!["inst-u2:device".into()]);
    assert_eq!(mock.client().send(&op).await.unwrap(), "APA91-K1");
}

#[tokio::test]
async fn test_client_errors_are_rejections() {
    let mock = ProviderMock::new().await;
    mock.reply(400, json!({"error": "notification_key already exists"})).await;

    let err = mock
        .client()
        .send(&GroupOperation::create("teamA", "inst-u1:device"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ProviderError::Rejected {
            operation: "create".into(),
            status: 400,
            reason: "notification_key already exists".into(),
        }
    );
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_error_field_in_success_reply_is_rejection() {
    let mock = ProviderMock::new().await;
    mock.reply(200, json!({"error": "no valid registration ids"})).await;

    let op = GroupOperation::add("teamA", "APA91-K1", vec!["bogus".into()]);
    let err = mock.client().send(&op).await.unwrap_err();
    assert!(matches!(err, ProviderError::Rejected { .. }));
}

#[tokio::test]
async fn test_server_errors_are_unavailable() {
    let mock = ProviderMock::new().await;
    mock.reply(503, json!({})).await;

    let err = mock
        .client()
        .send(&GroupOperation::create("teamA", "inst-u1:device"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Unavailable { .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_malformed_reply_is_bad_response() {
    let mock = ProviderMock::new().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&mock.server)
        .await;

    let err = mock
        .client()
        .send(&GroupOperation::create("teamA", "inst-u1:device"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::BadResponse { .. }));
}

#[tokio::test]
async fn test_slow_provider_is_unavailable() {
    let mock = ProviderMock::new().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"notification_key": "APA91-K1"}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&mock.server)
        .await;

    let config = ProviderConfig {
        request_timeout_ms: 50,
        ..mock.config()
    };
    let err = HttpGroupClient::new(&config)
        .unwrap()
        .send(&GroupOperation::create("teamA", "inst-u1:device"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Unavailable { .. }));
}

#[tokio::test]
async fn test_client_requires_api_key() {
    let config = ProviderConfig {
        api_key: None,
        ..ProviderConfig::default()
    };
    assert!(HttpGroupClient::new(&config).is_err());
    assert!(HttpBroadcastNotifier::new(&config).is_err());
}

#[tokio::test]
async fn test_broadcast_envelope() {
    let mock = ProviderMock::new().await;
    Mock::given(method("POST"))
        .and(path("/gcm/send"))
        .and(header("authorization", "key=mock-key"))
        .and(body_json(json!({
            "to": "APA91-K1",
            "data": {
                "message": "A new member joined and the item now has 3/4.",
                "ItemId": "item-1",
                "RequestUserId": "u2"
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": 2, "failure": 0})))
        .expect(1)
        .mount(&mock.server)
        .await;

    let payload = NotificationPayload {
        message: "A new member joined and the item now has 3/4.".into(),
        item_id: Some("item-1".into()),
        request_user_id: Some("u2".into()),
    };
    HttpBroadcastNotifier::new(&mock.config())
        .unwrap()
        .send("APA91-K1", &payload)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_broadcast_failures_map_to_provider_errors() {
    let mock = ProviderMock::new().await;
    Mock::given(method("POST"))
        .and(path("/gcm/send"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&mock.server)
        .await;

    let notifier = HttpBroadcastNotifier::new(&mock.config()).unwrap();
    let err = notifier
        .send("/topics/news", &NotificationPayload::text("hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Rejected { status: 401, .. }));
}
