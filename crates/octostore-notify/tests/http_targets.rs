mod common;

use std::sync::Arc;

use common::*;
use octostore_notify::config::{ElasticsearchArgs, TargetFormat, WebhookArgs};
use octostore_notify::store;
use octostore_notify::{
    EventData, EventName, NotificationConfig, Notifier, NotifyConfig, NotifyError, ObjectInfo,
    QueueConfig, ServiceConfig,
};
use octostore_storage::InMemoryObjectLayer;
use wiremock::matchers::{body_partial_json, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn layer_subscribed_to(arn: &str) -> InMemoryObjectLayer {
    let layer = InMemoryObjectLayer::new();
    layer.make_bucket("bucket").await;
    let config = NotificationConfig::new(vec![QueueConfig::new(
        ServiceConfig::new(["s3:ObjectCreated:*", "s3:ObjectRemoved:*"]),
        arn,
    )]);
    store::save_notification_config(&layer, "bucket", &config)
        .await
        .unwrap();
    layer
}

#[tokio::test]
async fn test_webhook_delivers_signed_event() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(header("Content-Type", "application/json"))
        .and(header("Authorization", "Bearer token"))
        .and(header_exists("X-Signature-256"))
        .and(body_partial_json(serde_json::json!({
            "EventName": "s3:ObjectCreated:Put",
            "Key": "bucket/report.csv",
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = NotifyConfig::default();
    config.targets.webhook.insert(
        "1".into(),
        WebhookArgs {
            enable: true,
            endpoint: format!("{}/hook", server.uri()),
            secret: Some("shared-secret".into()),
            headers: [("Authorization".to_string(), "Bearer token".to_string())].into(),
        },
    );

    let notifier = Notifier::builder()
        .object_layer(Arc::new(layer_subscribed_to(&webhook_arn("1")).await))
        .config(config)
        .build()
        .await
        .unwrap();

    let report = notifier.deliver(&put_event("bucket", "report.csv")).await;
    assert_eq!(report.delivered, 1);
    assert_eq!(report.failed, 0);
}

#[tokio::test]
async fn test_webhook_error_status_is_a_failed_delivery() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let mut config = NotifyConfig::default();
    config.targets.webhook.insert(
        "1".into(),
        WebhookArgs {
            enable: true,
            endpoint: format!("{}/hook", server.uri()),
            ..Default::default()
        },
    );

    let notifier = Notifier::builder()
        .object_layer(Arc::new(layer_subscribed_to(&webhook_arn("1")).await))
        .config(config)
        .build()
        .await
        .unwrap();

    let report = notifier.deliver(&put_event("bucket", "a")).await;
    assert_eq!(report.failed, 1);
    // Routing still accepts events after a failure.
    assert!(notifier.route_event(put_event("bucket", "b")));
}

#[tokio::test]
async fn test_elasticsearch_creates_index_and_indexes_by_object() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/events"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/events"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/events/_doc/bucket%2Fdir%2Fobj.txt"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/events/_doc/bucket%2Fdir%2Fobj.txt"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = NotifyConfig::default();
    config.targets.elasticsearch.insert(
        "1".into(),
        ElasticsearchArgs {
            enable: true,
            url: server.uri(),
            index: "events".into(),
            format: TargetFormat::Namespace,
        },
    );

    let arn = "arn:minio:sqs:us-east-1:1:elasticsearch";
    let notifier = Notifier::builder()
        .object_layer(Arc::new(layer_subscribed_to(arn).await))
        .config(config)
        .build()
        .await
        .unwrap();
    assert!(notifier.get_external_target(arn).is_some());

    let created = notifier.deliver(&put_event("bucket", "dir/obj.txt")).await;
    assert_eq!(created.delivered, 1);

    let removed = EventData::new(
        EventName::ObjectRemovedDelete,
        ObjectInfo::new("bucket", "dir/obj.txt"),
    );
    let report = notifier.deliver(&removed).await;
    assert_eq!(report.delivered, 1);
}

#[tokio::test]
async fn test_elasticsearch_unhealthy_cluster_fails_init() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut config = NotifyConfig::default();
    config.targets.elasticsearch.insert(
        "9".into(),
        ElasticsearchArgs {
            enable: true,
            url: server.uri(),
            index: "events".into(),
            ..Default::default()
        },
    );

    let err = Notifier::builder()
        .object_layer(Arc::new(InMemoryObjectLayer::new()))
        .config(config)
        .build()
        .await
        .unwrap_err();
    match err {
        NotifyError::TargetValidation {
            kind, account_id, ..
        } => {
            assert_eq!(kind, "elasticsearch");
            assert_eq!(account_id, "9");
        }
        other => panic!("unexpected error: {other}"),
    }
}
