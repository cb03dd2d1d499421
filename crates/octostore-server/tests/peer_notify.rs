use std::sync::Arc;
use std::time::Duration;

use octostore_notify::{
    Arn, EventData, EventName, ListenerConfig, Notifier, ObjectInfo, PeerError, PeerMessage,
    PeerTransport, ServiceConfig, TopicConfig,
};
use octostore_server::build_app;
use octostore_server::peer::HttpPeerTransport;
use octostore_storage::InMemoryObjectLayer;
use tokio::task::JoinHandle;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn layer() -> Arc<InMemoryObjectLayer> {
    let layer = InMemoryObjectLayer::new();
    layer.make_bucket("photos").await;
    Arc::new(layer)
}

async fn notifier(node_addr: &str, peers: Vec<String>) -> Arc<Notifier> {
    let transport =
        HttpPeerTransport::new(node_addr, peers, Duration::from_secs(2)).expect("transport");
    Arc::new(
        Notifier::builder()
            .object_layer(layer().await)
            .peer_transport(Arc::new(transport))
            .build()
            .await
            .expect("notifier"),
    )
}

/// Binds an ephemeral port and returns its `host:port`.
async fn bind() -> (tokio::net::TcpListener, String) {
    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap().to_string();
    (listener, addr)
}

fn serve(
    listener: tokio::net::TcpListener,
    notifier: Arc<Notifier>,
) -> (tokio::sync::oneshot::Sender<()>, JoinHandle<()>) {
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, build_app(notifier))
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await;
    });
    (tx, server)
}

fn listener_config(owner: &str) -> ListenerConfig {
    ListenerConfig::new(
        TopicConfig::new(
            ServiceConfig::new(["s3:ObjectCreated:*"]),
            Arn::listener("us-east-1", "1", owner).to_string(),
        ),
        owner,
    )
}

#[tokio::test]
async fn test_event_forwarded_to_owning_node() {
    let (socket, owner_addr) = bind().await;
    let owner = notifier(&owner_addr, vec![]).await;
    let (shutdown, _server) = serve(socket, owner.clone());

    let (tx, mut rx) = owner.listener_channel();
    let arn = owner.listener_arn().to_string();
    owner.add_listener_chan(&arn, tx).unwrap();

    // The observing node learns about the listener and forwards to its owner.
    let observer = notifier("127.0.0.1:1", vec![owner_addr.clone()]).await;
    observer
        .add_bucket_listener_config("photos", listener_config(&owner_addr))
        .await
        .unwrap();

    let mut object = ObjectInfo::new("photos", "cat.png");
    object.size = 3;
    let report = observer
        .deliver(&EventData::new(EventName::ObjectCreatedPut, object))
        .await;
    assert_eq!(report.delivered, 1, "{report:?}");

    let events = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("forwarded event")
        .expect("channel open");
    assert_eq!(events[0].object_key(), "cat.png");

    // The config change was broadcast to the owner as well.
    assert_eq!(
        owner.get_bucket_listener_config("photos"),
        vec![listener_config(&owner_addr)]
    );

    let _ = shutdown.send(());
}

#[tokio::test]
async fn test_invalid_peer_message_is_rejected() {
    let (socket, addr) = bind().await;
    let node = notifier(&addr, vec![]).await;
    let (shutdown, _server) = serve(socket, node.clone());

    let mut bad = listener_config(&addr);
    bad.target_server.clear();

    let transport = HttpPeerTransport::new("127.0.0.1:1", vec![addr.clone()], Duration::from_secs(2))
        .unwrap();
    let err = transport
        .call(
            &addr,
            &PeerMessage::SetBucketListener {
                bucket: "photos".into(),
                configs: vec![bad],
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PeerError::Remote { status: 400, .. }), "{err}");
    assert!(node.get_bucket_listener_config("photos").is_empty());

    let _ = shutdown.send(());
}

#[tokio::test]
async fn test_remote_failure_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/minio/peer/notify"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;

    let transport =
        HttpPeerTransport::new("127.0.0.1:1", vec![server.uri()], Duration::from_secs(2)).unwrap();
    let err = transport
        .call(
            &server.uri(),
            &PeerMessage::SetBucketNotification {
                bucket: "photos".into(),
                config: None,
            },
        )
        .await
        .unwrap_err();

    match err {
        PeerError::Remote { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "boom");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_unreachable_peer_does_not_fail_config_change() {
    let node = notifier("127.0.0.1:9000", vec!["127.0.0.1:1".into()]).await;
    node.add_bucket_listener_config("photos", listener_config("127.0.0.1:9000"))
        .await
        .unwrap();
    assert_eq!(node.get_bucket_listener_config("photos").len(), 1);
}
