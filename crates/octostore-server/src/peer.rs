//! HTTP transport between notifier peers.
//!
//! Every node serves `POST /minio/peer/notify` and forwards the JSON
//! [`PeerMessage`] body to its local notifier.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use octostore_notify::{Notifier, NotifyError, PeerError, PeerMessage, PeerTransport};
use serde_json::json;

pub const PEER_NOTIFY_PATH: &str = "/minio/peer/notify";

/// [`PeerTransport`] posting messages to other nodes over HTTP.
#[derive(Debug, Clone)]
pub struct HttpPeerTransport {
    client: reqwest::Client,
    local_addr: String,
    peers: Vec<String>,
}

impl HttpPeerTransport {
    pub fn new(
        local_addr: impl Into<String>,
        peers: Vec<String>,
        timeout: Duration,
    ) -> Result<Self, PeerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PeerError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            local_addr: local_addr.into(),
            peers,
        })
    }

    fn endpoint(node: &str) -> String {
        if node.starts_with("http://") || node.starts_with("https://") {
            format!("{}{PEER_NOTIFY_PATH}", node.trim_end_matches('/'))
        } else {
            format!("http://{node}{PEER_NOTIFY_PATH}")
        }
    }
}

#[async_trait]
impl PeerTransport for HttpPeerTransport {
    fn local_addr(&self) -> &str {
        &self.local_addr
    }

    fn is_distributed(&self) -> bool {
        !self.peers.is_empty()
    }

    fn peers(&self) -> Vec<String> {
        self.peers.clone()
    }

    async fn call(&self, node: &str, message: &PeerMessage) -> Result<(), PeerError> {
        let response = self
            .client
            .post(Self::endpoint(node))
            .json(message)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PeerError::Timeout(node.to_string())
                } else {
                    PeerError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            tracing::trace!(node, kind = message.kind(), "Peer call succeeded");
            return Ok(());
        }
        let message = response.text().await.unwrap_or_default();
        Err(PeerError::Remote {
            status: status.as_u16(),
            message,
        })
    }
}

/// Error body returned by the peer endpoint.
#[derive(Debug)]
pub struct PeerApiError(NotifyError);

impl From<NotifyError> for PeerApiError {
    fn from(e: NotifyError) -> Self {
        Self(e)
    }
}

impl IntoResponse for PeerApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_invalid_argument() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

async fn handle_notify(
    State(notifier): State<Arc<Notifier>>,
    Json(message): Json<PeerMessage>,
) -> Result<StatusCode, PeerApiError> {
    notifier.handle_peer_message(message).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Routes served to other nodes.
pub fn peer_router(notifier: Arc<Notifier>) -> Router {
    Router::new()
        .route(PEER_NOTIFY_PATH, post(handle_notify))
        .with_state(notifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint() {
        assert_eq!(
            HttpPeerTransport::endpoint("10.0.0.2:9000"),
            "http://10.0.0.2:9000/minio/peer/notify"
        );
        assert_eq!(
            HttpPeerTransport::endpoint("https://node-2/"),
            "https://node-2/minio/peer/notify"
        );
    }

    #[test]
    fn test_distributed_only_with_peers() {
        let single =
            HttpPeerTransport::new("127.0.0.1:9000", vec![], Duration::from_secs(1)).unwrap();
        assert!(!single.is_distributed());

        let cluster = HttpPeerTransport::new(
            "127.0.0.1:9000",
            vec!["127.0.0.1:9001".into()],
            Duration::from_secs(1),
        )
        .unwrap();
        assert!(cluster.is_distributed());
        assert_eq!(cluster.peers(), vec!["127.0.0.1:9001".to_string()]);
    }
}
