pub mod config;
pub mod observability;
pub mod peer;

use std::sync::Arc;

use axum::Router;
use octostore_notify::Notifier;
use octostore_storage::{DynObjectLayer, InMemoryObjectLayer};
use thiserror::Error;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::peer::{HttpPeerTransport, peer_router};

pub use observability::init_tracing;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("notifier: {0}")]
    Notify(#[from] octostore_notify::NotifyError),
    #[error("peer transport: {0}")]
    Peer(#[from] octostore_notify::PeerError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Creates the object layer with the configured buckets.
pub async fn build_object_layer(cfg: &AppConfig) -> DynObjectLayer {
    let layer = InMemoryObjectLayer::new();
    for bucket in &cfg.storage.buckets {
        layer.make_bucket(bucket).await;
    }
    Arc::new(layer)
}

/// Builds the notifier for this node, loading every bucket's configuration.
pub async fn build_notifier(
    cfg: &AppConfig,
    object_layer: DynObjectLayer,
) -> Result<Arc<Notifier>, ServerError> {
    let transport = HttpPeerTransport::new(
        cfg.server.node_addr.clone(),
        cfg.server.remote_peers(),
        cfg.server.request_timeout(),
    )?;

    let notifier = Notifier::builder()
        .object_layer(object_layer)
        .config(cfg.notify.clone())
        .peer_transport(Arc::new(transport))
        .build()
        .await?;
    Ok(Arc::new(notifier))
}

pub fn build_app(notifier: Arc<Notifier>) -> Router {
    peer_router(notifier).layer(TraceLayer::new_for_http())
}

/// Runs the node until ctrl-c.
pub async fn run(cfg: AppConfig) -> Result<(), ServerError> {
    let object_layer = build_object_layer(&cfg).await;
    let notifier = build_notifier(&cfg, object_layer).await?;
    let app = build_app(notifier.clone());

    let listener = tokio::net::TcpListener::bind(&cfg.server.listen_addr).await?;
    tracing::info!(
        addr = %cfg.server.listen_addr,
        node = %cfg.server.node_addr,
        peers = cfg.server.remote_peers().len(),
        "OctoStore node listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;
    Ok(())
}
