/// API server for the attestation service.
///
/// The server is a thin routing layer over the library:
/// - attests claim payloads and returns evidence bundle references
/// - streams stored bundles and verifies them on demand
/// - exposes anchor status/health and a manual anchor trigger
///
/// No handler ever makes a synchronous blockchain call; anchoring runs
/// out-of-band via the batcher.
pub mod routes;

use std::sync::Arc;

use axum::Router;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::anchor::batch::AnchorBatcher;
use crate::anchor::ledger::StatusLedger;
use crate::archive::ClaimArchive;
use crate::bundle::BundleStore;
use crate::crypto::sign::Signer;

/// Shared application state available to all handlers.
pub struct AppState {
    pub signer: Signer,
    pub store: BundleStore,
    pub archive: Arc<ClaimArchive>,
    pub ledger: Arc<StatusLedger>,
    /// Present only when anchoring is configured.
    pub batcher: Option<Arc<AnchorBatcher>>,
    /// Signalled on process shutdown; handed to spawned anchor runs.
    pub shutdown: watch::Receiver<bool>,
}

/// Build the Axum application with all routes and middleware.
pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::health_routes())
        .merge(routes::attest_routes())
        .merge(routes::bundle_routes())
        .merge(routes::anchor_routes())
        .with_state(Arc::new(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Start the API server.
pub async fn serve(
    state: AppState,
    addr: &str,
    mut shutdown: watch::Receiver<bool>,
) -> crate::error::Result<()> {
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(crate::error::AttestError::Io)?;

    tracing::info!("attestor API server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await
        .map_err(crate::error::AttestError::Io)?;

    Ok(())
}
