//! HTTP server wiring.
//!
//! Builds the axum router over a shared `AppState` and exposes `serve` as
//! the embeddable entry point. State is deliberately small: the storage
//! configuration plus the time source, so tests can drive the router with
//! deterministic clocks and an in-memory backend.

use std::sync::Arc;

use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::db::StoreConfig;
use crate::http::{admin, messages};
use crate::models::{SystemTimeProvider, TimeProvider};

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    /// Storage backend configuration; handlers open per-request handles.
    pub config: Arc<StoreConfig>,

    /// Pipeline clock.
    pub time: Arc<dyn TimeProvider>,
}

impl AppState {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config: Arc::new(config),
            time: Arc::new(SystemTimeProvider),
        }
    }
}

/// Install a tracing subscriber honoring `RUST_LOG`.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// Build the full router: admin and messaging endpoint families.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/admin/networks", post(admin::create_network))
        .route(
            "/admin/networks/:network_id",
            get(admin::get_network).patch(admin::patch_network),
        )
        .route(
            "/admin/networks/:network_id/nodes",
            get(admin::list_nodes).post(admin::create_node),
        )
        .route(
            "/admin/networks/:network_id/nodes/:node_id",
            get(admin::get_node),
        )
        .route(
            "/admin/networks/:network_id/nodes/:node_id/sync",
            post(admin::sync_node),
        )
        .route("/messages", post(messages::send_message))
        .route("/messages/pending", get(messages::pending_messages))
        .route("/messages/next", post(messages::next_message))
        .route("/messages/:message_id", patch(messages::resolve_message))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the hub on the given port until the task is cancelled.
pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("synchub listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
