//! Admin endpoint handlers.
//!
//! Network provisioning creates the underlying storage before the network
//! singleton is written; every other handler opens the existing storage and
//! maps a missing database to 404.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use crate::db::{open_store, Store};
use crate::http::error::ApiError;
use crate::http::server::AppState;
use crate::http::types::{NetworkCreateRequest, NetworkPatchRequest, NodeCreateRequest};
use crate::services::{sync_service, HubError, NetworkService, NetworkUpdate, NodeService};
use crate::models::Method;
use crate::utils::{generate_id, validate_id};

/// Open the store for an existing network, 404ing malformed or unknown ids.
pub(crate) async fn open_network(
    state: &AppState,
    network_id: &str,
) -> Result<Arc<dyn Store>, ApiError> {
    if !validate_id(network_id) {
        return Err(HubError::invalid_id(network_id).into());
    }
    let store = open_store(&state.config, network_id, false)
        .await
        .map_err(HubError::from)?;
    Ok(store)
}

/// `POST /admin/networks`
pub async fn create_network(
    State(state): State<AppState>,
    Json(body): Json<NetworkCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let network_id = generate_id();
    let store = open_store(&state.config, &network_id, true)
        .await
        .map_err(HubError::from)?;

    let network = NetworkService::new(store)
        .init(body.name, body.schema, body.fetch_before_send)
        .await?;
    Ok((StatusCode::CREATED, Json(network)))
}

/// `GET /admin/networks/{network_id}`
pub async fn get_network(
    State(state): State<AppState>,
    Path(network_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let store = open_network(&state, &network_id).await?;
    let network = NetworkService::new(store).get().await?;
    Ok(Json(network))
}

/// `PATCH /admin/networks/{network_id}`
pub async fn patch_network(
    State(state): State<AppState>,
    Path(network_id): Path<String>,
    Json(body): Json<NetworkPatchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let store = open_network(&state, &network_id).await?;
    let network = NetworkService::new(store)
        .update(NetworkUpdate {
            name: body.name,
            schema: body.schema,
            fetch_before_send: body.fetch_before_send,
        })
        .await?;
    Ok(Json(network))
}

/// `GET /admin/networks/{network_id}/nodes`
pub async fn list_nodes(
    State(state): State<AppState>,
    Path(network_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let store = open_network(&state, &network_id).await?;
    let nodes = NodeService::new(store).list().await?;
    Ok(Json(nodes))
}

/// `POST /admin/networks/{network_id}/nodes`
pub async fn create_node(
    State(state): State<AppState>,
    Path(network_id): Path<String>,
    Json(body): Json<NodeCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let store = open_network(&state, &network_id).await?;
    let node = NodeService::new(store)
        .create(body.name, body.create, body.read, body.update, body.delete)
        .await?;
    Ok((StatusCode::CREATED, Json(node)))
}

/// `GET /admin/networks/{network_id}/nodes/{node_id}`
pub async fn get_node(
    State(state): State<AppState>,
    Path((network_id, node_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let store = open_network(&state, &network_id).await?;
    let node = NodeService::new(store).get_required(&node_id).await?;
    Ok(Json(node))
}

/// `POST /admin/networks/{network_id}/nodes/{node_id}/sync`
///
/// Triggers the cold-start fan-out worker for one node. The destination
/// must be able to read what it is about to receive.
pub async fn sync_node(
    State(state): State<AppState>,
    Path((network_id, node_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let store = open_network(&state, &network_id).await?;
    let node = NodeService::new(store).get_required(&node_id).await?;
    if !node.read {
        return Err(HubError::PermissionDenied {
            method: Method::Read,
        }
        .into());
    }

    sync_service::spawn(state.config.as_ref().clone(), network_id, node.id);
    Ok(StatusCode::ACCEPTED)
}
