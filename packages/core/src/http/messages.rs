//! Messaging endpoint handlers.
//!
//! Every messaging route is addressed by two headers: `X-Sync-Network-Id`
//! selects the storage namespace and `X-Sync-Node-Id` the acting node. Both
//! must resolve or the request 404s. Ack/fail additionally require the
//! acting node to be the message's destination.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::db::{open_store, Store};
use crate::http::error::ApiError;
use crate::http::server::AppState;
use crate::http::types::{MessageResolveRequest, MessageSendRequest};
use crate::models::Node;
use crate::services::{HubError, MessageService, NodeService};
use crate::utils::validate_id;

pub(crate) const HEADER_NETWORK_ID: &str = "x-sync-network-id";
pub(crate) const HEADER_NODE_ID: &str = "x-sync-node-id";

/// Resolve the two routing headers into a store handle and the acting node.
async fn resolve_node(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<(Arc<dyn Store>, Node), ApiError> {
    let network_id = header_value(headers, HEADER_NETWORK_ID)?;
    let node_id = header_value(headers, HEADER_NODE_ID)?;

    if !validate_id(&network_id) {
        return Err(HubError::invalid_id(network_id).into());
    }
    let store = open_store(&state.config, &network_id, false)
        .await
        .map_err(HubError::from)?;

    let node = NodeService::new(store.clone()).get_required(&node_id).await?;
    Ok((store, node))
}

fn header_value(headers: &HeaderMap, name: &str) -> Result<String, ApiError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| ApiError::bad_request(format!("missing header {name}")))
}

/// `POST /messages`
///
/// Sends an inbound message and blocks until it reaches a terminal state.
pub async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<MessageSendRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (store, node) = resolve_node(&state, &headers).await?;

    let message = MessageService::new(store, state.time.clone())
        .submit(
            &node.id,
            body.method,
            body.payload,
            body.record_id,
            body.remote_id,
        )
        .await
        .map_err(ApiError::admission)?;
    Ok(Json(message))
}

/// `GET /messages/pending`
pub async fn pending_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let (store, node) = resolve_node(&state, &headers).await?;
    let pending = MessageService::new(store, state.time.clone())
        .has_pending(&node.id)
        .await?;
    Ok(Json(pending))
}

/// `POST /messages/next`
///
/// Fetches the next pending message, transitioning it to Processing.
/// Responds 204 when the queue is empty.
pub async fn next_message(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let (store, node) = resolve_node(&state, &headers).await?;
    let fetched = MessageService::new(store, state.time.clone())
        .fetch(&node.id)
        .await?;
    Ok(match fetched {
        Some(message) => Json(message).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

/// `PATCH /messages/{message_id}`
///
/// Acknowledge (`success: true`) or fail (`success: false`) a fetched
/// message. Only legal from the message's destination node while it is
/// Processing.
pub async fn resolve_message(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<MessageResolveRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (store, node) = resolve_node(&state, &headers).await?;
    let service = MessageService::new(store, state.time.clone());

    let message = if body.success {
        service
            .acknowledge(&node.id, &message_id, body.remote_id.as_deref())
            .await?
    } else {
        service
            .fail(&node.id, &message_id, body.reason.as_deref())
            .await?
    };
    Ok(Json(message))
}
