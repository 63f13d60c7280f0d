//! HTTP surface tests, driving the router in-process via tower::ServiceExt.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use synchub_core::db::StoreConfig;
use synchub_core::http::{router, AppState};
use synchub_core::utils::generate_id;

fn app() -> Router {
    router(AppState::new(StoreConfig::memory()))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn message_request(
    method: &str,
    uri: &str,
    network_id: &str,
    node_id: &str,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("X-Sync-Network-Id", network_id)
        .header("X-Sync-Node-Id", node_id);
    if body.is_some() {
        builder = builder.header("content-type", "application/json");
    }
    builder
        .body(match body {
            Some(value) => Body::from(value.to_string()),
            None => Body::empty(),
        })
        .unwrap()
}

/// Provision a network plus a writer and a reader node, returning their ids.
async fn provision(app: &Router) -> (String, String, String) {
    let (status, network) = send(
        app,
        post_json(
            "/admin/networks",
            json!({"name": "net", "fetch_before_send": true, "schema": {"type": "object"}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let network_id = network["id"].as_str().unwrap().to_string();

    let (status, writer) = send(
        app,
        post_json(
            &format!("/admin/networks/{network_id}/nodes"),
            json!({"name": "writer", "create": true, "update": true, "delete": true}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, reader) = send(
        app,
        post_json(
            &format!("/admin/networks/{network_id}/nodes"),
            json!({"name": "reader", "read": true}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    (
        network_id,
        writer["id"].as_str().unwrap().to_string(),
        reader["id"].as_str().unwrap().to_string(),
    )
}

#[tokio::test]
async fn network_admin_round_trip() {
    let app = app();
    let (network_id, _, _) = provision(&app).await;

    let (status, network) = send(&app, get(&format!("/admin/networks/{network_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(network["name"], "net");
    assert_eq!(network["fetch_before_send"], true);

    let patch = Request::builder()
        .method("PATCH")
        .uri(format!("/admin/networks/{network_id}"))
        .header("content-type", "application/json")
        .body(Body::from(json!({"fetch_before_send": false}).to_string()))
        .unwrap();
    let (status, patched) = send(&app, patch).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patched["fetch_before_send"], false);
    assert_eq!(patched["name"], "net");

    let (status, nodes) = send(&app, get(&format!("/admin/networks/{network_id}/nodes"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(nodes.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn messaging_happy_path() {
    let app = app();
    let (network_id, writer_id, reader_id) = provision(&app).await;

    // writer sends a create and gets the terminal message back
    let (status, sent) = send(
        &app,
        message_request(
            "POST",
            "/messages",
            &network_id,
            &writer_id,
            Some(json!({"method": "create", "payload": {"foo": "bar"}})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sent["state"], "acknowledged");
    assert!(sent["record_id"].is_string());

    // reader polls, fetches, acknowledges with its own identifier
    let (status, pending) = send(
        &app,
        message_request("GET", "/messages/pending", &network_id, &reader_id, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pending, json!(true));

    let (status, fetched) = send(
        &app,
        message_request("POST", "/messages/next", &network_id, &reader_id, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["state"], "processing");
    assert_eq!(fetched["payload"], json!({"foo": "bar"}));

    let message_id = fetched["id"].as_str().unwrap();
    let (status, acked) = send(
        &app,
        message_request(
            "PATCH",
            &format!("/messages/{message_id}"),
            &network_id,
            &reader_id,
            Some(json!({"success": true, "remote_id": "reader-1"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(acked["state"], "acknowledged");
    assert_eq!(acked["remote_id"], "reader-1");

    // queue drained
    let (status, _) = send(
        &app,
        message_request("POST", "/messages/next", &network_id, &reader_id, None),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, pending) = send(
        &app,
        message_request("GET", "/messages/pending", &network_id, &reader_id, None),
    )
    .await;
    assert_eq!(pending, json!(false));
}

#[tokio::test]
async fn failing_a_message_carries_the_reason() {
    let app = app();
    let (network_id, writer_id, reader_id) = provision(&app).await;

    send(
        &app,
        message_request(
            "POST",
            "/messages",
            &network_id,
            &writer_id,
            Some(json!({"method": "create", "payload": {}})),
        ),
    )
    .await;
    let (_, fetched) = send(
        &app,
        message_request("POST", "/messages/next", &network_id, &reader_id, None),
    )
    .await;
    let message_id = fetched["id"].as_str().unwrap();

    let (status, failed) = send(
        &app,
        message_request(
            "PATCH",
            &format!("/messages/{message_id}"),
            &network_id,
            &reader_id,
            Some(json!({"success": false, "reason": "no disk space"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(failed["state"], "failed");
}

#[tokio::test]
async fn unknown_and_malformed_ids_yield_404() {
    let app = app();

    // malformed network id
    let (status, _) = send(&app, get("/admin/networks/not-a-uuid")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // well-formed but unprovisioned network id
    let (status, _) = send(&app, get(&format!("/admin/networks/{}", generate_id()))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // unknown node inside an existing network
    let (network_id, _, _) = provision(&app).await;
    let (status, _) = send(
        &app,
        get(&format!(
            "/admin/networks/{network_id}/nodes/{}",
            generate_id()
        )),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // messaging headers pointing at an unknown network
    let (status, _) = send(
        &app,
        message_request(
            "GET",
            "/messages/pending",
            &generate_id(),
            &generate_id(),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admission_violations_yield_400() {
    let app = app();
    let (network_id, writer_id, reader_id) = provision(&app).await;

    // read sends are forbidden at the node API
    let (status, body) = send(
        &app,
        message_request(
            "POST",
            "/messages",
            &network_id,
            &writer_id,
            Some(json!({"method": "read"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    // reader has no create permission
    let (status, _) = send(
        &app,
        message_request(
            "POST",
            "/messages",
            &network_id,
            &reader_id,
            Some(json!({"method": "create", "payload": {}})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // update against a record that does not exist
    let (status, _) = send(
        &app,
        message_request(
            "POST",
            "/messages",
            &network_id,
            &writer_id,
            Some(json!({"method": "update", "payload": {}, "record_id": generate_id()})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // missing node header
    let request = Request::builder()
        .method("GET")
        .uri("/messages/pending")
        .header("X-Sync-Network-Id", &network_id)
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn resolving_another_nodes_message_is_rejected() {
    let app = app();
    let (network_id, writer_id, reader_id) = provision(&app).await;

    send(
        &app,
        message_request(
            "POST",
            "/messages",
            &network_id,
            &writer_id,
            Some(json!({"method": "create", "payload": {}})),
        ),
    )
    .await;
    let (_, fetched) = send(
        &app,
        message_request("POST", "/messages/next", &network_id, &reader_id, None),
    )
    .await;
    let message_id = fetched["id"].as_str().unwrap();

    // the writer is not the destination
    let (status, _) = send(
        &app,
        message_request(
            "PATCH",
            &format!("/messages/{message_id}"),
            &network_id,
            &writer_id,
            Some(json!({"success": true})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // a message that does not exist
    let (status, _) = send(
        &app,
        message_request(
            "PATCH",
            &format!("/messages/{}", generate_id()),
            &network_id,
            &reader_id,
            Some(json!({"success": true})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn sync_endpoint_requires_read_permission() {
    let app = app();
    let (network_id, writer_id, reader_id) = provision(&app).await;

    // the writer cannot receive a sync: no read bit
    let (status, _) = send(
        &app,
        post_json(
            &format!("/admin/networks/{network_id}/nodes/{writer_id}/sync"),
            json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        post_json(
            &format!("/admin/networks/{network_id}/nodes/{reader_id}/sync"),
            json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn invalid_schema_documents_are_rejected() {
    let app = app();
    let (status, _) = send(
        &app,
        post_json(
            "/admin/networks",
            json!({"name": "bad", "schema": {"type": 12}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
