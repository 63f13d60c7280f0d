//! Request bodies for the admin and messaging endpoints.
//!
//! Bodies are strict: unknown fields are rejected, so a typo'd request
//! fails loudly instead of being silently ignored.

use serde::Deserialize;
use serde_json::Value;

use crate::models::Method;

fn default_true() -> bool {
    true
}

/// `POST /admin/networks`
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkCreateRequest {
    pub name: Option<String>,
    #[serde(default = "default_true")]
    pub fetch_before_send: bool,
    pub schema: Value,
}

/// `PATCH /admin/networks/{network_id}`
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkPatchRequest {
    pub name: Option<String>,
    pub fetch_before_send: Option<bool>,
    pub schema: Option<Value>,
}

/// `POST /admin/networks/{network_id}/nodes`
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeCreateRequest {
    pub name: Option<String>,
    #[serde(default)]
    pub create: bool,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub update: bool,
    #[serde(default)]
    pub delete: bool,
}

/// `POST /messages`
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessageSendRequest {
    pub method: Method,
    pub payload: Option<Value>,
    pub record_id: Option<String>,
    pub remote_id: Option<String>,
}

/// `PATCH /messages/{message_id}`
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessageResolveRequest {
    pub success: bool,
    pub remote_id: Option<String>,
    pub reason: Option<String>,
}
