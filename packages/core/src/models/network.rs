//! Network configuration singleton.
//!
//! Exactly one `Network` row exists per isolated database. It carries the
//! JSON Schema (Draft-04) every record head is validated against and the
//! `fetch_before_send` back-pressure flag.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Holds the configuration and settings for a sync network.
///
/// The `id` matches the network's storage namespace and never changes after
/// provisioning. `schema` may be replaced; `fetch_before_send` controls
/// whether a node must drain its pending queue before it may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    /// Unique identifier, equal to the storage namespace id.
    pub id: String,

    /// User friendly identifier.
    pub name: Option<String>,

    /// JSON Schema (Draft-04) used to validate record heads.
    pub schema: Value,

    /// When true, nodes must fetch all pending messages before sending.
    pub fetch_before_send: bool,
}

impl Network {
    /// Create a network bound to a storage namespace id.
    pub fn new(id: impl Into<String>, name: Option<String>, schema: Value) -> Self {
        Self {
            id: id.into(),
            name,
            schema,
            fetch_before_send: true,
        }
    }
}
