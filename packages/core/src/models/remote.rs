//! Remote model.
//!
//! Remotes link records to nodes using an identifier the node itself chose.
//! A node can therefore sync data without ever storing hub record ids.

use serde::{Deserialize, Serialize};

use crate::utils::generate_id;

/// A node-local identifier bound to a record.
///
/// `(node_id, remote_id)` and `(node_id, record_id)` are both unique; a
/// remote binds exactly one record per node and is never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Remote {
    /// Unique identifier.
    pub id: String,

    /// The node that owns the mapping.
    pub node_id: String,

    /// The record the mapping points at.
    pub record_id: String,

    /// The identifier supplied by the node.
    pub remote_id: String,
}

impl Remote {
    pub fn new(
        node_id: impl Into<String>,
        record_id: impl Into<String>,
        remote_id: impl Into<String>,
    ) -> Self {
        Self {
            id: generate_id(),
            node_id: node_id.into(),
            record_id: record_id.into(),
            remote_id: remote_id.into(),
        }
    }
}
