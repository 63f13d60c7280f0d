//! Record model.
//!
//! A record is the canonical hub-side state of a synced entity. Its `head`
//! is an arbitrary JSON object shaped by the network schema; deletion is a
//! soft tombstone (`deleted = true`, `head = None`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::Remote;
use crate::utils::generate_id;

/// Canonical state of a synced entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Unique identifier.
    pub id: String,

    /// When the last change to the record was made.
    pub last_updated: DateTime<Utc>,

    /// Has the record been soft-deleted. Implies `head` is `None`.
    pub deleted: bool,

    /// The current state of the record.
    pub head: Option<Value>,

    /// Cache of remotes bound to this record, eagerly loaded by the store.
    #[serde(default, skip_serializing)]
    pub remotes: Vec<Remote>,
}

impl Record {
    /// Create an empty record with a fresh id.
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            id: generate_id(),
            last_updated: timestamp,
            deleted: false,
            head: None,
            remotes: Vec::new(),
        }
    }

    /// The remote a given node has bound to this record, if any.
    pub fn remote_for(&self, node_id: &str) -> Option<&Remote> {
        self.remotes.iter().find(|r| r.node_id == node_id)
    }
}
