//! Node model.
//!
//! Nodes are the external participants of a network. Each carries four
//! permission bits, one per message method.

use serde::{Deserialize, Serialize};

use crate::models::Method;
use crate::utils::generate_id;

/// An external participant with per-method permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier.
    pub id: String,

    /// User friendly identifier.
    pub name: Option<String>,

    /// Can the node create records.
    pub create: bool,

    /// Can the node read records.
    pub read: bool,

    /// Can the node update records.
    pub update: bool,

    /// Can the node delete records.
    pub delete: bool,
}

impl Node {
    /// Create a node with a fresh id and the given permission bits.
    pub fn new(name: Option<String>, create: bool, read: bool, update: bool, delete: bool) -> Self {
        Self {
            id: generate_id(),
            name,
            create,
            read,
            update,
            delete,
        }
    }

    /// Whether the node holds the permission matching `method`.
    pub fn allows(&self, method: Method) -> bool {
        match method {
            Method::Create => self.create,
            Method::Read => self.read,
            Method::Update => self.update,
            Method::Delete => self.delete,
        }
    }

    /// Clear every permission bit.
    pub fn disable(&mut self) {
        self.create = false;
        self.read = false;
        self.update = false;
        self.delete = false;
    }
}
