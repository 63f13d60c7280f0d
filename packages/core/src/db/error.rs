//! Storage Error Types
//!
//! Error types shared by every storage backend. Service-layer failures
//! (admission, permissions, state machine) live in `services::HubError`;
//! this module only covers the storage contract itself.

use std::path::PathBuf;
use thiserror::Error;

/// The entity kinds a store persists, used in not-found errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Network,
    Node,
    Message,
    Record,
    Change,
    Error,
    Remote,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Network => "network",
            EntityKind::Node => "node",
            EntityKind::Message => "message",
            EntityKind::Record => "record",
            EntityKind::Change => "change",
            EntityKind::Error => "error",
            EntityKind::Remote => "remote",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage backend errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The network's database has never been initialized.
    #[error("database for network {network_id} not found")]
    DatabaseNotFound { network_id: String },

    /// A lookup that requires existence came back empty.
    #[error("{kind} with id {id} not found")]
    NotFound { kind: EntityKind, id: String },

    /// The storage contract was misused (e.g. commit without begin).
    #[error("invalid storage operation: {0}")]
    InvalidOperation(String),

    /// A uniqueness or foreign-key constraint was violated.
    #[error("storage constraint violated: {0}")]
    ConstraintViolation(String),

    /// Failed to create the backing directory for a database file.
    #[error("failed to prepare database path {path}: {source}")]
    PathSetup {
        path: PathBuf,
        source: std::io::Error,
    },

    /// SQL execution error with context.
    #[error("sql execution failed: {context}")]
    Sql { context: String },

    /// libsql driver error.
    #[error("database operation failed: {0}")]
    Libsql(#[from] libsql::Error),

    /// A persisted JSON column failed to round-trip.
    #[error("stored JSON could not be decoded: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    /// Create a database-not-found error.
    pub fn database_not_found(network_id: impl Into<String>) -> Self {
        Self::DatabaseNotFound {
            network_id: network_id.into(),
        }
    }

    /// Create a not-found error for an entity lookup.
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Create an invalid-operation error.
    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }

    /// Create a constraint-violation error.
    pub fn constraint(msg: impl Into<String>) -> Self {
        Self::ConstraintViolation(msg.into())
    }

    /// Create a SQL execution error with context.
    pub fn sql(context: impl Into<String>) -> Self {
        Self::Sql {
            context: context.into(),
        }
    }
}
