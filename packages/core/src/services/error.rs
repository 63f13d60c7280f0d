//! Service Layer Error Types
//!
//! `HubError` is the error surface of the whole pipeline: admission,
//! permissions, the message state machine, remote binding and schema
//! validation. Each variant maps onto one of the coarse kinds the HTTP
//! boundary translates into status codes.

use thiserror::Error;

use crate::db::{EntityKind, StorageError};
use crate::models::{MessageState, Method};

/// Coarse error classification used at the API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The network's storage was never initialized.
    DatabaseNotFound,
    /// A malformed identifier.
    InvalidId,
    /// A referenced entity is missing.
    NotFound,
    /// Admission, permission, state-machine or remote-binding violation.
    InvalidOperation,
    /// A JSON document failed schema validation.
    Validation,
    /// Backend failure that callers cannot act on.
    Internal,
}

/// Pipeline and service errors.
#[derive(Error, Debug)]
pub enum HubError {
    /// Referenced entity does not exist.
    #[error("{kind} with id {id} not found")]
    NotFound { kind: EntityKind, id: String },

    /// Malformed identifier.
    #[error("invalid identifier: {id}")]
    InvalidId { id: String },

    /// Create and Update messages must carry a JSON object payload.
    #[error("messages require an object payload when using the create or update method")]
    MissingPayload,

    /// A non-create message did not resolve to an existing record.
    #[error("expected record not found")]
    RecordNotFound,

    /// An origin tried to create a record its remote id already binds.
    #[error("record already exists for remote id {remote_id}")]
    RecordExists { remote_id: String },

    /// Writes to soft-deleted records are denied.
    #[error("record {record_id} has been deleted")]
    RecordDeleted { record_id: String },

    /// The fetch-before-send back-pressure rule.
    #[error("node has pending messages that must be fetched")]
    NodeHasPendingMessages,

    /// The origin node lacks the permission bit for the method.
    #[error("node does not have permission to {method}")]
    PermissionDenied { method: Method },

    /// Nodes may not send read messages, only fetch them.
    #[error("nodes may not send read messages, only fetch them")]
    ReadNotAllowed,

    /// Nodes may not supply a record id when using the create method.
    #[error("nodes may not supply a record id when using the create method")]
    CreateWithRecordId,

    /// The state machine rejected a transition.
    #[error("cannot change message state from {from} to {to}")]
    InvalidTransition {
        from: MessageState,
        to: MessageState,
    },

    /// Ack/fail caller is not the message's destination node.
    #[error("message {message_id} is not addressed to node {node_id}")]
    NotMessageDestination {
        message_id: String,
        node_id: String,
    },

    /// The remote id is already bound to a different record.
    #[error("remote id {remote_id} is already bound to another record")]
    RemoteInUse { remote_id: String },

    /// A record head failed validation against the network schema.
    #[error("record head failed schema validation: {details}")]
    SchemaValidation { details: String },

    /// The network schema itself is not a valid Draft-04 document.
    #[error("network schema is not a valid JSON Schema document: {details}")]
    InvalidSchema { details: String },

    /// Storage backend failure.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl HubError {
    /// Create a not-found error for an entity lookup.
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Create an invalid-id error.
    pub fn invalid_id(id: impl Into<String>) -> Self {
        Self::InvalidId { id: id.into() }
    }

    /// The coarse kind the API boundary maps to a status code.
    pub fn kind(&self) -> ErrorKind {
        match self {
            HubError::NotFound { .. } => ErrorKind::NotFound,
            HubError::InvalidId { .. } => ErrorKind::InvalidId,
            HubError::SchemaValidation { .. } | HubError::InvalidSchema { .. } => {
                ErrorKind::Validation
            }
            HubError::MissingPayload
            | HubError::RecordNotFound
            | HubError::RecordExists { .. }
            | HubError::RecordDeleted { .. }
            | HubError::NodeHasPendingMessages
            | HubError::PermissionDenied { .. }
            | HubError::ReadNotAllowed
            | HubError::CreateWithRecordId
            | HubError::InvalidTransition { .. }
            | HubError::NotMessageDestination { .. }
            | HubError::RemoteInUse { .. } => ErrorKind::InvalidOperation,
            HubError::Storage(storage) => match storage {
                StorageError::DatabaseNotFound { .. } => ErrorKind::DatabaseNotFound,
                StorageError::NotFound { .. } => ErrorKind::NotFound,
                StorageError::InvalidOperation(_) | StorageError::ConstraintViolation(_) => {
                    ErrorKind::InvalidOperation
                }
                _ => ErrorKind::Internal,
            },
        }
    }
}
