//! Message model and state machine.
//!
//! Messages are the core object in synchub. A message with `origin_id` set is
//! an inbound request from a node; a message with `destination_id` set is an
//! outbound delivery slot waiting in that node's queue. Exactly one of the
//! two is ever present.
//!
//! State transitions are closed: `Pending -> Processing` and
//! `Processing -> {Acknowledged, Failed}`. Terminal states accept nothing.
//! Every transition is recorded as an append-only [`Change`] row; failures
//! with a reason additionally record an [`ErrorEntry`] row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::utils::generate_id;

/// Message method, matching the record operation it requests.
///
/// Wire spellings are lowercase (`create`, `read`, `update`, `delete`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Create,
    Read,
    Update,
    Delete,
}

impl Method {
    /// Canonical lowercase spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Create => "create",
            Method::Read => "read",
            Method::Update => "update",
            Method::Delete => "delete",
        }
    }

    /// Parse the canonical lowercase spelling.
    pub fn parse(s: &str) -> Option<Method> {
        match s {
            "create" => Some(Method::Create),
            "read" => Some(Method::Read),
            "update" => Some(Method::Update),
            "delete" => Some(Method::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message lifecycle state.
///
/// Wire spellings are lowercase (`pending`, `processing`, `acknowledged`,
/// `failed`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageState {
    Pending,
    Processing,
    Acknowledged,
    Failed,
}

impl MessageState {
    /// Canonical lowercase spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageState::Pending => "pending",
            MessageState::Processing => "processing",
            MessageState::Acknowledged => "acknowledged",
            MessageState::Failed => "failed",
        }
    }

    /// Parse the canonical lowercase spelling.
    pub fn parse(s: &str) -> Option<MessageState> {
        match s {
            "pending" => Some(MessageState::Pending),
            "processing" => Some(MessageState::Processing),
            "acknowledged" => Some(MessageState::Acknowledged),
            "failed" => Some(MessageState::Failed),
            _ => None,
        }
    }

    /// Whether the state accepts no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MessageState::Acknowledged | MessageState::Failed)
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition(self, next: MessageState) -> bool {
        matches!(
            (self, next),
            (MessageState::Pending, MessageState::Processing)
                | (MessageState::Processing, MessageState::Acknowledged)
                | (MessageState::Processing, MessageState::Failed)
        )
    }
}

impl fmt::Display for MessageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state-change request (inbound) or a queued delivery (outbound).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier.
    pub id: String,

    /// Id of the inbound message this fan-out copy derives from.
    pub parent_id: Option<String>,

    /// Id of the origin node. Set on inbound messages only.
    pub origin_id: Option<String>,

    /// Id of the destination node. Set on outbound messages only.
    pub destination_id: Option<String>,

    /// When the message was created.
    pub timestamp: DateTime<Utc>,

    /// Requested record operation.
    pub method: Method,

    /// Data applied on create or update.
    pub payload: Option<Value>,

    /// Record affected by the message, once resolved.
    pub record_id: Option<String>,

    /// The destination node's own identifier for the record, if bound.
    pub remote_id: Option<String>,

    /// Current lifecycle state.
    pub state: MessageState,
}

impl Message {
    /// Build an inbound message as submitted by an origin node.
    pub fn inbound(
        origin_id: impl Into<String>,
        method: Method,
        payload: Option<Value>,
        record_id: Option<String>,
        remote_id: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: generate_id(),
            parent_id: None,
            origin_id: Some(origin_id.into()),
            destination_id: None,
            timestamp,
            method,
            payload,
            record_id,
            remote_id,
            state: MessageState::Pending,
        }
    }

    /// Build an outbound delivery slot for one destination node.
    pub fn outbound(
        destination_id: impl Into<String>,
        parent_id: Option<String>,
        method: Method,
        payload: Option<Value>,
        record_id: Option<String>,
        remote_id: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: generate_id(),
            parent_id,
            origin_id: None,
            destination_id: Some(destination_id.into()),
            timestamp,
            method,
            payload,
            record_id,
            remote_id,
            state: MessageState::Pending,
        }
    }

    /// Whether this message was submitted by a node (origin set).
    pub fn is_inbound(&self) -> bool {
        self.origin_id.is_some()
    }
}

/// Append-only audit entry recording a message state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    /// Unique identifier.
    pub id: String,

    /// Message this change belongs to.
    pub message_id: String,

    /// When the transition occurred.
    pub timestamp: DateTime<Utc>,

    /// The state the message moved into.
    pub state: MessageState,

    /// Free-text description of the transition.
    pub note: String,
}

impl Change {
    pub fn new(
        message_id: impl Into<String>,
        state: MessageState,
        note: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: generate_id(),
            message_id: message_id.into(),
            timestamp,
            state,
            note: note.into(),
        }
    }
}

/// Append-only audit entry recording why a message failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// Unique identifier.
    pub id: String,

    /// Message this error belongs to.
    pub message_id: String,

    /// When the error occurred.
    pub timestamp: DateTime<Utc>,

    /// Textual description of the failure.
    pub text: String,
}

impl ErrorEntry {
    pub fn new(
        message_id: impl Into<String>,
        text: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: generate_id(),
            message_id: message_id.into(),
            timestamp,
            text: text.into(),
        }
    }
}
