//! Message Pipeline Service
//!
//! The transactional heart of the hub. An inbound submission runs through
//! four transaction frames:
//!
//! 1. inflate collaborators, admit, persist the Pending message
//! 2. transition Pending -> Processing
//! 3. apply to the record store, bind the supplied remote id, fan out one
//!    Pending outbound copy per read-permitted peer, transition ->
//!    Acknowledged
//! 4. only on a frame-3 failure: roll back, transition -> Failed and record
//!    the reason as an error row, then re-raise
//!
//! Fan-out lives inside frame 3, so an Acknowledged inbound message implies
//! every outbound child exists. Outbound messages stop after frame 1 and
//! wait in their destination's queue for fetch/acknowledge/fail.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::db::{EntityKind, Store};
use crate::models::{
    Change, ErrorEntry, Message, MessageState, Method, Network, Node, Record, Remote, TimeProvider,
};
use crate::services::{HubError, RecordService, RemoteService};

/// Collaborators resolved for a message before admission.
struct Inflated {
    network: Network,
    parent: Option<Message>,
    origin: Option<Node>,
    destination: Option<Node>,
    record: Option<Record>,
}

/// Service running the admission, apply and queue lifecycle of messages.
pub struct MessageService {
    store: Arc<dyn Store>,
    time: Arc<dyn TimeProvider>,
}

impl MessageService {
    pub fn new(store: Arc<dyn Store>, time: Arc<dyn TimeProvider>) -> Self {
        Self { store, time }
    }

    fn records(&self) -> RecordService {
        RecordService::new(self.store.clone(), self.time.clone())
    }

    fn remotes(&self) -> RemoteService {
        RemoteService::new(self.store.clone())
    }

    /// Submit a message on behalf of a node.
    ///
    /// The node API forbids Read sends and a record id on Create; everything
    /// else is left to admission.
    pub async fn submit(
        &self,
        origin_id: &str,
        method: Method,
        payload: Option<Value>,
        record_id: Option<String>,
        remote_id: Option<String>,
    ) -> Result<Message, HubError> {
        if method == Method::Read {
            return Err(HubError::ReadNotAllowed);
        }
        if method == Method::Create && record_id.is_some() {
            return Err(HubError::CreateWithRecordId);
        }

        let message = Message::inbound(
            origin_id,
            method,
            payload,
            record_id,
            remote_id,
            self.time.now(),
        );
        self.send(message).await
    }

    /// Run a message through the pipeline.
    ///
    /// Outbound messages (destination set) are admitted and persisted
    /// Pending, then returned; inbound messages continue through apply and
    /// fan-out to a terminal state.
    pub(crate) async fn send(&self, mut message: Message) -> Result<Message, HubError> {
        self.store.begin().await?;
        let admitted: Result<Inflated, HubError> = async {
            let inflated = self.inflate(&message).await?;
            self.admit(&message, &inflated).await?;
            self.store.save_message(&message).await?;
            Ok(inflated)
        }
        .await;
        let inflated = match admitted {
            Ok(inflated) => {
                self.store.commit().await?;
                inflated
            }
            Err(e) => {
                self.store.rollback().await?;
                return Err(e);
            }
        };

        if message.destination_id.is_some() {
            return Ok(message);
        }

        self.store.begin().await?;
        match self
            .transition(&mut message, MessageState::Processing, "")
            .await
        {
            Ok(()) => self.store.commit().await?,
            Err(e) => {
                self.store.rollback().await?;
                return Err(e);
            }
        }

        self.store.begin().await?;
        let applied: Result<(), HubError> = async {
            self.execute(&mut message, inflated.record).await?;
            self.propagate(&message).await?;
            self.transition(&mut message, MessageState::Acknowledged, "")
                .await?;
            Ok(())
        }
        .await;

        match applied {
            Ok(()) => {
                self.store.commit().await?;
                debug!(message_id = %message.id, method = %message.method, "message acknowledged");
                Ok(message)
            }
            Err(e) => {
                self.store.rollback().await?;
                self.mark_failed(&mut message, &e).await;
                Err(e)
            }
        }
    }

    /// Transition a rolled-back inbound message to Failed with the reason
    /// recorded as an error row. Best effort: a failure here must not mask
    /// the original error.
    async fn mark_failed(&self, message: &mut Message, cause: &HubError) {
        let result: Result<(), HubError> = async {
            self.store.begin().await?;
            let failed: Result<(), HubError> = async {
                self.transition(message, MessageState::Failed, "").await?;
                let entry = ErrorEntry::new(&message.id, cause.to_string(), self.time.now());
                self.store.save_error(&entry).await?;
                Ok(())
            }
            .await;
            match failed {
                Ok(()) => self.store.commit().await?,
                Err(e) => {
                    self.store.rollback().await?;
                    return Err(e);
                }
            }
            Ok(())
        }
        .await;

        if let Err(e) = result {
            warn!(message_id = %message.id, error = %e, "could not record message failure");
        }
    }

    /// Fetch objects related to a message.
    async fn inflate(&self, message: &Message) -> Result<Inflated, HubError> {
        let network = self
            .store
            .get_network()
            .await?
            .ok_or_else(|| HubError::not_found(EntityKind::Network, self.store.network_id()))?;

        let parent = match &message.parent_id {
            Some(id) => self.store.get_message(id).await?,
            None => None,
        };
        let origin = match &message.origin_id {
            Some(id) => self.store.get_node(id).await?,
            None => None,
        };
        let destination = match &message.destination_id {
            Some(id) => self.store.get_node(id).await?,
            None => None,
        };

        // an origin may address the record through its own remote id
        let record = self
            .remotes()
            .resolve_record(
                message.origin_id.as_deref(),
                message.remote_id.as_deref(),
                message.record_id.as_deref(),
            )
            .await?;

        Ok(Inflated {
            network,
            parent,
            origin,
            destination,
            record,
        })
    }

    /// Admission rules, evaluated before any state change.
    async fn admit(&self, message: &Message, ctx: &Inflated) -> Result<(), HubError> {
        // referenced collaborators must exist
        if let Some(parent_id) = &message.parent_id {
            if ctx.parent.is_none() {
                return Err(HubError::not_found(EntityKind::Message, parent_id));
            }
        }
        if let Some(origin_id) = &message.origin_id {
            if ctx.origin.is_none() {
                return Err(HubError::not_found(EntityKind::Node, origin_id));
            }
        }
        if let Some(destination_id) = &message.destination_id {
            if ctx.destination.is_none() {
                return Err(HubError::not_found(EntityKind::Node, destination_id));
            }
        }

        // create and update carry the data to apply
        if matches!(message.method, Method::Create | Method::Update)
            && !message.payload.as_ref().is_some_and(Value::is_object)
        {
            return Err(HubError::MissingPayload);
        }

        // anything but create must address an existing record
        if message.method != Method::Create && ctx.record.is_none() {
            return Err(HubError::RecordNotFound);
        }

        // an origin create must not collide with an already-bound record
        if message.is_inbound() && message.method == Method::Create && ctx.record.is_some() {
            return Err(HubError::RecordExists {
                remote_id: message.remote_id.clone().unwrap_or_default(),
            });
        }

        // fetch-before-send back-pressure
        if ctx.network.fetch_before_send {
            if let Some(origin_id) = &message.origin_id {
                let pending = self
                    .store
                    .get_message_count(origin_id, MessageState::Pending)
                    .await?;
                if pending > 0 {
                    return Err(HubError::NodeHasPendingMessages);
                }
            }
        }

        // the origin needs the permission bit matching the method
        if let Some(origin) = &ctx.origin {
            if !origin.allows(message.method) {
                return Err(HubError::PermissionDenied {
                    method: message.method,
                });
            }
        }

        // no resurrection of tombstoned records
        if let Some(record) = &ctx.record {
            if record.deleted {
                return Err(HubError::RecordDeleted {
                    record_id: record.id.clone(),
                });
            }
        }

        Ok(())
    }

    /// Apply the message to the record store and bind a supplied remote id.
    async fn execute(
        &self,
        message: &mut Message,
        record: Option<Record>,
    ) -> Result<(), HubError> {
        let record = self.records().apply(message, record).await?;
        message.record_id = Some(record.id.clone());

        if let (Some(origin_id), Some(remote_id)) =
            (message.origin_id.clone(), message.remote_id.clone())
        {
            self.remotes()
                .bind(&origin_id, &record.id, &remote_id)
                .await?;
        }

        self.store.save_message(message).await?;
        Ok(())
    }

    /// Enqueue one Pending outbound copy per peer with read permission.
    async fn propagate(&self, message: &Message) -> Result<(), HubError> {
        let record_id = message
            .record_id
            .clone()
            .ok_or_else(|| HubError::RecordNotFound)?;
        let origin_id = message.origin_id.as_deref();

        let mut fanned_out = 0u64;
        for node in self.store.get_nodes().await? {
            if !node.read || Some(node.id.as_str()) == origin_id {
                continue;
            }
            let remote = self
                .store
                .get_remote_by_record_id(&node.id, &record_id)
                .await?;
            let child = Message::outbound(
                node.id.clone(),
                Some(message.id.clone()),
                message.method,
                message.payload.clone(),
                Some(record_id.clone()),
                remote.map(|r: Remote| r.remote_id),
                self.time.now(),
            );
            self.store.save_message(&child).await?;
            fanned_out += 1;
        }

        debug!(message_id = %message.id, fanned_out, "propagated message");
        Ok(())
    }

    /// Move a saved message to a new state, appending a Change row.
    async fn transition(
        &self,
        message: &mut Message,
        next: MessageState,
        note: &str,
    ) -> Result<(), HubError> {
        if !message.state.can_transition(next) {
            return Err(HubError::InvalidTransition {
                from: message.state,
                to: next,
            });
        }
        message.state = next;

        let change = Change::new(&message.id, next, note, self.time.now());
        self.store.save_change(&change).await?;
        self.store.save_message(message).await?;
        Ok(())
    }

    /// Fetch the next pending message queued for a destination node.
    ///
    /// The oldest Pending row is claimed under lock and moved to Processing
    /// in one transaction, so concurrent fetchers cannot take the same
    /// message. Returns `None` on an empty queue.
    pub async fn fetch(&self, destination_id: &str) -> Result<Option<Message>, HubError> {
        self.store.begin().await?;
        let result: Result<Option<Message>, HubError> = async {
            let Some(mut message) = self
                .store
                .get_next_message(destination_id, MessageState::Pending, true)
                .await?
            else {
                return Ok(None);
            };
            self.transition(&mut message, MessageState::Processing, "")
                .await?;
            Ok(Some(message))
        }
        .await;

        match result {
            Ok(message) => {
                self.store.commit().await?;
                Ok(message)
            }
            Err(e) => {
                self.store.rollback().await?;
                Err(e)
            }
        }
    }

    /// Acknowledge a fetched message on behalf of its destination node.
    ///
    /// A supplied remote id that differs from the message's current one is
    /// bound to the record, which also stamps every message still queued for
    /// this node and record.
    pub async fn acknowledge(
        &self,
        node_id: &str,
        message_id: &str,
        remote_id: Option<&str>,
    ) -> Result<Message, HubError> {
        let mut message = self.get_required(message_id).await?;
        self.require_destination(&message, node_id)?;

        self.store.begin().await?;
        let result: Result<(), HubError> = async {
            self.transition(&mut message, MessageState::Acknowledged, "")
                .await?;
            if let Some(remote_id) = remote_id {
                if message.remote_id.as_deref() != Some(remote_id) {
                    let record_id = message
                        .record_id
                        .clone()
                        .ok_or_else(|| HubError::RecordNotFound)?;
                    self.remotes().bind(node_id, &record_id, remote_id).await?;
                    message.remote_id = Some(remote_id.to_string());
                    self.store.save_message(&message).await?;
                }
            }
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                self.store.commit().await?;
                Ok(message)
            }
            Err(e) => {
                self.store.rollback().await?;
                Err(e)
            }
        }
    }

    /// Fail a fetched message on behalf of its destination node, recording
    /// the reason when one is given.
    pub async fn fail(
        &self,
        node_id: &str,
        message_id: &str,
        reason: Option<&str>,
    ) -> Result<Message, HubError> {
        let mut message = self.get_required(message_id).await?;
        self.require_destination(&message, node_id)?;

        self.store.begin().await?;
        let result: Result<(), HubError> = async {
            self.transition(&mut message, MessageState::Failed, "").await?;
            if let Some(reason) = reason.filter(|r| !r.is_empty()) {
                let entry = ErrorEntry::new(&message.id, reason, self.time.now());
                self.store.save_error(&entry).await?;
            }
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                self.store.commit().await?;
                Ok(message)
            }
            Err(e) => {
                self.store.rollback().await?;
                Err(e)
            }
        }
    }

    /// Whether a node has messages waiting in its queue.
    pub async fn has_pending(&self, node_id: &str) -> Result<bool, HubError> {
        Ok(self.pending_count(node_id).await? > 0)
    }

    /// How many messages are waiting in a node's queue.
    pub async fn pending_count(&self, node_id: &str) -> Result<u64, HubError> {
        Ok(self
            .store
            .get_message_count(node_id, MessageState::Pending)
            .await?)
    }

    /// Fetch a message by id.
    pub async fn get(&self, message_id: &str) -> Result<Option<Message>, HubError> {
        if !crate::utils::validate_id(message_id) {
            return Err(HubError::invalid_id(message_id));
        }
        Ok(self.store.get_message(message_id).await?)
    }

    /// A message's state-change history.
    pub async fn changes(&self, message_id: &str) -> Result<Vec<Change>, HubError> {
        Ok(self.store.get_changes(message_id).await?)
    }

    /// A message's recorded errors.
    pub async fn errors(&self, message_id: &str) -> Result<Vec<ErrorEntry>, HubError> {
        Ok(self.store.get_errors(message_id).await?)
    }

    async fn get_required(&self, message_id: &str) -> Result<Message, HubError> {
        if !crate::utils::validate_id(message_id) {
            return Err(HubError::invalid_id(message_id));
        }
        self.store
            .get_message(message_id)
            .await?
            .ok_or_else(|| HubError::not_found(EntityKind::Message, message_id))
    }

    fn require_destination(&self, message: &Message, node_id: &str) -> Result<(), HubError> {
        if message.destination_id.as_deref() != Some(node_id) {
            return Err(HubError::NotMessageDestination {
                message_id: message.id.clone(),
                node_id: node_id.to_string(),
            });
        }
        Ok(())
    }
}
