//! Cold-Start Sync Service
//!
//! Re-enqueues every live record to a single destination node, in batches,
//! so a freshly provisioned node can catch up with the network. Runs as a
//! background task that opens its own store connection; the records it
//! enqueues are ordinary outbound Creates the node fetches and acknowledges
//! like any other message.
//!
//! The operation is idempotent at the record level: a node that recognizes
//! a create by its remote id only has to acknowledge it again.

use std::sync::Arc;

use tracing::{error, info};

use crate::db::{open_store, EntityKind, Store, StoreConfig};
use crate::models::{Message, Method, SystemTimeProvider, TimeProvider};
use crate::services::{HubError, MessageService};

/// How many records one storage round-trip may carry.
pub const RECORD_BATCH_SIZE: u64 = 1000;

/// Service streaming the record store into one node's queue.
pub struct SyncService {
    store: Arc<dyn Store>,
    time: Arc<dyn TimeProvider>,
}

impl SyncService {
    pub fn new(store: Arc<dyn Store>, time: Arc<dyn TimeProvider>) -> Self {
        Self { store, time }
    }

    /// Enqueue an outbound Create to `node_id` for every non-deleted record.
    ///
    /// Each create carries the record's head and the node's existing remote
    /// binding, if any. Returns how many messages were enqueued.
    pub async fn resend_all(&self, node_id: &str) -> Result<u64, HubError> {
        let node = self
            .store
            .get_node(node_id)
            .await?
            .ok_or_else(|| HubError::not_found(EntityKind::Node, node_id))?;

        let messages = MessageService::new(self.store.clone(), self.time.clone());

        let mut offset = 0u64;
        let mut enqueued = 0u64;
        loop {
            let batch = self.store.get_records(offset, RECORD_BATCH_SIZE).await?;
            if batch.is_empty() {
                break;
            }
            let batch_len = batch.len() as u64;

            for record in batch {
                let remote_id = record.remote_for(&node.id).map(|r| r.remote_id.clone());
                let message = Message::outbound(
                    node.id.clone(),
                    None,
                    Method::Create,
                    record.head.clone(),
                    Some(record.id.clone()),
                    remote_id,
                    self.time.now(),
                );
                messages.send(message).await?;
                enqueued += 1;
            }

            offset += batch_len;
            if batch_len < RECORD_BATCH_SIZE {
                break;
            }
        }

        info!(node_id, enqueued, "cold-start sync finished");
        Ok(enqueued)
    }
}

/// Run a cold-start sync as a detached background task.
///
/// The task opens its own store handle so it never shares a transaction
/// stack with the request that triggered it.
pub fn spawn(config: StoreConfig, network_id: String, node_id: String) {
    tokio::spawn(async move {
        let store = match open_store(&config, &network_id, false).await {
            Ok(store) => store,
            Err(e) => {
                error!(network_id, node_id, error = %e, "sync worker could not open storage");
                return;
            }
        };

        let service = SyncService::new(store, Arc::new(SystemTimeProvider));
        if let Err(e) = service.resend_all(&node_id).await {
            error!(network_id, node_id, error = %e, "cold-start sync failed");
        }
    });
}
