//! Identity Map Service
//!
//! Remotes let a node refer to hub records through identifiers the node
//! itself chose. Binding is idempotent for an exact existing mapping and
//! retro-stamps any outbound messages already queued for that node so the
//! node sees its own identifier on delivery.

use std::sync::Arc;

use tracing::debug;

use crate::db::{StorageError, Store};
use crate::models::{Record, Remote};
use crate::services::HubError;

/// Service managing `(node, remote_id) <-> record` bindings.
pub struct RemoteService {
    store: Arc<dyn Store>,
}

impl RemoteService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Bind `remote_id` to a record on behalf of a node.
    ///
    /// Returns the existing binding when `(node, remote_id)` already points
    /// at the same record; fails with `RemoteInUse` when it points at a
    /// different one. A fresh binding stamps every Pending outbound message
    /// for `(node, record)` with the new remote id.
    pub async fn bind(
        &self,
        node_id: &str,
        record_id: &str,
        remote_id: &str,
    ) -> Result<Remote, HubError> {
        if let Some(existing) = self
            .store
            .get_remote_by_remote_id(node_id, remote_id)
            .await?
        {
            if existing.record_id != record_id {
                return Err(HubError::RemoteInUse {
                    remote_id: remote_id.to_string(),
                });
            }
            return Ok(existing);
        }

        let remote = Remote::new(node_id, record_id, remote_id);
        match self.store.save_remote(&remote).await {
            Ok(()) => {}
            // a concurrent bind won the race; surface it like a direct conflict
            Err(StorageError::ConstraintViolation(_)) => {
                return Err(HubError::RemoteInUse {
                    remote_id: remote_id.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        }

        let stamped = self
            .store
            .update_messages(node_id, record_id, remote_id)
            .await?;
        debug!(node_id, record_id, remote_id, stamped, "bound remote");

        Ok(remote)
    }

    /// The remote a node has bound to a record, if any.
    pub async fn for_record(
        &self,
        node_id: &str,
        record_id: &str,
    ) -> Result<Option<Remote>, HubError> {
        Ok(self
            .store
            .get_remote_by_record_id(node_id, record_id)
            .await?)
    }

    /// Resolve the record a message addresses: directly by record id, or
    /// failing that through the origin's remote mapping.
    pub async fn resolve_record(
        &self,
        origin_id: Option<&str>,
        remote_id: Option<&str>,
        record_id: Option<&str>,
    ) -> Result<Option<Record>, HubError> {
        let mut record = match record_id {
            Some(id) => self.store.get_record(id).await?,
            None => None,
        };
        if record.is_none() {
            if let (Some(origin_id), Some(remote_id)) = (origin_id, remote_id) {
                if let Some(remote) = self
                    .store
                    .get_remote_by_remote_id(origin_id, remote_id)
                    .await?
                {
                    record = self.store.get_record(&remote.record_id).await?;
                }
            }
        }
        Ok(record)
    }
}
