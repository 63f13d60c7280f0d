//! Node Administration Service
//!
//! Creates and inspects the network's nodes. Permission bits are mutable;
//! `disable` clears all four at once. Nodes are never deleted.

use std::sync::Arc;

use tracing::info;

use crate::db::{EntityKind, Store};
use crate::models::Node;
use crate::services::HubError;
use crate::utils::validate_id;

/// Service managing nodes.
pub struct NodeService {
    store: Arc<dyn Store>,
}

impl NodeService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Create a node with the given permission bits.
    pub async fn create(
        &self,
        name: Option<String>,
        create: bool,
        read: bool,
        update: bool,
        delete: bool,
    ) -> Result<Node, HubError> {
        let node = Node::new(name, create, read, update, delete);

        self.store.begin().await?;
        match self.store.save_node(&node).await {
            Ok(()) => self.store.commit().await?,
            Err(e) => {
                self.store.rollback().await?;
                return Err(e.into());
            }
        }

        info!(node_id = %node.id, "node created");
        Ok(node)
    }

    /// Fetch a node by id. Malformed ids are rejected before lookup.
    pub async fn get(&self, node_id: &str) -> Result<Option<Node>, HubError> {
        if !validate_id(node_id) {
            return Err(HubError::invalid_id(node_id));
        }
        Ok(self.store.get_node(node_id).await?)
    }

    /// Fetch a node that must exist.
    pub async fn get_required(&self, node_id: &str) -> Result<Node, HubError> {
        self.get(node_id)
            .await?
            .ok_or_else(|| HubError::not_found(EntityKind::Node, node_id))
    }

    /// List every node in the network.
    pub async fn list(&self) -> Result<Vec<Node>, HubError> {
        Ok(self.store.get_nodes().await?)
    }

    /// Clear every permission bit on a node.
    pub async fn disable(&self, node_id: &str) -> Result<Node, HubError> {
        let mut node = self.get_required(node_id).await?;
        node.disable();

        self.store.begin().await?;
        match self.store.save_node(&node).await {
            Ok(()) => self.store.commit().await?,
            Err(e) => {
                self.store.rollback().await?;
                return Err(e.into());
            }
        }
        Ok(node)
    }
}
