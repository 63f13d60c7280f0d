//! Network Configuration Service
//!
//! Manages the per-database network singleton: name, record schema and the
//! fetch-before-send flag. The schema document is compiled as JSON Schema
//! Draft-04 before it is accepted, so a broken schema can never reach
//! record validation.

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::db::{EntityKind, Store};
use crate::models::Network;
use crate::services::record_service::compile_schema;
use crate::services::HubError;

/// Partial update for the network singleton.
#[derive(Debug, Default, Clone)]
pub struct NetworkUpdate {
    pub name: Option<String>,
    pub schema: Option<Value>,
    pub fetch_before_send: Option<bool>,
}

/// Service managing the network singleton.
pub struct NetworkService {
    store: Arc<dyn Store>,
}

impl NetworkService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Upsert the network configuration.
    pub async fn init(
        &self,
        name: Option<String>,
        schema: Value,
        fetch_before_send: bool,
    ) -> Result<Network, HubError> {
        compile_schema(&schema)?;

        let mut network = match self.store.get_network().await? {
            Some(existing) => existing,
            None => Network::new(self.store.network_id(), None, Value::Null),
        };
        network.name = name;
        network.schema = schema;
        network.fetch_before_send = fetch_before_send;

        self.store.begin().await?;
        match self.store.save_network(&network).await {
            Ok(()) => self.store.commit().await?,
            Err(e) => {
                self.store.rollback().await?;
                return Err(e.into());
            }
        }

        info!(network_id = %network.id, "network configured");
        Ok(network)
    }

    /// Fetch the network singleton.
    pub async fn get(&self) -> Result<Network, HubError> {
        self.store
            .get_network()
            .await?
            .ok_or_else(|| HubError::not_found(EntityKind::Network, self.store.network_id()))
    }

    /// Apply a partial update to the network configuration.
    pub async fn update(&self, update: NetworkUpdate) -> Result<Network, HubError> {
        let current = self.get().await?;
        let name = update.name.or(current.name);
        let schema = update.schema.unwrap_or(current.schema);
        let fetch_before_send = update
            .fetch_before_send
            .unwrap_or(current.fetch_before_send);
        self.init(name, schema, fetch_before_send).await
    }
}
