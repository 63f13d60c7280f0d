//! Record Store Service
//!
//! Applies messages to the canonical record store. Mutation is merge-patch
//! only (RFC 7396); deletion is a soft tombstone. Every surviving head is
//! validated against the network schema (JSON Schema Draft-04) before it is
//! persisted.

use std::sync::Arc;

use jsonschema::{Draft, JSONSchema};
use serde_json::{Map, Value};

use crate::db::{EntityKind, Store};
use crate::models::{Message, Method, Record, TimeProvider};
use crate::services::HubError;
use crate::utils::merge_patch;

/// Compile a Draft-04 validator for a schema document.
///
/// Also used when a network is provisioned, so a broken schema is rejected
/// before it can poison record validation.
pub(crate) fn compile_schema(schema: &Value) -> Result<JSONSchema, HubError> {
    JSONSchema::options()
        .with_draft(Draft::Draft4)
        .compile(schema)
        .map_err(|e| HubError::InvalidSchema {
            details: e.to_string(),
        })
}

/// Service applying messages to records.
pub struct RecordService {
    store: Arc<dyn Store>,
    time: Arc<dyn TimeProvider>,
}

impl RecordService {
    pub fn new(store: Arc<dyn Store>, time: Arc<dyn TimeProvider>) -> Self {
        Self { store, time }
    }

    /// Apply a message to its record and persist the result.
    ///
    /// With no existing record and a create method, a fresh record is
    /// instantiated. Delete tombstones the record; create and update
    /// merge-patch the payload into the current head. The new head is
    /// validated against the network schema unless the record is deleted.
    pub async fn apply(
        &self,
        message: &Message,
        record: Option<Record>,
    ) -> Result<Record, HubError> {
        let mut record = record.unwrap_or_else(|| Record::new(self.time.now()));

        if message.method == Method::Delete {
            record.head = None;
            record.deleted = true;
        } else {
            let existing = record.head.take().unwrap_or(Value::Object(Map::new()));
            let patch = message.payload.clone().unwrap_or(Value::Null);
            record.head = Some(merge_patch(existing, patch));
        }

        self.validate(&record).await?;

        record.last_updated = self.time.now();
        self.store.save_record(&record).await?;
        Ok(record)
    }

    /// Validate the record head against the current network schema.
    ///
    /// Skipped for tombstones, whose head is gone by invariant.
    pub async fn validate(&self, record: &Record) -> Result<(), HubError> {
        if record.deleted && record.head.is_none() {
            return Ok(());
        }

        let network = self
            .store
            .get_network()
            .await?
            .ok_or_else(|| HubError::not_found(EntityKind::Network, self.store.network_id()))?;

        let compiled = compile_schema(&network.schema)?;
        let head = record.head.clone().unwrap_or(Value::Null);
        if let Err(errors) = compiled.validate(&head) {
            let details = errors
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(HubError::SchemaValidation { details });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{open_store, StoreConfig};
    use crate::models::{Network, SystemTimeProvider};
    use crate::utils::generate_id;
    use chrono::Utc;
    use serde_json::json;

    async fn service_with_schema(schema: Value) -> RecordService {
        let config = StoreConfig::memory();
        let store = open_store(&config, &generate_id(), true).await.unwrap();
        let network = Network::new(store.network_id().to_string(), None, schema);
        store.save_network(&network).await.unwrap();
        RecordService::new(store, Arc::new(SystemTimeProvider))
    }

    fn inbound(method: Method, payload: Option<Value>, record_id: Option<String>) -> Message {
        Message::inbound(
            generate_id(),
            method,
            payload,
            record_id,
            None,
            crate::models::time::truncate_to_millis(Utc::now()),
        )
    }

    #[tokio::test]
    async fn create_instantiates_and_merges() {
        let service = service_with_schema(json!({"type": "object"})).await;
        let message = inbound(Method::Create, Some(json!({"foo": "bar"})), None);

        let record = service.apply(&message, None).await.unwrap();
        assert_eq!(record.head, Some(json!({"foo": "bar"})));
        assert!(!record.deleted);
    }

    #[tokio::test]
    async fn update_merge_patches_existing_head() {
        let service = service_with_schema(json!({"type": "object"})).await;
        let create = inbound(Method::Create, Some(json!({"foo": "bar", "baz": 1})), None);
        let record = service.apply(&create, None).await.unwrap();

        let update = inbound(
            Method::Update,
            Some(json!({"foo": null, "new": true})),
            Some(record.id.clone()),
        );
        let updated = service.apply(&update, Some(record)).await.unwrap();
        assert_eq!(updated.head, Some(json!({"baz": 1, "new": true})));
    }

    #[tokio::test]
    async fn delete_tombstones_and_skips_validation() {
        // schema that rejects everything; a tombstone must still pass
        let service = service_with_schema(json!({"type": "string"})).await;
        let mut record = Record::new(crate::models::time::truncate_to_millis(Utc::now()));
        record.head = Some(json!({"foo": "bar"}));

        let delete = inbound(Method::Delete, None, Some(record.id.clone()));
        let deleted = service.apply(&delete, Some(record)).await.unwrap();
        assert!(deleted.deleted);
        assert_eq!(deleted.head, None);
    }

    #[tokio::test]
    async fn schema_violation_surfaces_as_validation_error() {
        let service = service_with_schema(json!({
            "type": "object",
            "properties": {"count": {"type": "integer"}},
            "required": ["count"]
        }))
        .await;

        let message = inbound(Method::Create, Some(json!({"count": "nope"})), None);
        let err = service.apply(&message, None).await.unwrap_err();
        assert!(matches!(err, HubError::SchemaValidation { .. }));
    }
}
