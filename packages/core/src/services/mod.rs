//! Business Services
//!
//! This module contains the hub's core logic, built per request over a
//! shared `Arc<dyn Store>` handle:
//!
//! - `NetworkService` - network singleton configuration
//! - `NodeService` - node administration
//! - `MessageService` - admission, pipeline, per-destination queues
//! - `RecordService` - merge-patch application and schema validation
//! - `RemoteService` - node-local identity mapping
//! - `sync_service` - cold-start fan-out background worker
//!
//! Services coordinate between the storage layer and the HTTP boundary;
//! every cross-entity operation runs inside storage transactions.

pub mod error;
pub mod message_service;
pub mod network_service;
pub mod node_service;
pub mod record_service;
pub mod remote_service;
pub mod sync_service;

pub use error::{ErrorKind, HubError};
pub use message_service::MessageService;
pub use network_service::{NetworkService, NetworkUpdate};
pub use node_service::NodeService;
pub use record_service::RecordService;
pub use remote_service::RemoteService;
pub use sync_service::{SyncService, RECORD_BATCH_SIZE};
