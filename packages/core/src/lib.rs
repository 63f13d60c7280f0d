//! Synchub Core
//!
//! A hub-and-spoke data synchronization service: a bounded set of external
//! nodes exchange record changes through a central coordinator. Every
//! change is a message that is validated, applied to the canonical record
//! store under a transaction, and fanned out as per-destination queued
//! copies that peers fetch and acknowledge.
//!
//! # Architecture
//!
//! - **Merge-patch records**: record heads mutate only through RFC 7396
//!   merge patches, validated against the network's JSON Schema (Draft-04)
//! - **Transactional pipeline**: admission, apply and fan-out run inside
//!   storage transactions; an acknowledged message implies its fan-out
//!   copies exist
//! - **Storage abstraction**: the pipeline is written against the
//!   [`db::Store`] trait; libsql and in-memory backends ship in-tree
//! - **Identity mapping**: nodes address records through their own remote
//!   ids, never hub ids
//!
//! # Modules
//!
//! - [`models`] - data structures (Network, Node, Message, Record, Remote)
//! - [`db`] - storage layer: `Store` trait and its backends
//! - [`services`] - admission, pipeline, queues, cold-start sync
//! - [`http`] - axum admin and messaging endpoints
//! - [`utils`] - merge patch and id helpers

pub mod db;
pub mod http;
pub mod models;
pub mod services;
pub mod utils;

// Re-exports
pub use db::{open_store, Backend, StorageError, Store, StoreConfig};
pub use models::{Message, MessageState, Method, Network, Node, Record, Remote};
pub use services::{
    HubError, MessageService, NetworkService, NodeService, RecordService, RemoteService,
    SyncService,
};
