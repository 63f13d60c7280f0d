//! HTTP Surface
//!
//! axum router exposing the hub's two endpoint families:
//!
//! - **Admin** (`/admin/networks/...`) - provision networks, manage nodes,
//!   trigger cold-start syncs
//! - **Messaging** (`/messages...`) - send, poll, fetch and resolve
//!   messages on behalf of a node, addressed by the
//!   `X-Sync-Network-Id` / `X-Sync-Node-Id` headers
//!
//! Handlers open a store handle per request; the shared state only carries
//! the storage configuration.

mod admin;
mod error;
mod messages;
mod server;
mod types;

pub use error::ApiError;
pub use server::{init_tracing, router, serve, AppState};
pub use types::{
    MessageResolveRequest, MessageSendRequest, NetworkCreateRequest, NetworkPatchRequest,
    NodeCreateRequest,
};
