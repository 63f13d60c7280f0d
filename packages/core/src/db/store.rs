//! Store Trait - Storage Abstraction Layer
//!
//! The whole message pipeline is written against this trait so backends are
//! interchangeable: a durable SQL file per network (`SqliteStore`) or the
//! process-local `MemoryStore`. One store handle represents one connection
//! to one network's database; concurrent workers open their own handles.
//!
//! # Transactions
//!
//! `begin`/`commit`/`rollback` nest as a stack: an inner `begin` pushes, an
//! inner `commit`/`rollback` pops the top. Backends that only support one
//! real transaction flatten inner levels to savepoints (SQLite) or treat the
//! outermost frame as the unit of rollback (memory). The pipeline relies on
//! a single outer transaction wrapping admission, apply and fan-out.
//!
//! # Ownership of ids
//!
//! Callers generate entity ids (`utils::generate_id`) before saving. `save_*`
//! methods upsert by id, except `save_change`/`save_error` which are
//! insert-only append rows.

use async_trait::async_trait;

use crate::db::StorageError;
use crate::models::{Change, ErrorEntry, Message, MessageState, Network, Node, Record, Remote};

/// Abstraction over one network's persistent state.
///
/// Implementations must be `Send + Sync`; they are shared behind
/// `Arc<dyn Store>` across the services built for a request.
#[async_trait]
pub trait Store: Send + Sync + std::fmt::Debug {
    /// The network id this store is scoped to.
    fn network_id(&self) -> &str;

    /// Release the connection to the backend, if any.
    async fn disconnect(&self) -> Result<(), StorageError>;

    /// Delete all data for the current network.
    async fn drop_data(&self) -> Result<(), StorageError>;

    /// Open a transaction frame (see module docs for nesting semantics).
    async fn begin(&self) -> Result<(), StorageError>;

    /// Commit the innermost open transaction frame.
    async fn commit(&self) -> Result<(), StorageError>;

    /// Roll back the innermost open transaction frame.
    async fn rollback(&self) -> Result<(), StorageError>;

    /// Upsert the network singleton. Its id is forced to `network_id()`.
    async fn save_network(&self, network: &Network) -> Result<(), StorageError>;

    /// Upsert a node.
    async fn save_node(&self, node: &Node) -> Result<(), StorageError>;

    /// Upsert a message.
    async fn save_message(&self, message: &Message) -> Result<(), StorageError>;

    /// Append a state-change audit row. Changes are immutable once saved.
    async fn save_change(&self, change: &Change) -> Result<(), StorageError>;

    /// Append an error audit row. Errors are immutable once saved.
    async fn save_error(&self, error: &ErrorEntry) -> Result<(), StorageError>;

    /// Upsert a record. The record's `remotes` cache is not persisted here;
    /// remotes are saved through `save_remote`.
    async fn save_record(&self, record: &Record) -> Result<(), StorageError>;

    /// Insert a remote. Enforces `(node_id, remote_id)` and
    /// `(node_id, record_id)` uniqueness.
    async fn save_remote(&self, remote: &Remote) -> Result<(), StorageError>;

    /// Fetch the network singleton.
    async fn get_network(&self) -> Result<Option<Network>, StorageError>;

    /// Fetch a node by id.
    async fn get_node(&self, node_id: &str) -> Result<Option<Node>, StorageError>;

    /// Fetch all nodes in the network.
    async fn get_nodes(&self) -> Result<Vec<Node>, StorageError>;

    /// Fetch a message by id.
    async fn get_message(&self, message_id: &str) -> Result<Option<Message>, StorageError>;

    /// Fetch the oldest message for a destination in the given state,
    /// ordered by `(timestamp, insertion order)`.
    ///
    /// When `with_lock` is set and the backend supports row-level locking,
    /// the row stays locked for the duration of the open transaction.
    async fn get_next_message(
        &self,
        destination_id: &str,
        state: MessageState,
        with_lock: bool,
    ) -> Result<Option<Message>, StorageError>;

    /// Count messages for a destination in the given state.
    async fn get_message_count(
        &self,
        destination_id: &str,
        state: MessageState,
    ) -> Result<u64, StorageError>;

    /// Fetch a record by id with its remotes eagerly loaded.
    async fn get_record(&self, record_id: &str) -> Result<Option<Record>, StorageError>;

    /// Fetch a page of non-deleted records ordered by id, remotes eagerly
    /// loaded. Callers page through this in batches of at most 1000.
    async fn get_records(&self, offset: u64, limit: u64) -> Result<Vec<Record>, StorageError>;

    /// Fetch a node's remote by the node-supplied identifier.
    async fn get_remote_by_remote_id(
        &self,
        node_id: &str,
        remote_id: &str,
    ) -> Result<Option<Remote>, StorageError>;

    /// Fetch a node's remote by record id.
    async fn get_remote_by_record_id(
        &self,
        node_id: &str,
        record_id: &str,
    ) -> Result<Option<Remote>, StorageError>;

    /// Fetch a message's state-change audit rows.
    async fn get_changes(&self, message_id: &str) -> Result<Vec<Change>, StorageError>;

    /// Fetch a message's error audit rows.
    async fn get_errors(&self, message_id: &str) -> Result<Vec<ErrorEntry>, StorageError>;

    /// Stamp `remote_id` on every Pending message queued for `node_id` that
    /// references `record_id`. Returns how many rows were touched.
    async fn update_messages(
        &self,
        node_id: &str,
        record_id: &str,
        remote_id: &str,
    ) -> Result<u64, StorageError>;
}
