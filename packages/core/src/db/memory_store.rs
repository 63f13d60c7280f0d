//! MemoryStore - In-Process Storage Backend
//!
//! Keeps every network's state in a process-global registry keyed by
//! network id, so separate handles (HTTP requests, background sync workers)
//! opened against the same network observe the same data - mirroring how the
//! SQL backend shares a database file.
//!
//! Transactions snapshot the whole network state at the outermost `begin`;
//! the outermost `rollback` restores the snapshot. Inner frames only track
//! nesting depth. A single mutex per network serializes writers, which also
//! stands in for row-level locking on `get_next_message`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use once_cell::sync::Lazy;

use crate::db::{StorageError, Store};
use crate::models::{Change, ErrorEntry, Message, MessageState, Network, Node, Record, Remote};

/// Process-wide registry of in-memory networks.
static REGISTRY: Lazy<RwLock<HashMap<String, Arc<Mutex<NetworkData>>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// All persisted state of one network.
#[derive(Debug, Default, Clone)]
struct NetworkData {
    network: Option<Network>,
    nodes: HashMap<String, Node>,
    messages: HashMap<String, Message>,
    /// Insertion order per message id, the FIFO tie-break for equal
    /// timestamps.
    message_seq: HashMap<String, u64>,
    next_seq: u64,
    changes: Vec<Change>,
    errors: Vec<ErrorEntry>,
    records: HashMap<String, Record>,
    remotes: HashMap<String, Remote>,
}

#[derive(Debug, Default)]
struct TxState {
    depth: usize,
    snapshot: Option<NetworkData>,
}

/// In-memory storage backend.
#[derive(Debug)]
pub struct MemoryStore {
    network_id: String,
    data: Arc<Mutex<NetworkData>>,
    tx: Mutex<TxState>,
}

impl MemoryStore {
    /// Open a handle onto the network's shared in-memory state.
    ///
    /// Fails with `DatabaseNotFound` when the network was never created and
    /// `create` is false.
    pub fn open(network_id: &str, create: bool) -> Result<Self, StorageError> {
        let data = {
            let registry = REGISTRY.read().expect("memory registry poisoned");
            registry.get(network_id).cloned()
        };

        let data = match data {
            Some(existing) => existing,
            None if create => {
                let mut registry = REGISTRY.write().expect("memory registry poisoned");
                registry
                    .entry(network_id.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(NetworkData::default())))
                    .clone()
            }
            None => return Err(StorageError::database_not_found(network_id)),
        };

        Ok(Self {
            network_id: network_id.to_string(),
            data,
            tx: Mutex::new(TxState::default()),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, NetworkData> {
        self.data.lock().expect("memory store poisoned")
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn network_id(&self) -> &str {
        &self.network_id
    }

    async fn disconnect(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn drop_data(&self) -> Result<(), StorageError> {
        let mut registry = REGISTRY.write().expect("memory registry poisoned");
        registry.remove(&self.network_id);
        *self.lock() = NetworkData::default();
        Ok(())
    }

    async fn begin(&self) -> Result<(), StorageError> {
        let mut tx = self.tx.lock().expect("tx state poisoned");
        if tx.depth == 0 {
            tx.snapshot = Some(self.lock().clone());
        }
        tx.depth += 1;
        Ok(())
    }

    async fn commit(&self) -> Result<(), StorageError> {
        let mut tx = self.tx.lock().expect("tx state poisoned");
        if tx.depth == 0 {
            return Err(StorageError::invalid_operation("commit without begin"));
        }
        tx.depth -= 1;
        if tx.depth == 0 {
            tx.snapshot = None;
        }
        Ok(())
    }

    async fn rollback(&self) -> Result<(), StorageError> {
        let mut tx = self.tx.lock().expect("tx state poisoned");
        if tx.depth == 0 {
            return Err(StorageError::invalid_operation("rollback without begin"));
        }
        tx.depth -= 1;
        if tx.depth == 0 {
            if let Some(snapshot) = tx.snapshot.take() {
                *self.lock() = snapshot;
            }
        }
        Ok(())
    }

    async fn save_network(&self, network: &Network) -> Result<(), StorageError> {
        let mut stored = network.clone();
        stored.id = self.network_id.clone();
        self.lock().network = Some(stored);
        Ok(())
    }

    async fn save_node(&self, node: &Node) -> Result<(), StorageError> {
        self.lock().nodes.insert(node.id.clone(), node.clone());
        Ok(())
    }

    async fn save_message(&self, message: &Message) -> Result<(), StorageError> {
        let mut data = self.lock();
        if !data.message_seq.contains_key(&message.id) {
            let seq = data.next_seq;
            data.next_seq += 1;
            data.message_seq.insert(message.id.clone(), seq);
        }
        data.messages.insert(message.id.clone(), message.clone());
        Ok(())
    }

    async fn save_change(&self, change: &Change) -> Result<(), StorageError> {
        let mut data = self.lock();
        if data.changes.iter().any(|c| c.id == change.id) {
            return Err(StorageError::invalid_operation(
                "change rows are append-only",
            ));
        }
        data.changes.push(change.clone());
        Ok(())
    }

    async fn save_error(&self, error: &ErrorEntry) -> Result<(), StorageError> {
        let mut data = self.lock();
        if data.errors.iter().any(|e| e.id == error.id) {
            return Err(StorageError::invalid_operation("error rows are append-only"));
        }
        data.errors.push(error.clone());
        Ok(())
    }

    async fn save_record(&self, record: &Record) -> Result<(), StorageError> {
        let mut stored = record.clone();
        // the remotes cache is derived state, rebuilt on read
        stored.remotes = Vec::new();
        self.lock().records.insert(stored.id.clone(), stored);
        Ok(())
    }

    async fn save_remote(&self, remote: &Remote) -> Result<(), StorageError> {
        let mut data = self.lock();
        for existing in data.remotes.values() {
            if existing.id == remote.id {
                continue;
            }
            if existing.node_id == remote.node_id && existing.remote_id == remote.remote_id {
                return Err(StorageError::constraint(format!(
                    "remote id {} already bound for node {}",
                    remote.remote_id, remote.node_id
                )));
            }
            if existing.node_id == remote.node_id && existing.record_id == remote.record_id {
                return Err(StorageError::constraint(format!(
                    "record {} already bound for node {}",
                    remote.record_id, remote.node_id
                )));
            }
        }
        data.remotes.insert(remote.id.clone(), remote.clone());
        Ok(())
    }

    async fn get_network(&self) -> Result<Option<Network>, StorageError> {
        Ok(self.lock().network.clone())
    }

    async fn get_node(&self, node_id: &str) -> Result<Option<Node>, StorageError> {
        Ok(self.lock().nodes.get(node_id).cloned())
    }

    async fn get_nodes(&self) -> Result<Vec<Node>, StorageError> {
        let mut nodes: Vec<Node> = self.lock().nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(nodes)
    }

    async fn get_message(&self, message_id: &str) -> Result<Option<Message>, StorageError> {
        Ok(self.lock().messages.get(message_id).cloned())
    }

    async fn get_next_message(
        &self,
        destination_id: &str,
        state: MessageState,
        _with_lock: bool,
    ) -> Result<Option<Message>, StorageError> {
        // the per-network mutex serializes writers, so the lock flag has
        // nothing extra to do here
        let data = self.lock();
        let next = data
            .messages
            .values()
            .filter(|m| m.state == state && m.destination_id.as_deref() == Some(destination_id))
            .min_by_key(|m| (m.timestamp, data.message_seq.get(&m.id).copied().unwrap_or(0)));
        Ok(next.cloned())
    }

    async fn get_message_count(
        &self,
        destination_id: &str,
        state: MessageState,
    ) -> Result<u64, StorageError> {
        let count = self
            .lock()
            .messages
            .values()
            .filter(|m| m.state == state && m.destination_id.as_deref() == Some(destination_id))
            .count();
        Ok(count as u64)
    }

    async fn get_record(&self, record_id: &str) -> Result<Option<Record>, StorageError> {
        let data = self.lock();
        let Some(mut record) = data.records.get(record_id).cloned() else {
            return Ok(None);
        };
        record.remotes = data
            .remotes
            .values()
            .filter(|r| r.record_id == record.id)
            .cloned()
            .collect();
        Ok(Some(record))
    }

    async fn get_records(&self, offset: u64, limit: u64) -> Result<Vec<Record>, StorageError> {
        let data = self.lock();
        let mut records: Vec<Record> = data.records.values().filter(|r| !r.deleted).cloned().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));

        let mut page: Vec<Record> = records
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        for record in &mut page {
            record.remotes = data
                .remotes
                .values()
                .filter(|r| r.record_id == record.id)
                .cloned()
                .collect();
        }
        Ok(page)
    }

    async fn get_remote_by_remote_id(
        &self,
        node_id: &str,
        remote_id: &str,
    ) -> Result<Option<Remote>, StorageError> {
        Ok(self
            .lock()
            .remotes
            .values()
            .find(|r| r.node_id == node_id && r.remote_id == remote_id)
            .cloned())
    }

    async fn get_remote_by_record_id(
        &self,
        node_id: &str,
        record_id: &str,
    ) -> Result<Option<Remote>, StorageError> {
        Ok(self
            .lock()
            .remotes
            .values()
            .find(|r| r.node_id == node_id && r.record_id == record_id)
            .cloned())
    }

    async fn get_changes(&self, message_id: &str) -> Result<Vec<Change>, StorageError> {
        Ok(self
            .lock()
            .changes
            .iter()
            .filter(|c| c.message_id == message_id)
            .cloned()
            .collect())
    }

    async fn get_errors(&self, message_id: &str) -> Result<Vec<ErrorEntry>, StorageError> {
        Ok(self
            .lock()
            .errors
            .iter()
            .filter(|e| e.message_id == message_id)
            .cloned()
            .collect())
    }

    async fn update_messages(
        &self,
        node_id: &str,
        record_id: &str,
        remote_id: &str,
    ) -> Result<u64, StorageError> {
        let mut data = self.lock();
        let mut touched = 0;
        for message in data.messages.values_mut() {
            if message.state == MessageState::Pending
                && message.destination_id.as_deref() == Some(node_id)
                && message.record_id.as_deref() == Some(record_id)
            {
                message.remote_id = Some(remote_id.to_string());
                touched += 1;
            }
        }
        Ok(touched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::time::truncate_to_millis;
    use crate::models::Method;
    use crate::utils::generate_id;
    use chrono::{Duration, Utc};

    fn open_fresh() -> MemoryStore {
        MemoryStore::open(&generate_id(), true).unwrap()
    }

    #[tokio::test]
    async fn missing_network_requires_create() {
        let id = generate_id();
        assert!(matches!(
            MemoryStore::open(&id, false),
            Err(StorageError::DatabaseNotFound { .. })
        ));
        MemoryStore::open(&id, true).unwrap();
        // second open without create now succeeds and shares state
        let store = MemoryStore::open(&id, false).unwrap();
        assert_eq!(store.network_id(), id);
    }

    #[tokio::test]
    async fn outer_rollback_restores_snapshot() {
        let store = open_fresh();
        let node = Node::new(Some("keep".into()), true, true, false, false);
        store.save_node(&node).await.unwrap();

        store.begin().await.unwrap();
        store.begin().await.unwrap();
        let lost = Node::new(Some("lost".into()), false, false, false, false);
        store.save_node(&lost).await.unwrap();
        store.commit().await.unwrap(); // inner pop
        store.rollback().await.unwrap(); // outer restore

        assert!(store.get_node(&node.id).await.unwrap().is_some());
        assert!(store.get_node(&lost.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn commit_without_begin_is_rejected() {
        let store = open_fresh();
        assert!(matches!(
            store.commit().await,
            Err(StorageError::InvalidOperation(_))
        ));
        assert!(matches!(
            store.rollback().await,
            Err(StorageError::InvalidOperation(_))
        ));
    }

    #[tokio::test]
    async fn next_message_is_fifo_with_insertion_tie_break() {
        let store = open_fresh();
        let dest = generate_id();
        let now = truncate_to_millis(Utc::now());

        let late = Message::outbound(dest.clone(), None, Method::Create, None, None, None, now + Duration::seconds(5));
        let first = Message::outbound(dest.clone(), None, Method::Create, None, None, None, now);
        let second = Message::outbound(dest.clone(), None, Method::Create, None, None, None, now);
        store.save_message(&late).await.unwrap();
        store.save_message(&first).await.unwrap();
        store.save_message(&second).await.unwrap();

        let next = store
            .get_next_message(&dest, MessageState::Pending, true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next.id, first.id);
    }

    #[tokio::test]
    async fn remote_uniqueness_is_enforced() {
        let store = open_fresh();
        let node_id = generate_id();
        let remote = Remote::new(node_id.clone(), generate_id(), "abcd");
        store.save_remote(&remote).await.unwrap();

        let same_remote_id = Remote::new(node_id.clone(), generate_id(), "abcd");
        assert!(matches!(
            store.save_remote(&same_remote_id).await,
            Err(StorageError::ConstraintViolation(_))
        ));

        let same_record = Remote::new(node_id, remote.record_id.clone(), "efgh");
        assert!(matches!(
            store.save_remote(&same_record).await,
            Err(StorageError::ConstraintViolation(_))
        ));
    }

    #[tokio::test]
    async fn update_messages_only_touches_pending_for_node_and_record() {
        let store = open_fresh();
        let dest = generate_id();
        let other_dest = generate_id();
        let record_id = generate_id();
        let now = truncate_to_millis(Utc::now());

        let mut processing = Message::outbound(
            dest.clone(),
            None,
            Method::Update,
            None,
            Some(record_id.clone()),
            None,
            now,
        );
        processing.state = MessageState::Processing;
        let pending = Message::outbound(
            dest.clone(),
            None,
            Method::Update,
            None,
            Some(record_id.clone()),
            None,
            now,
        );
        let elsewhere = Message::outbound(
            other_dest,
            None,
            Method::Update,
            None,
            Some(record_id.clone()),
            None,
            now,
        );
        store.save_message(&processing).await.unwrap();
        store.save_message(&pending).await.unwrap();
        store.save_message(&elsewhere).await.unwrap();

        let touched = store.update_messages(&dest, &record_id, "abcd").await.unwrap();
        assert_eq!(touched, 1);

        let stamped = store.get_message(&pending.id).await.unwrap().unwrap();
        assert_eq!(stamped.remote_id.as_deref(), Some("abcd"));
        let untouched = store.get_message(&processing.id).await.unwrap().unwrap();
        assert_eq!(untouched.remote_id, None);
    }

    #[tokio::test]
    async fn records_page_with_remotes_loaded() {
        let store = open_fresh();
        let now = truncate_to_millis(Utc::now());
        let node_id = generate_id();

        let mut deleted = Record::new(now);
        deleted.deleted = true;
        store.save_record(&deleted).await.unwrap();

        let mut ids = Vec::new();
        for _ in 0..3 {
            let record = Record::new(now);
            store.save_record(&record).await.unwrap();
            store
                .save_remote(&Remote::new(generate_id(), record.id.clone(), "r"))
                .await
                .unwrap();
            ids.push(record.id);
        }
        store
            .save_remote(&Remote::new(node_id, ids[0].clone(), "mine"))
            .await
            .unwrap();

        let all = store.get_records(0, 1000).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|r| !r.deleted));
        assert!(all.iter().all(|r| !r.remotes.is_empty()));

        let paged: Vec<Record> = store.get_records(1, 1).await.unwrap();
        assert_eq!(paged.len(), 1);
    }
}
