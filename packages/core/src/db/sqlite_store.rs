//! SqliteStore - libsql Storage Backend
//!
//! One database file per network id under a configurable data directory.
//! JSON columns (`schema`, `payload`, `head`) are stored as TEXT; timestamps
//! are fixed-width RFC3339 strings with millisecond precision, so their
//! lexicographic order is their chronological order.
//!
//! # Transactions and locking
//!
//! The store holds one connection for its lifetime. The outermost `begin`
//! issues `BEGIN IMMEDIATE`, taking the database write lock up front; inner
//! frames become savepoints. SQLite has no row-level locks, so the
//! `with_lock` flag on `get_next_message` is satisfied by that single-writer
//! model: two fetchers cannot hold overlapping write transactions.
//!
//! Messages carry an AUTOINCREMENT `seq` column used only as the FIFO
//! tie-break for equal timestamps.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{params_from_iter, Builder, Connection, Row};
use tokio::sync::Mutex;

use crate::db::{StorageError, Store};
use crate::models::{Change, ErrorEntry, Message, MessageState, Network, Node, Record, Remote};

/// Timestamp rendering used for every persisted DATETIME column.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

fn format_ts(dt: DateTime<Utc>) -> String {
    dt.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_ts(s: &str, column: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::sql(format!("invalid timestamp in {column}: {e}")))
}

fn json_to_text(value: &serde_json::Value) -> Result<String, StorageError> {
    Ok(serde_json::to_string(value)?)
}

fn opt_json_to_text(value: &Option<serde_json::Value>) -> Result<Option<String>, StorageError> {
    value.as_ref().map(json_to_text).transpose()
}

fn text_to_json(text: &str, column: &str) -> Result<serde_json::Value, StorageError> {
    serde_json::from_str(text)
        .map_err(|e| StorageError::sql(format!("invalid JSON in {column}: {e}")))
}

/// libsql storage backend, one file per network.
pub struct SqliteStore {
    network_id: String,
    path: PathBuf,
    // keeps the database handle alive for the connection's lifetime
    _db: libsql::Database,
    conn: Connection,
    tx_depth: Mutex<usize>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("network_id", &self.network_id)
            .field("path", &self.path)
            .finish()
    }
}

impl SqliteStore {
    /// Open (and optionally create) the network's database file.
    pub async fn open(
        data_dir: &Path,
        network_id: &str,
        create: bool,
    ) -> Result<Self, StorageError> {
        let path = data_dir.join(format!("{network_id}.db"));

        if !create && !path.exists() {
            return Err(StorageError::database_not_found(network_id));
        }

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| StorageError::PathSetup {
                    path: path.clone(),
                    source,
                })?;
            }
        }

        let db = Builder::new_local(&path).build().await?;
        let conn = db.connect()?;

        let store = Self {
            network_id: network_id.to_string(),
            path,
            _db: db,
            conn,
            tx_depth: Mutex::new(0),
        };

        store.configure_connection().await?;
        if create {
            store.initialize_schema().await?;
        }

        Ok(store)
    }

    /// Execute a PRAGMA statement.
    ///
    /// PRAGMA statements return rows, so query() must be used over execute().
    async fn execute_pragma(&self, pragma: &str) -> Result<(), StorageError> {
        let mut stmt = self
            .conn
            .prepare(pragma)
            .await
            .map_err(|e| StorageError::sql(format!("failed to prepare '{pragma}': {e}")))?;
        stmt.query(())
            .await
            .map_err(|e| StorageError::sql(format!("failed to execute '{pragma}': {e}")))?;
        Ok(())
    }

    async fn configure_connection(&self) -> Result<(), StorageError> {
        self.execute_pragma("PRAGMA journal_mode = WAL").await?;
        self.execute_pragma("PRAGMA busy_timeout = 5000").await?;
        self.execute_pragma("PRAGMA foreign_keys = ON").await?;
        Ok(())
    }

    /// Create all tables and indexes. Idempotent.
    async fn initialize_schema(&self) -> Result<(), StorageError> {
        let ddl = [
            "CREATE TABLE IF NOT EXISTS networks (
                id TEXT PRIMARY KEY,
                name TEXT,
                fetch_before_send INTEGER NOT NULL DEFAULT 1,
                schema TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS nodes (
                id TEXT PRIMARY KEY,
                name TEXT,
                \"create\" INTEGER NOT NULL DEFAULT 0,
                \"read\" INTEGER NOT NULL DEFAULT 0,
                \"update\" INTEGER NOT NULL DEFAULT 0,
                \"delete\" INTEGER NOT NULL DEFAULT 0
            )",
            "CREATE TABLE IF NOT EXISTS records (
                id TEXT PRIMARY KEY,
                last_updated TEXT NOT NULL,
                deleted INTEGER NOT NULL DEFAULT 0,
                head TEXT
            )",
            "CREATE TABLE IF NOT EXISTS messages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                parent_id TEXT REFERENCES messages(id),
                origin_id TEXT REFERENCES nodes(id),
                destination_id TEXT REFERENCES nodes(id),
                timestamp TEXT NOT NULL,
                method TEXT NOT NULL,
                payload TEXT,
                remote_id TEXT,
                record_id TEXT,
                state TEXT NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_messages_queue
                ON messages(destination_id, state, timestamp)",
            "CREATE TABLE IF NOT EXISTS changes (
                id TEXT PRIMARY KEY,
                message_id TEXT NOT NULL REFERENCES messages(id),
                timestamp TEXT NOT NULL,
                state TEXT NOT NULL,
                note TEXT
            )",
            "CREATE INDEX IF NOT EXISTS idx_changes_message ON changes(message_id)",
            "CREATE TABLE IF NOT EXISTS errors (
                id TEXT PRIMARY KEY,
                message_id TEXT NOT NULL REFERENCES messages(id),
                timestamp TEXT NOT NULL,
                text TEXT
            )",
            "CREATE INDEX IF NOT EXISTS idx_errors_message ON errors(message_id)",
            "CREATE TABLE IF NOT EXISTS remotes (
                id TEXT PRIMARY KEY,
                node_id TEXT NOT NULL REFERENCES nodes(id),
                record_id TEXT NOT NULL REFERENCES records(id),
                remote_id TEXT NOT NULL,
                UNIQUE(node_id, remote_id),
                UNIQUE(node_id, record_id)
            )",
        ];

        for statement in ddl {
            self.conn
                .execute(statement, ())
                .await
                .map_err(|e| StorageError::sql(format!("schema initialization failed: {e}")))?;
        }
        Ok(())
    }

    fn row_to_network(row: &Row) -> Result<Network, StorageError> {
        let id: String = row
            .get(0)
            .map_err(|e| StorageError::sql(format!("networks.id: {e}")))?;
        let name: Option<String> = row
            .get(1)
            .map_err(|e| StorageError::sql(format!("networks.name: {e}")))?;
        let fetch_before_send: i64 = row
            .get(2)
            .map_err(|e| StorageError::sql(format!("networks.fetch_before_send: {e}")))?;
        let schema_text: String = row
            .get(3)
            .map_err(|e| StorageError::sql(format!("networks.schema: {e}")))?;

        Ok(Network {
            id,
            name,
            schema: text_to_json(&schema_text, "networks.schema")?,
            fetch_before_send: fetch_before_send != 0,
        })
    }

    fn row_to_node(row: &Row) -> Result<Node, StorageError> {
        let id: String = row
            .get(0)
            .map_err(|e| StorageError::sql(format!("nodes.id: {e}")))?;
        let name: Option<String> = row
            .get(1)
            .map_err(|e| StorageError::sql(format!("nodes.name: {e}")))?;
        let create: i64 = row
            .get(2)
            .map_err(|e| StorageError::sql(format!("nodes.create: {e}")))?;
        let read: i64 = row
            .get(3)
            .map_err(|e| StorageError::sql(format!("nodes.read: {e}")))?;
        let update: i64 = row
            .get(4)
            .map_err(|e| StorageError::sql(format!("nodes.update: {e}")))?;
        let delete: i64 = row
            .get(5)
            .map_err(|e| StorageError::sql(format!("nodes.delete: {e}")))?;

        Ok(Node {
            id,
            name,
            create: create != 0,
            read: read != 0,
            update: update != 0,
            delete: delete != 0,
        })
    }

    fn row_to_message(row: &Row) -> Result<Message, StorageError> {
        let id: String = row
            .get(0)
            .map_err(|e| StorageError::sql(format!("messages.id: {e}")))?;
        let parent_id: Option<String> = row
            .get(1)
            .map_err(|e| StorageError::sql(format!("messages.parent_id: {e}")))?;
        let origin_id: Option<String> = row
            .get(2)
            .map_err(|e| StorageError::sql(format!("messages.origin_id: {e}")))?;
        let destination_id: Option<String> = row
            .get(3)
            .map_err(|e| StorageError::sql(format!("messages.destination_id: {e}")))?;
        let timestamp: String = row
            .get(4)
            .map_err(|e| StorageError::sql(format!("messages.timestamp: {e}")))?;
        let method: String = row
            .get(5)
            .map_err(|e| StorageError::sql(format!("messages.method: {e}")))?;
        let payload: Option<String> = row
            .get(6)
            .map_err(|e| StorageError::sql(format!("messages.payload: {e}")))?;
        let remote_id: Option<String> = row
            .get(7)
            .map_err(|e| StorageError::sql(format!("messages.remote_id: {e}")))?;
        let record_id: Option<String> = row
            .get(8)
            .map_err(|e| StorageError::sql(format!("messages.record_id: {e}")))?;
        let state: String = row
            .get(9)
            .map_err(|e| StorageError::sql(format!("messages.state: {e}")))?;

        Ok(Message {
            id,
            parent_id,
            origin_id,
            destination_id,
            timestamp: parse_ts(&timestamp, "messages.timestamp")?,
            method: crate::models::Method::parse(&method)
                .ok_or_else(|| StorageError::sql(format!("unknown method '{method}'")))?,
            payload: payload
                .map(|p| text_to_json(&p, "messages.payload"))
                .transpose()?,
            remote_id,
            record_id,
            state: MessageState::parse(&state)
                .ok_or_else(|| StorageError::sql(format!("unknown state '{state}'")))?,
        })
    }

    fn row_to_record(row: &Row) -> Result<Record, StorageError> {
        let id: String = row
            .get(0)
            .map_err(|e| StorageError::sql(format!("records.id: {e}")))?;
        let last_updated: String = row
            .get(1)
            .map_err(|e| StorageError::sql(format!("records.last_updated: {e}")))?;
        let deleted: i64 = row
            .get(2)
            .map_err(|e| StorageError::sql(format!("records.deleted: {e}")))?;
        let head: Option<String> = row
            .get(3)
            .map_err(|e| StorageError::sql(format!("records.head: {e}")))?;

        Ok(Record {
            id,
            last_updated: parse_ts(&last_updated, "records.last_updated")?,
            deleted: deleted != 0,
            head: head.map(|h| text_to_json(&h, "records.head")).transpose()?,
            remotes: Vec::new(),
        })
    }

    fn row_to_remote(row: &Row) -> Result<Remote, StorageError> {
        let id: String = row
            .get(0)
            .map_err(|e| StorageError::sql(format!("remotes.id: {e}")))?;
        let node_id: String = row
            .get(1)
            .map_err(|e| StorageError::sql(format!("remotes.node_id: {e}")))?;
        let record_id: String = row
            .get(2)
            .map_err(|e| StorageError::sql(format!("remotes.record_id: {e}")))?;
        let remote_id: String = row
            .get(3)
            .map_err(|e| StorageError::sql(format!("remotes.remote_id: {e}")))?;

        Ok(Remote {
            id,
            node_id,
            record_id,
            remote_id,
        })
    }

    fn row_to_change(row: &Row) -> Result<Change, StorageError> {
        let id: String = row
            .get(0)
            .map_err(|e| StorageError::sql(format!("changes.id: {e}")))?;
        let message_id: String = row
            .get(1)
            .map_err(|e| StorageError::sql(format!("changes.message_id: {e}")))?;
        let timestamp: String = row
            .get(2)
            .map_err(|e| StorageError::sql(format!("changes.timestamp: {e}")))?;
        let state: String = row
            .get(3)
            .map_err(|e| StorageError::sql(format!("changes.state: {e}")))?;
        let note: Option<String> = row
            .get(4)
            .map_err(|e| StorageError::sql(format!("changes.note: {e}")))?;

        Ok(Change {
            id,
            message_id,
            timestamp: parse_ts(&timestamp, "changes.timestamp")?,
            state: MessageState::parse(&state)
                .ok_or_else(|| StorageError::sql(format!("unknown state '{state}'")))?,
            note: note.unwrap_or_default(),
        })
    }

    fn row_to_error(row: &Row) -> Result<ErrorEntry, StorageError> {
        let id: String = row
            .get(0)
            .map_err(|e| StorageError::sql(format!("errors.id: {e}")))?;
        let message_id: String = row
            .get(1)
            .map_err(|e| StorageError::sql(format!("errors.message_id: {e}")))?;
        let timestamp: String = row
            .get(2)
            .map_err(|e| StorageError::sql(format!("errors.timestamp: {e}")))?;
        let text: Option<String> = row
            .get(3)
            .map_err(|e| StorageError::sql(format!("errors.text: {e}")))?;

        Ok(ErrorEntry {
            id,
            message_id,
            timestamp: parse_ts(&timestamp, "errors.timestamp")?,
            text: text.unwrap_or_default(),
        })
    }

    /// Load the remotes for a batch of records into their caches.
    async fn load_remotes(&self, records: &mut [Record]) -> Result<(), StorageError> {
        if records.is_empty() {
            return Ok(());
        }

        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT id, node_id, record_id, remote_id FROM remotes WHERE record_id IN ({placeholders})"
        );

        let mut rows = self.conn.query(&sql, params_from_iter(ids)).await?;
        let mut remotes: Vec<Remote> = Vec::new();
        while let Some(row) = rows.next().await? {
            remotes.push(Self::row_to_remote(&row)?);
        }

        for record in records.iter_mut() {
            record.remotes = remotes
                .iter()
                .filter(|r| r.record_id == record.id)
                .cloned()
                .collect();
        }
        Ok(())
    }
}

#[async_trait]
impl Store for SqliteStore {
    fn network_id(&self) -> &str {
        &self.network_id
    }

    async fn disconnect(&self) -> Result<(), StorageError> {
        // libsql connections close on drop; nothing to flush beyond WAL
        Ok(())
    }

    async fn drop_data(&self) -> Result<(), StorageError> {
        for suffix in ["", "-wal", "-shm"] {
            let mut file = self.path.clone().into_os_string();
            file.push(suffix);
            let file = PathBuf::from(file);
            if file.exists() {
                std::fs::remove_file(&file).map_err(|source| StorageError::PathSetup {
                    path: file.clone(),
                    source,
                })?;
            }
        }
        Ok(())
    }

    async fn begin(&self) -> Result<(), StorageError> {
        let mut depth = self.tx_depth.lock().await;
        if *depth == 0 {
            self.conn.execute("BEGIN IMMEDIATE", ()).await?;
        } else {
            self.conn
                .execute(&format!("SAVEPOINT sp_{depth}"), ())
                .await?;
        }
        *depth += 1;
        Ok(())
    }

    async fn commit(&self) -> Result<(), StorageError> {
        let mut depth = self.tx_depth.lock().await;
        match *depth {
            0 => return Err(StorageError::invalid_operation("commit without begin")),
            1 => {
                self.conn.execute("COMMIT", ()).await?;
            }
            n => {
                self.conn
                    .execute(&format!("RELEASE SAVEPOINT sp_{}", n - 1), ())
                    .await?;
            }
        }
        *depth -= 1;
        Ok(())
    }

    async fn rollback(&self) -> Result<(), StorageError> {
        let mut depth = self.tx_depth.lock().await;
        match *depth {
            0 => return Err(StorageError::invalid_operation("rollback without begin")),
            1 => {
                self.conn.execute("ROLLBACK", ()).await?;
            }
            n => {
                // roll back to the savepoint, then discard the frame
                self.conn
                    .execute(&format!("ROLLBACK TO SAVEPOINT sp_{}", n - 1), ())
                    .await?;
                self.conn
                    .execute(&format!("RELEASE SAVEPOINT sp_{}", n - 1), ())
                    .await?;
            }
        }
        *depth -= 1;
        Ok(())
    }

    async fn save_network(&self, network: &Network) -> Result<(), StorageError> {
        self.conn
            .execute(
                "INSERT INTO networks (id, name, fetch_before_send, schema)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                     name = excluded.name,
                     fetch_before_send = excluded.fetch_before_send,
                     schema = excluded.schema",
                (
                    self.network_id.clone(),
                    network.name.clone(),
                    network.fetch_before_send as i64,
                    json_to_text(&network.schema)?,
                ),
            )
            .await?;
        Ok(())
    }

    async fn save_node(&self, node: &Node) -> Result<(), StorageError> {
        self.conn
            .execute(
                "INSERT INTO nodes (id, name, \"create\", \"read\", \"update\", \"delete\")
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                     name = excluded.name,
                     \"create\" = excluded.\"create\",
                     \"read\" = excluded.\"read\",
                     \"update\" = excluded.\"update\",
                     \"delete\" = excluded.\"delete\"",
                (
                    node.id.clone(),
                    node.name.clone(),
                    node.create as i64,
                    node.read as i64,
                    node.update as i64,
                    node.delete as i64,
                ),
            )
            .await?;
        Ok(())
    }

    async fn save_message(&self, message: &Message) -> Result<(), StorageError> {
        self.conn
            .execute(
                "INSERT INTO messages
                     (id, parent_id, origin_id, destination_id, timestamp,
                      method, payload, remote_id, record_id, state)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(id) DO UPDATE SET
                     payload = excluded.payload,
                     remote_id = excluded.remote_id,
                     record_id = excluded.record_id,
                     state = excluded.state",
                (
                    message.id.clone(),
                    message.parent_id.clone(),
                    message.origin_id.clone(),
                    message.destination_id.clone(),
                    format_ts(message.timestamp),
                    message.method.as_str(),
                    opt_json_to_text(&message.payload)?,
                    message.remote_id.clone(),
                    message.record_id.clone(),
                    message.state.as_str(),
                ),
            )
            .await?;
        Ok(())
    }

    async fn save_change(&self, change: &Change) -> Result<(), StorageError> {
        self.conn
            .execute(
                "INSERT INTO changes (id, message_id, timestamp, state, note)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (
                    change.id.clone(),
                    change.message_id.clone(),
                    format_ts(change.timestamp),
                    change.state.as_str(),
                    change.note.clone(),
                ),
            )
            .await?;
        Ok(())
    }

    async fn save_error(&self, error: &ErrorEntry) -> Result<(), StorageError> {
        self.conn
            .execute(
                "INSERT INTO errors (id, message_id, timestamp, text)
                 VALUES (?1, ?2, ?3, ?4)",
                (
                    error.id.clone(),
                    error.message_id.clone(),
                    format_ts(error.timestamp),
                    error.text.clone(),
                ),
            )
            .await?;
        Ok(())
    }

    async fn save_record(&self, record: &Record) -> Result<(), StorageError> {
        self.conn
            .execute(
                "INSERT INTO records (id, last_updated, deleted, head)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                     last_updated = excluded.last_updated,
                     deleted = excluded.deleted,
                     head = excluded.head",
                (
                    record.id.clone(),
                    format_ts(record.last_updated),
                    record.deleted as i64,
                    opt_json_to_text(&record.head)?,
                ),
            )
            .await?;
        Ok(())
    }

    async fn save_remote(&self, remote: &Remote) -> Result<(), StorageError> {
        let result = self
            .conn
            .execute(
                "INSERT INTO remotes (id, node_id, record_id, remote_id)
                 VALUES (?1, ?2, ?3, ?4)",
                (
                    remote.id.clone(),
                    remote.node_id.clone(),
                    remote.record_id.clone(),
                    remote.remote_id.clone(),
                ),
            )
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("UNIQUE constraint failed") => {
                Err(StorageError::constraint(format!(
                    "remote binding conflict for node {}: {e}",
                    remote.node_id
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_network(&self) -> Result<Option<Network>, StorageError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, fetch_before_send, schema FROM networks LIMIT 1",
                (),
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_network(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_node(&self, node_id: &str) -> Result<Option<Node>, StorageError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, \"create\", \"read\", \"update\", \"delete\"
                 FROM nodes WHERE id = ?1",
                [node_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_node(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_nodes(&self) -> Result<Vec<Node>, StorageError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, \"create\", \"read\", \"update\", \"delete\"
                 FROM nodes ORDER BY id",
                (),
            )
            .await?;
        let mut nodes = Vec::new();
        while let Some(row) = rows.next().await? {
            nodes.push(Self::row_to_node(&row)?);
        }
        Ok(nodes)
    }

    async fn get_message(&self, message_id: &str) -> Result<Option<Message>, StorageError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, parent_id, origin_id, destination_id, timestamp,
                        method, payload, remote_id, record_id, state
                 FROM messages WHERE id = ?1",
                [message_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_message(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_next_message(
        &self,
        destination_id: &str,
        state: MessageState,
        _with_lock: bool,
    ) -> Result<Option<Message>, StorageError> {
        // no SELECT ... FOR UPDATE in SQLite; BEGIN IMMEDIATE already holds
        // the single writer lock for the open transaction
        let mut rows = self
            .conn
            .query(
                "SELECT id, parent_id, origin_id, destination_id, timestamp,
                        method, payload, remote_id, record_id, state
                 FROM messages
                 WHERE destination_id = ?1 AND state = ?2
                 ORDER BY timestamp ASC, seq ASC
                 LIMIT 1",
                (destination_id, state.as_str()),
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_message(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_message_count(
        &self,
        destination_id: &str,
        state: MessageState,
    ) -> Result<u64, StorageError> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM messages WHERE destination_id = ?1 AND state = ?2",
                (destination_id, state.as_str()),
            )
            .await?;
        let row = rows
            .next()
            .await?
            .ok_or_else(|| StorageError::sql("COUNT(*) returned no rows"))?;
        let count: i64 = row
            .get(0)
            .map_err(|e| StorageError::sql(format!("message count: {e}")))?;
        Ok(count as u64)
    }

    async fn get_record(&self, record_id: &str) -> Result<Option<Record>, StorageError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, last_updated, deleted, head FROM records WHERE id = ?1",
                [record_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => {
                let mut records = vec![Self::row_to_record(&row)?];
                self.load_remotes(&mut records).await?;
                Ok(records.pop())
            }
            None => Ok(None),
        }
    }

    async fn get_records(&self, offset: u64, limit: u64) -> Result<Vec<Record>, StorageError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, last_updated, deleted, head
                 FROM records
                 WHERE deleted = 0
                 ORDER BY id ASC
                 LIMIT ?1 OFFSET ?2",
                (limit as i64, offset as i64),
            )
            .await?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(Self::row_to_record(&row)?);
        }
        self.load_remotes(&mut records).await?;
        Ok(records)
    }

    async fn get_remote_by_remote_id(
        &self,
        node_id: &str,
        remote_id: &str,
    ) -> Result<Option<Remote>, StorageError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, node_id, record_id, remote_id
                 FROM remotes WHERE node_id = ?1 AND remote_id = ?2",
                (node_id, remote_id),
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_remote(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_remote_by_record_id(
        &self,
        node_id: &str,
        record_id: &str,
    ) -> Result<Option<Remote>, StorageError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, node_id, record_id, remote_id
                 FROM remotes WHERE node_id = ?1 AND record_id = ?2",
                (node_id, record_id),
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_remote(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_changes(&self, message_id: &str) -> Result<Vec<Change>, StorageError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, message_id, timestamp, state, note
                 FROM changes WHERE message_id = ?1 ORDER BY timestamp ASC",
                [message_id],
            )
            .await?;
        let mut changes = Vec::new();
        while let Some(row) = rows.next().await? {
            changes.push(Self::row_to_change(&row)?);
        }
        Ok(changes)
    }

    async fn get_errors(&self, message_id: &str) -> Result<Vec<ErrorEntry>, StorageError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, message_id, timestamp, text
                 FROM errors WHERE message_id = ?1 ORDER BY timestamp ASC",
                [message_id],
            )
            .await?;
        let mut errors = Vec::new();
        while let Some(row) = rows.next().await? {
            errors.push(Self::row_to_error(&row)?);
        }
        Ok(errors)
    }

    async fn update_messages(
        &self,
        node_id: &str,
        record_id: &str,
        remote_id: &str,
    ) -> Result<u64, StorageError> {
        let touched = self
            .conn
            .execute(
                "UPDATE messages SET remote_id = ?1
                 WHERE destination_id = ?2 AND record_id = ?3 AND state = 'pending'",
                (remote_id, node_id, record_id),
            )
            .await?;
        Ok(touched)
    }
}
