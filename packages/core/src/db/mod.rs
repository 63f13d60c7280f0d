//! Storage Layer
//!
//! The pipeline is defined entirely against the [`Store`] trait so storage
//! backends are interchangeable:
//!
//! - [`SqliteStore`] - durable libsql database, one file per network
//! - [`MemoryStore`] - process-local state, shared across handles by
//!   network id (used by tests and embedded deployments)
//!
//! Each store handle is one connection to one network's database. Handles
//! are opened through [`open_store`], keyed by network id; opening an
//! unprovisioned network without `create` fails with
//! [`StorageError::DatabaseNotFound`].

use std::path::PathBuf;
use std::sync::Arc;

mod error;
mod memory_store;
mod sqlite_store;
mod store;

pub use error::{EntityKind, StorageError};
pub use memory_store::MemoryStore;
pub use sqlite_store::SqliteStore;
pub use store::Store;

/// Which storage backend a deployment runs on.
#[derive(Debug, Clone)]
pub enum Backend {
    /// Process-local, non-durable storage.
    Memory,
    /// libsql database files under `data_dir`.
    Sqlite { data_dir: PathBuf },
}

/// Storage configuration shared by every request and worker.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: Backend,
}

impl StoreConfig {
    /// In-memory configuration.
    pub fn memory() -> Self {
        Self {
            backend: Backend::Memory,
        }
    }

    /// SQLite configuration rooted at `data_dir`.
    pub fn sqlite(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend: Backend::Sqlite {
                data_dir: data_dir.into(),
            },
        }
    }
}

/// Open a store handle for one network.
///
/// Background workers call this again rather than sharing a handle, so each
/// task owns its own connection and transaction stack.
pub async fn open_store(
    config: &StoreConfig,
    network_id: &str,
    create: bool,
) -> Result<Arc<dyn Store>, StorageError> {
    match &config.backend {
        Backend::Memory => Ok(Arc::new(MemoryStore::open(network_id, create)?)),
        Backend::Sqlite { data_dir } => Ok(Arc::new(
            SqliteStore::open(data_dir, network_id, create).await?,
        )),
    }
}
