//! Data Store Adapter
//!
//! Read access to the logical databases (hash-of-fields per key, SONiC style)
//! plus a change broadcast used by ON_CHANGE subscriptions. The adapter is shared
//! by every session; implementations must allow concurrent reads while writers
//! keep modifying the underlying data.

mod catalog;
mod memory;
mod reader;
mod retry;
mod seed;
mod sled_store;
mod version;

pub use catalog::*;
pub use memory::*;
pub use reader::*;
pub(crate) use retry::*;
pub use seed::*;
pub use sled_store::*;
pub use version::*;

#[cfg(test)]
mod memory_test;

use std::collections::BTreeMap;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;
use tokio::sync::broadcast;
use tonic::async_trait;
use tracing::info;

use crate::StoreBackend;
use crate::StoreConfig;
use crate::StoreError;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Field/value pairs stored under one key
pub type FieldMap = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Set,
    Delete,
}

/// Notification published after every write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyChange {
    pub db: String,
    pub key: String,
    pub kind: ChangeKind,
}

impl KeyChange {
    pub fn set(
        db: &str,
        key: &str,
    ) -> Self {
        Self {
            db: db.to_string(),
            key: key.to_string(),
            kind: ChangeKind::Set,
        }
    }

    pub fn delete(
        db: &str,
        key: &str,
    ) -> Self {
        Self {
            db: db.to_string(),
            key: key.to_string(),
            kind: ChangeKind::Delete,
        }
    }
}

/// Read side of the data store, shared read-only by all sessions
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DataStore: Send + Sync + 'static {
    /// All fields of one key, `None` if the key does not exist
    async fn get_entry(
        &self,
        db: &str,
        key: &str,
    ) -> StoreResult<Option<FieldMap>>;

    /// A single field of one key
    async fn get_field(
        &self,
        db: &str,
        key: &str,
        field: &str,
    ) -> StoreResult<Option<String>>;

    /// Every key starting with `prefix`, ordered by key
    async fn scan_prefix(
        &self,
        db: &str,
        prefix: &str,
    ) -> StoreResult<Vec<(String, FieldMap)>>;

    /// Subscribes to the change broadcast
    fn changes(&self) -> broadcast::Receiver<KeyChange>;
}

/// Write side, used for seeding, the binary's own bookkeeping and tests
#[async_trait]
pub trait StoreWriter: Send + Sync + 'static {
    async fn set_entry(
        &self,
        db: &str,
        key: &str,
        fields: FieldMap,
    ) -> StoreResult<()>;

    async fn set_field(
        &self,
        db: &str,
        key: &str,
        field: &str,
        value: &str,
    ) -> StoreResult<()>;

    async fn delete_entry(
        &self,
        db: &str,
        key: &str,
    ) -> StoreResult<bool>;
}

/// Both sides of one opened backend
#[derive(Clone)]
pub struct StoreHandle {
    pub reader: Arc<dyn DataStore>,
    pub writer: Arc<dyn StoreWriter>,
}

impl StoreHandle {
    pub fn from_backend<S>(backend: Arc<S>) -> Self
    where
        S: DataStore + StoreWriter,
    {
        Self {
            reader: backend.clone(),
            writer: backend,
        }
    }
}

/// Opens the configured backend and applies the seed file, if any
pub async fn open_store(config: &StoreConfig) -> StoreResult<StoreHandle> {
    let handle = match config.backend {
        StoreBackend::Memory => {
            info!("Opening in-memory data store");
            StoreHandle::from_backend(Arc::new(MemoryStore::new(config.change_feed_capacity)))
        }
        StoreBackend::Sled => {
            info!(path = ?config.sled_path, "Opening sled data store");
            StoreHandle::from_backend(Arc::new(SledStore::open(
                &config.sled_path,
                config.change_feed_capacity,
            )?))
        }
    };

    if let Some(seed_file) = &config.seed_file {
        let loaded = load_seed_file(seed_file, handle.writer.as_ref()).await?;
        info!(file = ?seed_file, keys = loaded, "Seeded data store");
    }

    Ok(handle)
}
