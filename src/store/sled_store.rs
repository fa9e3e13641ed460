use std::path::Path;

use sled::Tree;
use tokio::sync::broadcast;
use tonic::async_trait;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::DataStore;
use super::FieldMap;
use super::KeyChange;
use super::StoreResult;
use super::StoreWriter;
use crate::StoreError;

/// Persistent data store backed by sled
///
/// Each logical database maps to one sled tree; every key holds a
/// bincode encoded [`FieldMap`]. Data survives restarts of the service.
pub struct SledStore {
    db: sled::Db,
    change_tx: broadcast::Sender<KeyChange>,
}

impl std::fmt::Debug for SledStore {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SledStore").field("trees", &self.db.tree_names().len()).finish()
    }
}

impl SledStore {
    pub fn open(
        path: impl AsRef<Path> + std::fmt::Debug,
        change_feed_capacity: usize,
    ) -> StoreResult<Self> {
        debug!("open sled store at: {:?}", &path);

        let db = sled::Config::default()
            .path(path.as_ref())
            .cache_capacity(64 * 1024 * 1024) //64MB
            .flush_every_ms(Some(100))
            .use_compression(true)
            .compression_factor(1)
            .open()
            .map_err(|e| {
                warn!("Try to open DB at this location: {:?} and failed: {:?}", path, e);
                StoreError::Backend(e)
            })?;

        let (change_tx, _) = broadcast::channel(change_feed_capacity.max(1));
        Ok(Self { db, change_tx })
    }

    fn tree(
        &self,
        name: &str,
    ) -> StoreResult<Tree> {
        Ok(self.db.open_tree(name)?)
    }

    fn decode(bytes: &[u8]) -> StoreResult<FieldMap> {
        Ok(bincode::deserialize(bytes)?)
    }

    fn encode(fields: &FieldMap) -> StoreResult<Vec<u8>> {
        Ok(bincode::serialize(fields)?)
    }

    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

#[async_trait]
impl DataStore for SledStore {
    async fn get_entry(
        &self,
        db: &str,
        key: &str,
    ) -> StoreResult<Option<FieldMap>> {
        match self.tree(db)?.get(key)? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn get_field(
        &self,
        db: &str,
        key: &str,
        field: &str,
    ) -> StoreResult<Option<String>> {
        let entry = self.get_entry(db, key).await?;
        Ok(entry.and_then(|mut fields| fields.remove(field)))
    }

    async fn scan_prefix(
        &self,
        db: &str,
        prefix: &str,
    ) -> StoreResult<Vec<(String, FieldMap)>> {
        let mut entries = Vec::new();
        for item in self.tree(db)?.scan_prefix(prefix) {
            let (key, value) = item?;
            let key = String::from_utf8_lossy(&key).into_owned();
            entries.push((key, Self::decode(&value)?));
        }
        Ok(entries)
    }

    fn changes(&self) -> broadcast::Receiver<KeyChange> {
        self.change_tx.subscribe()
    }
}

#[async_trait]
impl StoreWriter for SledStore {
    async fn set_entry(
        &self,
        db: &str,
        key: &str,
        fields: FieldMap,
    ) -> StoreResult<()> {
        self.tree(db)?.insert(key, Self::encode(&fields)?)?;
        trace!(db, key, "sled set_entry");
        let _ = self.change_tx.send(KeyChange::set(db, key));
        Ok(())
    }

    async fn set_field(
        &self,
        db: &str,
        key: &str,
        field: &str,
        value: &str,
    ) -> StoreResult<()> {
        let tree = self.tree(db)?;
        // the closure may run once per CAS attempt; only the last attempt counts
        let mut failure = None;
        tree.fetch_and_update(key, |old| {
            failure = None;
            let mut fields = match old.map(Self::decode).transpose() {
                Ok(fields) => fields.unwrap_or_default(),
                Err(e) => {
                    failure = Some(e);
                    return old.map(|b| b.to_vec());
                }
            };
            fields.insert(field.to_string(), value.to_string());
            match Self::encode(&fields) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    failure = Some(e);
                    old.map(|b| b.to_vec())
                }
            }
        })?;
        if let Some(e) = failure {
            warn!(db, key, field, "sled set_field left the entry unchanged: {}", e);
            return Err(e);
        }
        let _ = self.change_tx.send(KeyChange::set(db, key));
        Ok(())
    }

    async fn delete_entry(
        &self,
        db: &str,
        key: &str,
    ) -> StoreResult<bool> {
        let removed = self.tree(db)?.remove(key)?.is_some();
        if removed {
            let _ = self.change_tx.send(KeyChange::delete(db, key));
        }
        Ok(removed)
    }
}
