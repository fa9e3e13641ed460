use std::collections::BTreeMap;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tonic::async_trait;
use tracing::trace;

use super::DataStore;
use super::FieldMap;
use super::KeyChange;
use super::StoreResult;
use super::StoreWriter;

/// In-memory data store
///
/// One ordered map per logical database, each behind its own lock so a writer
/// on `COUNTERS_DB` never blocks readers of `CONFIG_DB`.
#[derive(Debug)]
pub struct MemoryStore {
    databases: DashMap<String, RwLock<BTreeMap<String, FieldMap>>>,
    change_tx: broadcast::Sender<KeyChange>,
}

impl MemoryStore {
    pub fn new(change_feed_capacity: usize) -> Self {
        let (change_tx, _) = broadcast::channel(change_feed_capacity.max(1));
        Self {
            databases: DashMap::new(),
            change_tx,
        }
    }

    fn publish(
        &self,
        change: KeyChange,
    ) {
        trace!(db = %change.db, key = %change.key, kind = ?change.kind, "publish change");
        // No receivers is fine
        let _ = self.change_tx.send(change);
    }

    /// Number of keys currently stored in `db`
    pub fn len(
        &self,
        db: &str,
    ) -> usize {
        match self.databases.get(db) {
            Some(database) => {
                let len = database.read().len();
                len
            }
            None => 0,
        }
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn get_entry(
        &self,
        db: &str,
        key: &str,
    ) -> StoreResult<Option<FieldMap>> {
        let Some(database) = self.databases.get(db) else {
            return Ok(None);
        };
        let entry = database.read().get(key).cloned();
        Ok(entry)
    }

    async fn get_field(
        &self,
        db: &str,
        key: &str,
        field: &str,
    ) -> StoreResult<Option<String>> {
        let Some(database) = self.databases.get(db) else {
            return Ok(None);
        };
        let value = database.read().get(key).and_then(|fields| fields.get(field).cloned());
        Ok(value)
    }

    async fn scan_prefix(
        &self,
        db: &str,
        prefix: &str,
    ) -> StoreResult<Vec<(String, FieldMap)>> {
        let Some(database) = self.databases.get(db) else {
            return Ok(Vec::new());
        };
        let guard = database.read();
        let entries = guard
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(entries)
    }

    fn changes(&self) -> broadcast::Receiver<KeyChange> {
        self.change_tx.subscribe()
    }
}

#[async_trait]
impl StoreWriter for MemoryStore {
    async fn set_entry(
        &self,
        db: &str,
        key: &str,
        fields: FieldMap,
    ) -> StoreResult<()> {
        self.databases
            .entry(db.to_string())
            .or_default()
            .write()
            .insert(key.to_string(), fields);
        self.publish(KeyChange::set(db, key));
        Ok(())
    }

    async fn set_field(
        &self,
        db: &str,
        key: &str,
        field: &str,
        value: &str,
    ) -> StoreResult<()> {
        self.databases
            .entry(db.to_string())
            .or_default()
            .write()
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        self.publish(KeyChange::set(db, key));
        Ok(())
    }

    async fn delete_entry(
        &self,
        db: &str,
        key: &str,
    ) -> StoreResult<bool> {
        let removed = match self.databases.get(db) {
            Some(database) => {
                let removed = database.write().remove(key).is_some();
                removed
            }
            None => false,
        };
        if removed {
            self.publish(KeyChange::delete(db, key));
        }
        Ok(removed)
    }
}
