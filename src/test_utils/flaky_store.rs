use std::collections::HashSet;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tonic::async_trait;

use crate::DataStore;
use crate::FieldMap;
use crate::KeyChange;
use crate::MemoryStore;
use crate::StoreError;
use crate::StoreResult;

/// Wraps a [`MemoryStore`] and fails reads of selected keys with
/// `StoreError::Unavailable` while the key is marked broken.
pub struct FlakyStore {
    inner: Arc<MemoryStore>,
    broken: Mutex<HashSet<String>>,
    failed_reads: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            broken: Mutex::new(HashSet::new()),
            failed_reads: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &Arc<MemoryStore> {
        &self.inner
    }

    pub fn break_key(
        &self,
        key: &str,
    ) {
        self.broken.lock().insert(key.to_string());
    }

    pub fn heal_key(
        &self,
        key: &str,
    ) {
        self.broken.lock().remove(key);
    }

    pub fn failed_reads(&self) -> usize {
        self.failed_reads.load(Ordering::SeqCst)
    }

    fn check(
        &self,
        key: &str,
    ) -> StoreResult<()> {
        if self.broken.lock().contains(key) {
            self.failed_reads.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::Unavailable(format!("{} is broken", key)));
        }
        Ok(())
    }
}

#[async_trait]
impl DataStore for FlakyStore {
    async fn get_entry(
        &self,
        db: &str,
        key: &str,
    ) -> StoreResult<Option<FieldMap>> {
        self.check(key)?;
        self.inner.get_entry(db, key).await
    }

    async fn get_field(
        &self,
        db: &str,
        key: &str,
        field: &str,
    ) -> StoreResult<Option<String>> {
        self.check(key)?;
        self.inner.get_field(db, key, field).await
    }

    async fn scan_prefix(
        &self,
        db: &str,
        prefix: &str,
    ) -> StoreResult<Vec<(String, FieldMap)>> {
        self.check(prefix)?;
        self.inner.scan_prefix(db, prefix).await
    }

    fn changes(&self) -> broadcast::Receiver<KeyChange> {
        self.inner.changes()
    }
}
