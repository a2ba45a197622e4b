//! In-memory record store.

use super::RecordStore;
use crate::error::StoreError;
use async_trait::async_trait;
use relief_sync_types::{OriginId, Record, RecordId};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Record store backed by a `HashMap`.
///
/// Each insert happens under the write lock, so readers never observe a
/// partially written record.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<RecordId, Record>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<RecordId, Record>>, StoreError> {
        self.records
            .read()
            .map_err(|_| StoreError::Unavailable("record lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<RecordId, Record>>, StoreError> {
        self.records
            .write()
            .map_err(|_| StoreError::Unavailable("record lock poisoned".into()))
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get(&self, id: &RecordId) -> Result<Option<Record>, StoreError> {
        Ok(self.read()?.get(id).cloned())
    }

    async fn insert_if_absent(&self, record: &Record) -> Result<bool, StoreError> {
        let mut records = self.write()?;
        if records.contains_key(&record.id) {
            return Ok(false);
        }
        records.insert(record.id, record.clone());
        Ok(true)
    }

    async fn scan_all(&self) -> Result<Vec<Record>, StoreError> {
        Ok(self.read()?.values().cloned().collect())
    }

    async fn scan_origin(&self, origin: &OriginId) -> Result<Vec<Record>, StoreError> {
        Ok(self
            .read()?
            .values()
            .filter(|r| &r.origin == origin)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.read()?.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relief_sync_types::Timestamp;

    fn record(origin: &str, ts: u64) -> Record {
        Record::with_timestamp(
            OriginId::from(origin),
            Timestamp::from_millis(ts),
            1.0,
            2.0,
            "0.7",
            "unplugged",
        )
    }

    #[tokio::test]
    async fn insert_then_get() {
        let store = MemoryStore::new();
        let r = record("a", 1);

        assert!(store.insert_if_absent(&r).await.unwrap());
        assert_eq!(store.get(&r.id).await.unwrap(), Some(r));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn second_insert_is_a_no_op() {
        let store = MemoryStore::new();
        let r = record("a", 1);
        store.insert_if_absent(&r).await.unwrap();

        let mut altered = r.clone();
        altered.battery_level = "0.1".into();
        assert!(!store.insert_if_absent(&altered).await.unwrap());

        assert_eq!(store.get(&r.id).await.unwrap(), Some(r));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn scan_by_origin() {
        let store = MemoryStore::new();
        for r in [record("a", 1), record("b", 2), record("a", 3)] {
            store.insert_if_absent(&r).await.unwrap();
        }

        assert_eq!(store.scan_all().await.unwrap().len(), 3);
        let a = store.scan_origin(&OriginId::from("a")).await.unwrap();
        assert_eq!(a.len(), 2);
        assert!(a.iter().all(|r| r.origin.as_str() == "a"));
    }

    #[tokio::test]
    async fn missing_id_is_none() {
        let store = MemoryStore::new();
        assert_eq!(store.get(&RecordId::new()).await.unwrap(), None);
    }
}
