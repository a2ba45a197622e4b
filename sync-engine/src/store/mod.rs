//! Local record store.
//!
//! An append-mostly set of records keyed by id. The write path is
//! [`RecordStore::insert_if_absent`], which is atomic: concurrent readers
//! see either the whole record or nothing.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::StoreError;
use async_trait::async_trait;
use relief_sync_types::{OriginId, Record, RecordId};

/// Trait for record store backends.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Look up a record by id.
    async fn get(&self, id: &RecordId) -> Result<Option<Record>, StoreError>;

    /// Insert `record` unless a record with the same id exists.
    ///
    /// Returns `true` if the record was inserted. An existing record is
    /// never modified.
    async fn insert_if_absent(&self, record: &Record) -> Result<bool, StoreError>;

    /// Every record held.
    async fn scan_all(&self) -> Result<Vec<Record>, StoreError>;

    /// Every record produced by `origin`.
    async fn scan_origin(&self, origin: &OriginId) -> Result<Vec<Record>, StoreError>;

    /// Number of records held.
    async fn count(&self) -> Result<u64, StoreError>;
}
