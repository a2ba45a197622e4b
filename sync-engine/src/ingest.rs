//! Ingestion Gate.
//!
//! Commits received records into the local store, deduplicating by id.
//! Batches are ingested best effort: a record that fails is logged and
//! counted, and the rest of the batch still goes in.

use crate::error::StoreError;
use crate::metrics::SyncMetrics;
use crate::store::RecordStore;
use relief_sync_types::Record;

/// Result of ingesting one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The record was new and is now stored.
    Inserted,
    /// A record with the same id was already stored.
    Duplicate,
}

/// Totals for one ingested batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Records newly stored.
    pub inserted: usize,
    /// Records already held.
    pub duplicates: usize,
    /// Records the store failed to write.
    pub failed: usize,
}

/// Insert `record` unless its id is already stored.
///
/// Idempotent: a second call with the same record is a `Duplicate`.
pub async fn ingest(store: &dyn RecordStore, record: &Record) -> Result<IngestOutcome, StoreError> {
    if store.insert_if_absent(record).await? {
        Ok(IngestOutcome::Inserted)
    } else {
        Ok(IngestOutcome::Duplicate)
    }
}

/// Ingest every record in `records`, continuing past failures.
pub async fn ingest_batch(
    store: &dyn RecordStore,
    records: &[Record],
    metrics: &SyncMetrics,
) -> IngestReport {
    let mut report = IngestReport::default();

    for record in records {
        match ingest(store, record).await {
            Ok(IngestOutcome::Inserted) => {
                report.inserted += 1;
                SyncMetrics::incr(&metrics.records_inserted);
            }
            Ok(IngestOutcome::Duplicate) => {
                report.duplicates += 1;
                SyncMetrics::incr(&metrics.records_duplicate);
            }
            Err(e) => {
                report.failed += 1;
                SyncMetrics::incr(&metrics.store_errors);
                tracing::warn!(
                    record = %record.id,
                    origin = %record.origin,
                    error = %e,
                    "failed to ingest record"
                );
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use relief_sync_types::{OriginId, RecordId, Timestamp};

    fn record(origin: &str, ts: u64) -> Record {
        Record::with_timestamp(
            OriginId::from(origin),
            Timestamp::from_millis(ts),
            0.0,
            0.0,
            "1.0",
            "full",
        )
    }

    /// Refuses to store records from one origin.
    struct PickyStore {
        inner: MemoryStore,
        refuse: OriginId,
    }

    #[async_trait]
    impl RecordStore for PickyStore {
        async fn get(&self, id: &RecordId) -> Result<Option<Record>, StoreError> {
            self.inner.get(id).await
        }

        async fn insert_if_absent(&self, record: &Record) -> Result<bool, StoreError> {
            if record.origin == self.refuse {
                return Err(StoreError::Unavailable("disk full".into()));
            }
            self.inner.insert_if_absent(record).await
        }

        async fn scan_all(&self) -> Result<Vec<Record>, StoreError> {
            self.inner.scan_all().await
        }

        async fn scan_origin(&self, origin: &OriginId) -> Result<Vec<Record>, StoreError> {
            self.inner.scan_origin(origin).await
        }

        async fn count(&self) -> Result<u64, StoreError> {
            self.inner.count().await
        }
    }

    #[tokio::test]
    async fn ingest_is_idempotent() {
        let store = MemoryStore::new();
        let r = record("a", 1);

        assert_eq!(ingest(&store, &r).await.unwrap(), IngestOutcome::Inserted);
        let after_first = store.scan_all().await.unwrap();

        assert_eq!(ingest(&store, &r).await.unwrap(), IngestOutcome::Duplicate);
        assert_eq!(store.scan_all().await.unwrap(), after_first);
    }

    #[tokio::test]
    async fn batch_counts_inserted_and_duplicates() {
        let store = MemoryStore::new();
        let metrics = SyncMetrics::new();
        let held = record("a", 1);
        store.insert_if_absent(&held).await.unwrap();

        let batch = vec![held, record("a", 2), record("b", 3)];
        let report = ingest_batch(&store, &batch, &metrics).await;

        assert_eq!(
            report,
            IngestReport {
                inserted: 2,
                duplicates: 1,
                failed: 0
            }
        );
        assert_eq!(metrics.snapshot().records_inserted, 2);
        assert_eq!(metrics.snapshot().records_duplicate, 1);
    }

    #[tokio::test]
    async fn one_failing_record_does_not_abort_batch() {
        let store = PickyStore {
            inner: MemoryStore::new(),
            refuse: OriginId::from("bad"),
        };
        let metrics = SyncMetrics::new();

        let batch = vec![record("ok", 1), record("bad", 2), record("ok", 3)];
        let report = ingest_batch(&store, &batch, &metrics).await;

        assert_eq!(report.inserted, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(store.count().await.unwrap(), 2);
        assert_eq!(metrics.snapshot().store_errors, 1);
    }
}
