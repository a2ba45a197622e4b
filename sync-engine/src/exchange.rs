//! Store-backed halves of the summary and delta exchange.
//!
//! Both protocol roles use these: the central session runner and the
//! peripheral handler compute summaries, plan outbound deltas and ingest
//! inbound batches the same way, which is what makes one central-initiated
//! session converge both sides.

use crate::error::{EngineError, StoreError};
use crate::ingest::{ingest_batch, IngestReport};
use crate::metrics::SyncMetrics;
use crate::store::RecordStore;
use relief_sync_core::{build_summary, missing_for_remote, plan_delta};
use relief_sync_types::{Summary, SyncError, WireCodec};

/// Encoded outbound delta for one peer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundDelta {
    /// Encoded batch. Empty when there is nothing to send.
    pub payload: Vec<u8>,
    /// Records in `payload`.
    pub sent: usize,
    /// Records held back for a later session.
    pub deferred: usize,
    /// Records too large to ever fit a payload.
    pub unsendable: usize,
}

/// Inbound batch totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InboundReport {
    /// Records that decoded.
    pub decoded: usize,
    /// Record frames that did not decode.
    pub rejected: usize,
    /// Store outcome for the decoded records.
    pub ingest: IngestReport,
}

/// Summary of everything in `store`.
pub async fn local_summary(store: &dyn RecordStore) -> Result<Summary, StoreError> {
    let records = store.scan_all().await?;
    Ok(build_summary(&records))
}

/// Plan and encode what a peer described by `remote` is missing.
pub async fn outbound_delta(
    store: &dyn RecordStore,
    remote: &Summary,
    codec: &WireCodec,
    metrics: &SyncMetrics,
) -> Result<OutboundDelta, EngineError> {
    let records = store.scan_all().await?;
    let missing = missing_for_remote(&records, remote);
    if missing.is_empty() {
        return Ok(OutboundDelta::default());
    }

    let plan = plan_delta(missing, codec)?;
    if !plan.deferred.is_empty() {
        SyncMetrics::add(&metrics.records_deferred, plan.deferred.len());
        tracing::debug!(
            deferred = plan.deferred.len(),
            "delta exceeds payload limit; holding records for a later session"
        );
    }
    for record in &plan.unsendable {
        tracing::warn!(
            record = %record.id,
            origin = %record.origin,
            "record cannot fit in any payload"
        );
    }

    let payload = if plan.batch.is_empty() {
        Vec::new()
    } else {
        codec.encode_batch(&plan.batch)?
    };

    Ok(OutboundDelta {
        payload,
        sent: plan.batch.len(),
        deferred: plan.deferred.len(),
        unsendable: plan.unsendable.len(),
    })
}

/// Decode `payload` best effort and ingest every record that decoded.
///
/// Header errors fail the whole payload. Bad record frames and truncated
/// framing are logged, and whatever decoded before them is still ingested.
pub async fn ingest_payload(
    store: &dyn RecordStore,
    codec: &WireCodec,
    payload: &[u8],
    metrics: &SyncMetrics,
) -> Result<InboundReport, SyncError> {
    let decoded = codec.decode_batch_lenient(payload)?;

    if decoded.rejected > 0 {
        SyncMetrics::add(&metrics.records_rejected, decoded.rejected);
        tracing::warn!(rejected = decoded.rejected, "skipped undecodable records in batch");
    }
    if let Some(defect) = &decoded.defect {
        tracing::warn!(error = %defect, decoded = decoded.records.len(), "batch framing damaged");
    }

    SyncMetrics::add(&metrics.records_received, decoded.records.len());
    let ingest = ingest_batch(store, &decoded.records, metrics).await;

    Ok(InboundReport {
        decoded: decoded.records.len(),
        rejected: decoded.rejected,
        ingest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use relief_sync_types::{OriginId, Record, Timestamp};

    fn record(origin: &str, ts: u64) -> Record {
        Record::with_timestamp(
            OriginId::from(origin),
            Timestamp::from_millis(ts),
            12.5,
            -4.25,
            "0.3",
            "unplugged",
        )
    }

    async fn store_with(records: &[Record]) -> MemoryStore {
        let store = MemoryStore::new();
        for r in records {
            store.insert_if_absent(r).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn summary_of_store() {
        let store = store_with(&[record("A", 1), record("A", 3), record("B", 2)]).await;
        let summary = local_summary(&store).await.unwrap();

        assert_eq!(
            summary.latest(&OriginId::from("A")),
            Some(Timestamp::from_millis(3))
        );
        assert_eq!(
            summary.latest(&OriginId::from("B")),
            Some(Timestamp::from_millis(2))
        );
    }

    #[tokio::test]
    async fn nothing_missing_gives_empty_payload() {
        let store = store_with(&[record("C", 7)]).await;
        let remote: Summary = [(OriginId::from("C"), Timestamp::from_millis(7))]
            .into_iter()
            .collect();

        let delta = outbound_delta(&store, &remote, &WireCodec::default(), &SyncMetrics::new())
            .await
            .unwrap();
        assert!(delta.payload.is_empty());
        assert_eq!(delta.sent, 0);
    }

    #[tokio::test]
    async fn outbound_then_inbound_transfers_missing_records() {
        let codec = WireCodec::default();
        let metrics = SyncMetrics::new();
        let source = store_with(&[record("A", 100), record("B", 5)]).await;
        let target = store_with(&[record("B", 9)]).await;

        let remote = local_summary(&target).await.unwrap();
        let delta = outbound_delta(&source, &remote, &codec, &metrics)
            .await
            .unwrap();
        assert_eq!(delta.sent, 1);

        let report = ingest_payload(&target, &codec, &delta.payload, &metrics)
            .await
            .unwrap();
        assert_eq!(report.ingest.inserted, 1);
        assert_eq!(target.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn oversized_delta_is_deferred() {
        let codec = WireCodec::new(200);
        let metrics = SyncMetrics::new();
        let records: Vec<_> = (0..20).map(|t| record("A", t)).collect();
        let store = store_with(&records).await;

        let delta = outbound_delta(&store, &Summary::new(), &codec, &metrics)
            .await
            .unwrap();

        assert!(delta.sent > 0);
        assert_eq!(delta.sent + delta.deferred, 20);
        assert!(delta.payload.len() <= 200);
        assert_eq!(metrics.snapshot().records_deferred, delta.deferred as u64);
    }

    #[tokio::test]
    async fn empty_payload_ingests_nothing() {
        let store = MemoryStore::new();
        let report = ingest_payload(&store, &WireCodec::default(), &[], &SyncMetrics::new())
            .await
            .unwrap();
        assert_eq!(report, InboundReport::default());
    }

    #[tokio::test]
    async fn truncated_payload_keeps_decodable_prefix() {
        let codec = WireCodec::default();
        let metrics = SyncMetrics::new();
        let bytes = codec
            .encode_batch(&[record("A", 1), record("A", 2)])
            .unwrap();
        let cut = &bytes[..bytes.len() - 4];

        let store = MemoryStore::new();
        let report = ingest_payload(&store, &codec, cut, &metrics).await.unwrap();

        assert_eq!(report.decoded, 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn bad_header_is_a_protocol_error() {
        let store = MemoryStore::new();
        let result = ingest_payload(
            &store,
            &WireCodec::default(),
            &[9, 0, 1],
            &SyncMetrics::new(),
        )
        .await;
        assert!(matches!(result, Err(SyncError::UnsupportedVersion(9))));
    }
}
