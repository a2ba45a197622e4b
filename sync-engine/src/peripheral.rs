//! Peripheral (GATT server) side of the exchange.
//!
//! Answers a central's session: each summary page written is answered with
//! the local page of the same number, a data write is ingested, and a data
//! read returns what the central's summary says it is missing. The
//! central's pages are merged per connection, restarting at page 0, and
//! kept until it disconnects.

use crate::exchange::{ingest_payload, local_summary, outbound_delta};
use crate::metrics::SyncMetrics;
use crate::radio::{GattServer, RadioError};
use crate::store::RecordStore;
use async_trait::async_trait;
use dashmap::DashMap;
use relief_sync_types::{Characteristic, PeerId, Summary, SummaryPage, WireCodec};
use std::sync::Arc;

/// GATT server backed by the local record store.
pub struct PeripheralHandler {
    store: Arc<dyn RecordStore>,
    codec: WireCodec,
    metrics: Arc<SyncMetrics>,
    /// Summary each connected central sent us.
    centrals: DashMap<PeerId, Summary>,
}

impl std::fmt::Debug for PeripheralHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeripheralHandler")
            .field("codec", &self.codec)
            .field("centrals", &self.centrals.len())
            .finish_non_exhaustive()
    }
}

impl PeripheralHandler {
    /// Create a handler serving `store`.
    pub fn new(store: Arc<dyn RecordStore>, codec: WireCodec, metrics: Arc<SyncMetrics>) -> Self {
        Self {
            store,
            codec,
            metrics,
            centrals: DashMap::new(),
        }
    }

    /// Number of centrals with a session in progress.
    pub fn active_centrals(&self) -> usize {
        self.centrals.len()
    }

    /// Page `index` of the local summary, or an empty page past its end.
    async fn summary_page(&self, index: u16) -> Result<Vec<u8>, RadioError> {
        let summary = local_summary(self.store.as_ref()).await.map_err(gatt)?;
        let pages = self.codec.paginate_summary(&summary).map_err(gatt)?;
        let page = match pages.get(usize::from(index)) {
            Some(page) => page.clone(),
            None => SummaryPage::empty(index, pages.first().map_or(1, |p| p.pages)),
        };
        self.codec.encode_summary_page(&page).map_err(gatt)
    }
}

#[async_trait]
impl GattServer for PeripheralHandler {
    async fn handle_write(
        &self,
        central: &PeerId,
        characteristic: Characteristic,
        value: &[u8],
    ) -> Result<Vec<u8>, RadioError> {
        match characteristic {
            Characteristic::Summary => {
                let page = self.codec.decode_summary_page(value).map_err(gatt)?;
                {
                    let mut remote = self.centrals.entry(central.clone()).or_default();
                    if page.index == 0 {
                        *remote = Summary::new();
                    }
                    remote.merge(&page.entries);
                    tracing::debug!(
                        %central,
                        page = page.index,
                        pages = page.pages,
                        origins = remote.len(),
                        "central summary page received"
                    );
                }
                self.summary_page(page.index).await
            }
            Characteristic::Data => {
                let report =
                    ingest_payload(self.store.as_ref(), &self.codec, value, &self.metrics)
                        .await
                        .map_err(gatt)?;
                tracing::debug!(
                    %central,
                    inserted = report.ingest.inserted,
                    "central delta ingested"
                );
                Ok(Vec::new())
            }
        }
    }

    async fn handle_read(
        &self,
        central: &PeerId,
        characteristic: Characteristic,
    ) -> Result<Vec<u8>, RadioError> {
        match characteristic {
            Characteristic::Summary => self.summary_page(0).await,
            Characteristic::Data => {
                // Clone out so no map guard is held across the store call.
                let Some(remote) = self.centrals.get(central).map(|s| s.clone()) else {
                    tracing::debug!(%central, "data read before summary; nothing to send");
                    return Ok(Vec::new());
                };

                let delta = outbound_delta(self.store.as_ref(), &remote, &self.codec, &self.metrics)
                    .await
                    .map_err(gatt)?;
                SyncMetrics::add(&self.metrics.records_sent, delta.sent);
                tracing::debug!(
                    %central,
                    sent = delta.sent,
                    deferred = delta.deferred,
                    "delta served"
                );
                Ok(delta.payload)
            }
        }
    }

    async fn central_disconnected(&self, central: &PeerId) {
        if self.centrals.remove(central).is_some() {
            tracing::debug!(%central, "central disconnected");
        }
    }
}

fn gatt(e: impl std::fmt::Display) -> RadioError {
    RadioError::Gatt(e.to_string())
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
            48.1,
            11.6,
            "0.8",
            "unplugged",
        )
    }

    fn handler(store: Arc<MemoryStore>) -> PeripheralHandler {
        PeripheralHandler::new(store, WireCodec::default(), Arc::new(SyncMetrics::new()))
    }

    fn central() -> PeerId {
        PeerId::new("central-1")
    }

    fn first_page(codec: &WireCodec, summary: &Summary) -> Vec<u8> {
        let pages = codec.paginate_summary(summary).unwrap();
        codec.encode_summary_page(&pages[0]).unwrap()
    }

    fn uuid_summary(n: u64) -> Summary {
        (0..n)
            .map(|i| {
                (
                    OriginId::new(uuid::Uuid::new_v4().to_string()),
                    Timestamp::from_millis(1_000 + i),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn summary_write_answers_with_local_summary() {
        let store = Arc::new(MemoryStore::new());
        store.insert_if_absent(&record("B", 50)).await.unwrap();
        let handler = handler(store);
        let codec = WireCodec::default();

        let request = first_page(&codec, &Summary::new());
        let response = handler
            .handle_write(&central(), Characteristic::Summary, &request)
            .await
            .unwrap();

        let summary = codec.decode_summary_page(&response).unwrap().entries;
        assert_eq!(
            summary.latest(&OriginId::from("B")),
            Some(Timestamp::from_millis(50))
        );
        assert_eq!(handler.active_centrals(), 1);
    }

    #[tokio::test]
    async fn data_read_serves_what_central_lacks() {
        let store = Arc::new(MemoryStore::new());
        let old = record("B", 10);
        let new = record("B", 20);
        store.insert_if_absent(&old).await.unwrap();
        store.insert_if_absent(&new).await.unwrap();
        let handler = handler(store);
        let codec = WireCodec::default();

        let central_summary: Summary = [(OriginId::from("B"), Timestamp::from_millis(10))]
            .into_iter()
            .collect();
        handler
            .handle_write(
                &central(),
                Characteristic::Summary,
                &first_page(&codec, &central_summary),
            )
            .await
            .unwrap();

        let payload = handler
            .handle_read(&central(), Characteristic::Data)
            .await
            .unwrap();
        assert_eq!(codec.decode_batch(&payload).unwrap(), vec![new]);
    }

    #[tokio::test]
    async fn central_pages_are_merged_until_page_zero_restarts() {
        let store = Arc::new(MemoryStore::new());
        let handler = handler(store);
        let codec = WireCodec::default();
        let summary = uuid_summary(25);
        let pages = codec.paginate_summary(&summary).unwrap();
        assert_eq!(pages.len(), 3);

        for page in &pages {
            let response = handler
                .handle_write(
                    &central(),
                    Characteristic::Summary,
                    &codec.encode_summary_page(page).unwrap(),
                )
                .await
                .unwrap();
            // Our one-page summary pads with empty pages.
            let answer = codec.decode_summary_page(&response).unwrap();
            assert_eq!(answer, SummaryPage::empty(page.index, 1));
        }
        assert_eq!(handler.centrals.get(&central()).unwrap().len(), 25);

        handler
            .handle_write(
                &central(),
                Characteristic::Summary,
                &codec.encode_summary_page(&pages[0]).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            handler.centrals.get(&central()).unwrap().len(),
            pages[0].entries.len()
        );
    }

    #[tokio::test]
    async fn local_summary_is_served_page_by_page() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..25 {
            let r = Record::with_timestamp(
                OriginId::new(uuid::Uuid::new_v4().to_string()),
                Timestamp::from_millis(i),
                0.0,
                0.0,
                "1.0",
                "full",
            );
            store.insert_if_absent(&r).await.unwrap();
        }
        let handler = handler(store);
        let codec = WireCodec::default();

        let mut merged = Summary::new();
        for index in 0..3 {
            let request = codec
                .encode_summary_page(&SummaryPage::empty(index, 1))
                .unwrap();
            let response = handler
                .handle_write(&central(), Characteristic::Summary, &request)
                .await
                .unwrap();
            let page = codec.decode_summary_page(&response).unwrap();
            assert_eq!(page.index, index);
            assert_eq!(page.pages, 3);
            merged.merge(&page.entries);
        }
        assert_eq!(merged.len(), 25);
    }

    #[tokio::test]
    async fn data_read_without_summary_is_empty() {
        let store = Arc::new(MemoryStore::new());
        store.insert_if_absent(&record("B", 1)).await.unwrap();
        let handler = handler(store);

        let payload = handler
            .handle_read(&central(), Characteristic::Data)
            .await
            .unwrap();
        assert!(payload.is_empty());
    }

    #[tokio::test]
    async fn data_write_is_ingested() {
        let store = Arc::new(MemoryStore::new());
        let handler = handler(store.clone());
        let codec = WireCodec::default();
        let r = record("A", 100);

        let response = handler
            .handle_write(
                &central(),
                Characteristic::Data,
                &codec.encode_batch(std::slice::from_ref(&r)).unwrap(),
            )
            .await
            .unwrap();

        assert!(response.is_empty());
        assert_eq!(store.get(&r.id).await.unwrap(), Some(r));
    }

    #[tokio::test]
    async fn malformed_summary_is_gatt_error() {
        let handler = handler(Arc::new(MemoryStore::new()));

        let result = handler
            .handle_write(&central(), Characteristic::Summary, &[0xc1])
            .await;

        assert!(matches!(result, Err(RadioError::Gatt(_))));
        assert_eq!(handler.active_centrals(), 0);
    }

    #[tokio::test]
    async fn disconnect_forgets_central() {
        let handler = handler(Arc::new(MemoryStore::new()));
        let codec = WireCodec::default();
        handler
            .handle_write(
                &central(),
                Characteristic::Summary,
                &first_page(&codec, &Summary::new()),
            )
            .await
            .unwrap();

        handler.central_disconnected(&central()).await;

        assert_eq!(handler.active_centrals(), 0);
    }
}
