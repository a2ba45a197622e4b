//! Sync service - the application-facing entry point.
//!
//! One `SyncService` per device. It owns the worker, the background loop and
//! the peripheral handler, and is passed by handle to whatever needs it.
//!
//! ```text
//! Application → SyncService → SyncLoop → SyncWorker → PeerScanner
//!                    │                        └─────→ SessionRunner → Radio
//!                    └─→ PeripheralHandler ←── remote centrals
//! ```

use crate::config::Config;
use crate::driver::SyncLoop;
use crate::error::{EngineError, Result, StoreResult};
use crate::exchange::local_summary;
use crate::ingest::{ingest, IngestOutcome};
use crate::metrics::{MetricsSnapshot, SyncMetrics};
use crate::peripheral::PeripheralHandler;
use crate::radio::Radio;
use crate::scanner::PeerScanner;
use crate::session::{SessionRunner, SessionTiming};
use crate::store::RecordStore;
use crate::worker::{SyncWorker, TickOutcome};
use relief_sync_core::SyncEvent;
use relief_sync_types::{OriginId, Record, Summary, WireCodec};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Peer-to-peer sync service for one device.
pub struct SyncService {
    config: Config,
    origin: OriginId,
    store: Arc<dyn RecordStore>,
    radio: Arc<dyn Radio>,
    metrics: Arc<SyncMetrics>,
    events: broadcast::Sender<SyncEvent>,
    worker: Arc<SyncWorker>,
    peripheral: Arc<PeripheralHandler>,
    sync_loop: Mutex<Option<SyncLoop>>,
}

impl std::fmt::Debug for SyncService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncService")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl SyncService {
    /// Build a service over `store` and `radio`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] if the configuration is invalid.
    pub fn new(config: Config, store: Arc<dyn RecordStore>, radio: Arc<dyn Radio>) -> Result<Self> {
        config.validate()?;

        let metrics = Arc::new(SyncMetrics::new());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let codec = WireCodec::new(config.sync.max_payload_bytes);

        let scanner = PeerScanner::new(
            Arc::clone(&radio),
            Arc::clone(&metrics),
            config.sync.scan_window(),
            config.sync.peer_cooldown(),
        );
        let runner = SessionRunner::new(
            Arc::clone(&radio),
            Arc::clone(&store),
            codec,
            SessionTiming {
                operation_timeout: config.sync.operation_timeout(),
                session_timeout: config.sync.session_timeout(),
            },
            Arc::clone(&metrics),
            events.clone(),
        );
        let worker = Arc::new(SyncWorker::new(
            Arc::clone(&radio),
            scanner,
            runner,
            Arc::clone(&metrics),
        ));
        let peripheral = Arc::new(PeripheralHandler::new(
            Arc::clone(&store),
            codec,
            Arc::clone(&metrics),
        ));

        Ok(Self {
            origin: OriginId::new(config.device.id.clone()),
            config,
            store,
            radio,
            metrics,
            events,
            worker,
            peripheral,
            sync_loop: Mutex::new(None),
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// This device's origin id.
    pub fn origin(&self) -> &OriginId {
        &self.origin
    }

    /// Get access to the record store.
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Start the background loop.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::AlreadyRunning`] if the loop is running.
    pub async fn start_synchronization(&self) -> Result<()> {
        let mut slot = self.sync_loop.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(SyncLoop::is_running) {
            return Err(EngineError::AlreadyRunning);
        }

        self.worker.resume();
        *slot = Some(SyncLoop::spawn(
            Arc::clone(&self.worker),
            Arc::clone(&self.radio),
            self.config.sync.tick_interval(),
        ));
        tracing::info!(device = %self.origin, "synchronization started");
        Ok(())
    }

    /// Stop the background loop and any in-flight scan.
    ///
    /// A session already running is allowed to finish. Safe to call when
    /// not running.
    pub async fn stop_synchronization(&self) {
        self.worker.halt();
        let sync_loop = self
            .sync_loop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(sync_loop) = sync_loop {
            sync_loop.stop().await;
            tracing::info!(device = %self.origin, "synchronization stopped");
        }
    }

    /// Whether the background loop is running.
    pub fn is_running(&self) -> bool {
        self.sync_loop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(SyncLoop::is_running)
    }

    /// Run one tick now, outside the loop's schedule.
    pub async fn sync_now(&self) -> Result<TickOutcome> {
        self.worker.tick().await
    }

    /// Store a locally collected record.
    pub async fn submit_local_record(&self, record: &Record) -> StoreResult<IngestOutcome> {
        let outcome = ingest(self.store.as_ref(), record).await.map_err(|e| {
            SyncMetrics::incr(&self.metrics.store_errors);
            e
        })?;
        tracing::debug!(record = %record.id, ?outcome, "local record submitted");
        Ok(outcome)
    }

    /// Create a record for this device now and store it.
    pub async fn record_local(
        &self,
        latitude: f64,
        longitude: f64,
        battery_level: &str,
        battery_state: &str,
    ) -> StoreResult<Record> {
        let record = Record::new(
            self.origin.clone(),
            latitude,
            longitude,
            battery_level,
            battery_state,
        );
        self.submit_local_record(&record).await?;
        Ok(record)
    }

    /// Summary of the local store.
    pub async fn local_summary(&self) -> StoreResult<Summary> {
        local_summary(self.store.as_ref()).await
    }

    /// The GATT server to register for the peer role.
    pub fn peripheral(&self) -> Arc<PeripheralHandler> {
        Arc::clone(&self.peripheral)
    }

    /// Subscribe to session lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Current counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
