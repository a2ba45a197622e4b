//! # sync-engine
//!
//! Radio-driven anti-entropy engine for relief-sync.
//!
//! This is the library a device embeds to exchange disaster-status records
//! with whoever comes into radio range.
//!
//! ## Features
//!
//! - **Radio Abstraction**: Pluggable radio layer behind the [`Radio`] trait (mock included)
//! - **Symmetric Exchange**: Central sessions plus a [`PeripheralHandler`] for the peer role
//! - **Single-Flight Scheduling**: One scan or session on the radio at a time
//! - **Pure State Machine**: Uses sync-core for side-effect-free session logic
//! - **Idempotent Ingestion**: Records are deduplicated by id in memory or SQLite stores
//!
//! ## Example
//!
//! ```ignore
//! use relief_sync_engine::{Config, MockRadio, SqliteStore, SyncService};
//! use std::sync::Arc;
//!
//! let config = Config::from_file("relief-sync.toml".as_ref())?;
//! let store = Arc::new(SqliteStore::new(&config.storage.database).await?);
//! let service = SyncService::new(config, store, Arc::new(MockRadio::new()))?;
//!
//! service.record_local(-33.86, 151.21, "0.42", "charging").await?;
//! service.start_synchronization().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod driver;
pub mod error;
pub mod exchange;
pub mod ingest;
pub mod metrics;
pub mod peripheral;
pub mod radio;
pub mod scanner;
pub mod service;
pub mod session;
pub mod store;
pub mod worker;

pub use config::{Config, ConfigError, DeviceConfig, StorageConfig, SyncConfig};
pub use driver::SyncLoop;
pub use error::{EngineError, Result, StoreError, StoreResult};
pub use exchange::{InboundReport, OutboundDelta};
pub use ingest::{ingest, ingest_batch, IngestOutcome, IngestReport};
pub use metrics::{MetricsSnapshot, SyncMetrics};
pub use peripheral::PeripheralHandler;
pub use radio::{
    Advertisement, GattProfile, GattServer, MockCounters, MockRadio, PowerState, Radio, RadioError,
    ScanFilter, ScanStream,
};
pub use scanner::{PeerScanner, ScanOutcome};
pub use service::SyncService;
pub use session::{SessionReport, SessionRunner, SessionTiming};
pub use store::{MemoryStore, RecordStore, SqliteStore};
pub use worker::{SyncWorker, TickOutcome};
