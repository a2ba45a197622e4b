//! Radio abstraction for relief-sync.
//!
//! This module provides a pluggable radio layer that abstracts the
//! short-range link (a platform BLE stack, mock for testing).
//!
//! # Design
//!
//! The [`Radio`] trait is async and peer-addressed. It covers both halves of
//! what the engine needs from the adapter:
//! - power state, as a query and as a `watch` subscription
//! - scanning, returned as a channel of advertisements that stays open
//!   until [`Radio::stop_scan`]
//! - connect, discover services, characteristic write-with-response and
//!   read, disconnect
//!
//! The server side of the link is [`GattServer`]: the radio hands writes
//! and reads from connected centrals to it.
//!
//! # Example
//!
//! ```ignore
//! let radio = MockRadio::new();
//! radio.connect(&peer).await?;
//! let remote = radio
//!     .write_with_response(&peer, Characteristic::Summary, &summary_bytes)
//!     .await?;
//! radio.disconnect(&peer).await?;
//! ```

mod mock;

pub use mock::{MockCounters, MockRadio};

use async_trait::async_trait;
use relief_sync_types::{Characteristic, PeerId, SERVICE_UUID};
use std::fmt;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

/// Adapter power state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerState {
    /// State not reported yet.
    #[default]
    Unknown,
    /// The platform has no usable radio.
    Unsupported,
    /// The app is not allowed to use the radio.
    Unauthorized,
    /// Radio switched off.
    PoweredOff,
    /// Ready for use.
    PoweredOn,
    /// Stack is restarting.
    Resetting,
}

impl PowerState {
    /// Whether radio operations can be issued.
    pub fn is_powered(&self) -> bool {
        matches!(self, PowerState::PoweredOn)
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PowerState::Unknown => "unknown",
            PowerState::Unsupported => "unsupported",
            PowerState::Unauthorized => "unauthorized",
            PowerState::PoweredOff => "powered-off",
            PowerState::PoweredOn => "powered-on",
            PowerState::Resetting => "resetting",
        };
        f.write_str(name)
    }
}

/// One advertisement seen during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    /// Handle used to connect to the advertiser.
    pub peer: PeerId,
    /// Advertised local name, if any.
    pub local_name: Option<String>,
    /// Advertised service identifiers.
    pub services: Vec<Uuid>,
    /// Received signal strength.
    pub rssi: Option<i16>,
}

impl Advertisement {
    /// Advertisement for a device running the sync service.
    pub fn sync_peer(peer: impl Into<PeerId>, name: &str) -> Self {
        Self {
            peer: peer.into(),
            local_name: Some(name.to_string()),
            services: vec![SERVICE_UUID],
            rssi: None,
        }
    }

    /// Whether the sync service identifier is advertised.
    pub fn advertises_sync_service(&self) -> bool {
        self.services.contains(&SERVICE_UUID)
    }

    /// The local name, if present and not blank.
    pub fn usable_name(&self) -> Option<&str> {
        self.local_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

/// Which advertisers a scan reports.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScanFilter {
    /// Service identifiers of interest. Empty means everything.
    pub services: Vec<Uuid>,
}

impl ScanFilter {
    /// Only devices advertising the sync service.
    pub fn sync_service() -> Self {
        Self {
            services: vec![SERVICE_UUID],
        }
    }

    /// Whether `ad` passes this filter.
    pub fn matches(&self, ad: &Advertisement) -> bool {
        self.services.is_empty() || self.services.iter().any(|s| ad.services.contains(s))
    }
}

/// Services and characteristics found on a connected peer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GattProfile {
    /// Service identifiers.
    pub services: Vec<Uuid>,
    /// Characteristic identifiers across all services.
    pub characteristics: Vec<Uuid>,
}

impl GattProfile {
    /// Profile exposed by a relief-sync peer.
    pub fn sync_profile() -> Self {
        Self {
            services: vec![SERVICE_UUID],
            characteristics: vec![
                Characteristic::Summary.uuid(),
                Characteristic::Data.uuid(),
            ],
        }
    }

    /// Whether the sync service and both of its characteristics are present.
    pub fn has_sync_profile(&self) -> bool {
        self.services.contains(&SERVICE_UUID)
            && [Characteristic::Summary, Characteristic::Data]
                .iter()
                .all(|c| self.characteristics.contains(&c.uuid()))
    }
}

/// Radio errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RadioError {
    /// Adapter cannot be used.
    #[error("radio unavailable: {0}")]
    Unavailable(PowerState),

    /// Scan could not start or was aborted by the stack.
    #[error("scan failed: {0}")]
    ScanFailed(String),

    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Not connected to the addressed peer.
    #[error("not connected to {0}")]
    NotConnected(PeerId),

    /// The peer does not expose the sync service.
    #[error("sync service not found")]
    ServiceNotFound,

    /// Characteristic write failed.
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// Characteristic read failed.
    #[error("read failed: {0}")]
    ReadFailed(String),

    /// The remote GATT server rejected the request.
    #[error("gatt error: {0}")]
    Gatt(String),

    /// The stack gave up waiting.
    #[error("radio operation timed out")]
    Timeout,
}

/// Scan results: advertisements, or an error that ends the scan.
pub type ScanStream = mpsc::Receiver<Result<Advertisement, RadioError>>;

/// Radio trait for discovering peers and exchanging characteristic values.
///
/// Implementations must tolerate `disconnect` for a peer that never finished
/// connecting.
#[async_trait]
pub trait Radio: Send + Sync {
    /// Current adapter power state.
    fn power_state(&self) -> PowerState;

    /// Subscribe to power state changes.
    fn subscribe_power(&self) -> watch::Receiver<PowerState>;

    /// Start scanning, with duplicate advertisements suppressed.
    async fn start_scan(&self, filter: &ScanFilter) -> Result<ScanStream, RadioError>;

    /// Stop the current scan.
    async fn stop_scan(&self) -> Result<(), RadioError>;

    /// Open a connection to a peer.
    async fn connect(&self, peer: &PeerId) -> Result<(), RadioError>;

    /// Enumerate a connected peer's services and characteristics.
    async fn discover_services(&self, peer: &PeerId) -> Result<GattProfile, RadioError>;

    /// Write a characteristic value and return the peer's response value.
    async fn write_with_response(
        &self,
        peer: &PeerId,
        characteristic: Characteristic,
        value: &[u8],
    ) -> Result<Vec<u8>, RadioError>;

    /// Read a characteristic value.
    async fn read(
        &self,
        peer: &PeerId,
        characteristic: Characteristic,
    ) -> Result<Vec<u8>, RadioError>;

    /// Close the connection to a peer.
    async fn disconnect(&self, peer: &PeerId) -> Result<(), RadioError>;
}

/// Server side of the sync service, as seen from the radio.
#[async_trait]
pub trait GattServer: Send + Sync {
    /// A connected central wrote `value`; the return value is the response.
    async fn handle_write(
        &self,
        central: &PeerId,
        characteristic: Characteristic,
        value: &[u8],
    ) -> Result<Vec<u8>, RadioError>;

    /// A connected central reads a characteristic.
    async fn handle_read(
        &self,
        central: &PeerId,
        characteristic: Characteristic,
    ) -> Result<Vec<u8>, RadioError>;

    /// A central went away.
    async fn central_disconnected(&self, central: &PeerId);
}
