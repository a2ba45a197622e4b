//! Mock radio for testing.
//!
//! Peers are registered with an advertisement and, optionally, a
//! [`GattServer`] that answers their characteristic traffic. Failures can be
//! scripted one operation at a time, and every operation is logged and
//! counted for verification.

use super::{
    Advertisement, GattProfile, GattServer, PowerState, Radio, RadioError, ScanFilter, ScanStream,
};
use async_trait::async_trait;
use relief_sync_types::{Characteristic, PeerId};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

const SCAN_CHANNEL_CAPACITY: usize = 64;

/// Operation counters kept by [`MockRadio`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockCounters {
    /// Scans successfully started.
    pub scans_started: usize,
    /// Calls to `stop_scan`.
    pub scans_stopped: usize,
    /// Successful connections.
    pub connects: usize,
    /// Calls to `disconnect`.
    pub disconnects: usize,
    /// Characteristic writes delivered.
    pub writes: usize,
    /// Characteristic reads delivered.
    pub reads: usize,
}

struct MockPeer {
    advertisement: Advertisement,
    profile: GattProfile,
    server: Option<Arc<dyn GattServer>>,
}

#[derive(Default)]
struct Failures {
    scan: Option<String>,
    scan_stream: Option<String>,
    connect: Option<String>,
    discover: Option<String>,
    write: Option<String>,
    read: Option<String>,
    disconnect: Option<String>,
}

#[derive(Default)]
struct MockRadioInner {
    peers: BTreeMap<PeerId, MockPeer>,
    connected: HashSet<PeerId>,
    scan_tx: Option<mpsc::Sender<Result<Advertisement, RadioError>>>,
    scan_filter: ScanFilter,
    fail: Failures,
    latency: Duration,
    scan_snapshot: bool,
    counters: MockCounters,
    in_flight: usize,
    max_in_flight: usize,
    log: Vec<String>,
}

/// In-process radio for tests and simulations.
///
/// Clones share state, so a test can keep a handle while the engine owns
/// another.
#[derive(Clone)]
pub struct MockRadio {
    address: PeerId,
    inner: Arc<Mutex<MockRadioInner>>,
    power: Arc<watch::Sender<PowerState>>,
}

impl fmt::Debug for MockRadio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("MockRadio")
            .field("address", &self.address)
            .field("power", &*self.power.borrow())
            .field("peers", &inner.peers.len())
            .field("counters", &inner.counters)
            .finish_non_exhaustive()
    }
}

impl Default for MockRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRadio {
    /// Create a powered-on mock radio.
    pub fn new() -> Self {
        Self::with_address("mock-central")
    }

    /// Create a mock radio that identifies itself to peripherals as `address`.
    pub fn with_address(address: impl Into<PeerId>) -> Self {
        let (power, _) = watch::channel(PowerState::PoweredOn);
        Self {
            address: address.into(),
            inner: Arc::new(Mutex::new(MockRadioInner::default())),
            power: Arc::new(power),
        }
    }

    /// The address peripherals see for this radio.
    pub fn address(&self) -> &PeerId {
        &self.address
    }

    /// Change the adapter power state and notify subscribers.
    pub fn set_power(&self, state: PowerState) {
        self.power.send_replace(state);
    }

    /// Bring a sync peer into range, answering through `server`.
    pub fn add_peer(&self, advertisement: Advertisement, server: Option<Arc<dyn GattServer>>) {
        self.add_peer_with_profile(advertisement, GattProfile::sync_profile(), server);
    }

    /// Bring a peer into range with an explicit service profile.
    ///
    /// If a scan is running and the advertisement passes its filter, it is
    /// reported immediately.
    pub fn add_peer_with_profile(
        &self,
        advertisement: Advertisement,
        profile: GattProfile,
        server: Option<Arc<dyn GattServer>>,
    ) {
        let mut inner = self.lock();
        if let Some(tx) = &inner.scan_tx {
            if inner.scan_filter.matches(&advertisement) {
                let _ = tx.try_send(Ok(advertisement.clone()));
            }
        }
        inner.peers.insert(
            advertisement.peer.clone(),
            MockPeer {
                advertisement,
                profile,
                server,
            },
        );
    }

    /// Take a peer out of range.
    pub fn remove_peer(&self, peer: &PeerId) {
        let mut inner = self.lock();
        inner.peers.remove(peer);
        inner.connected.remove(peer);
    }

    /// Cause the next `start_scan()` to fail.
    pub fn fail_next_scan(&self, error: &str) {
        self.lock().fail.scan = Some(error.to_string());
    }

    /// Cause the next scan to start and then report an error on its stream.
    pub fn fail_next_scan_stream(&self, error: &str) {
        self.lock().fail.scan_stream = Some(error.to_string());
    }

    /// Cause the next `connect()` to fail.
    pub fn fail_next_connect(&self, error: &str) {
        self.lock().fail.connect = Some(error.to_string());
    }

    /// Cause the next `discover_services()` to fail.
    pub fn fail_next_discover(&self, error: &str) {
        self.lock().fail.discover = Some(error.to_string());
    }

    /// Cause the next `write_with_response()` to fail.
    pub fn fail_next_write(&self, error: &str) {
        self.lock().fail.write = Some(error.to_string());
    }

    /// Cause the next `read()` to fail.
    pub fn fail_next_read(&self, error: &str) {
        self.lock().fail.read = Some(error.to_string());
    }

    /// Cause the next `disconnect()` to report an error.
    pub fn fail_next_disconnect(&self, error: &str) {
        self.lock().fail.disconnect = Some(error.to_string());
    }

    /// When set, a scan reports the peers in range when it starts and then
    /// ends, instead of listening until stopped.
    pub fn set_scan_snapshot(&self, snapshot: bool) {
        self.lock().scan_snapshot = snapshot;
    }

    /// Delay every subsequent operation by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// Operation counters.
    pub fn counters(&self) -> MockCounters {
        self.lock().counters
    }

    /// Every operation issued, in order.
    pub fn op_log(&self) -> Vec<String> {
        self.lock().log.clone()
    }

    /// Highest number of operations that were in flight at once.
    pub fn max_concurrent_ops(&self) -> usize {
        self.lock().max_in_flight
    }

    /// Whether a scan is running.
    pub fn is_scanning(&self) -> bool {
        self.lock().scan_tx.is_some()
    }

    /// Whether a connection to `peer` is open.
    pub fn is_connected(&self, peer: &PeerId) -> bool {
        self.lock().connected.contains(peer)
    }

    /// Number of open connections.
    pub fn open_connections(&self) -> usize {
        self.lock().connected.len()
    }

    fn lock(&self) -> MutexGuard<'_, MockRadioInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark an operation in flight, then wait out the configured latency.
    async fn begin(&self, op: String) -> OpGuard {
        let latency = {
            let mut inner = self.lock();
            inner.log.push(op);
            inner.in_flight += 1;
            inner.max_in_flight = inner.max_in_flight.max(inner.in_flight);
            inner.latency
        };
        let guard = OpGuard {
            inner: Arc::clone(&self.inner),
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        guard
    }

    fn check_power(&self) -> Result<(), RadioError> {
        let state = *self.power.borrow();
        if state.is_powered() {
            Ok(())
        } else {
            Err(RadioError::Unavailable(state))
        }
    }

    fn server_for(
        &self,
        peer: &PeerId,
        inner: &MockRadioInner,
    ) -> Result<Arc<dyn GattServer>, RadioError> {
        if !inner.connected.contains(peer) {
            return Err(RadioError::NotConnected(peer.clone()));
        }
        inner
            .peers
            .get(peer)
            .and_then(|p| p.server.clone())
            .ok_or_else(|| RadioError::Gatt(format!("{peer} has no GATT server")))
    }
}

/// Decrements the in-flight count when an operation finishes.
struct OpGuard {
    inner: Arc<Mutex<MockRadioInner>>,
}

impl Drop for OpGuard {
    fn drop(&mut self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.in_flight = inner.in_flight.saturating_sub(1);
    }
}

#[async_trait]
impl Radio for MockRadio {
    fn power_state(&self) -> PowerState {
        *self.power.borrow()
    }

    fn subscribe_power(&self) -> watch::Receiver<PowerState> {
        self.power.subscribe()
    }

    async fn start_scan(&self, filter: &ScanFilter) -> Result<ScanStream, RadioError> {
        let _op = self.begin("start_scan".to_string()).await;
        self.check_power()?;
        let mut inner = self.lock();

        if let Some(error) = inner.fail.scan.take() {
            return Err(RadioError::ScanFailed(error));
        }
        if inner.scan_tx.is_some() {
            return Err(RadioError::ScanFailed("scan already in progress".into()));
        }

        let (tx, rx) = mpsc::channel(SCAN_CHANNEL_CAPACITY);
        for peer in inner.peers.values() {
            if filter.matches(&peer.advertisement) {
                let _ = tx.try_send(Ok(peer.advertisement.clone()));
            }
        }
        if let Some(error) = inner.fail.scan_stream.take() {
            let _ = tx.try_send(Err(RadioError::ScanFailed(error)));
        }

        inner.counters.scans_started += 1;
        if inner.scan_snapshot {
            // Dropping the sender ends the stream once it drains.
            return Ok(rx);
        }
        inner.scan_tx = Some(tx);
        inner.scan_filter = filter.clone();
        Ok(rx)
    }

    async fn stop_scan(&self) -> Result<(), RadioError> {
        let _op = self.begin("stop_scan".to_string()).await;
        let mut inner = self.lock();
        inner.scan_tx = None;
        inner.counters.scans_stopped += 1;
        Ok(())
    }

    async fn connect(&self, peer: &PeerId) -> Result<(), RadioError> {
        let _op = self.begin(format!("connect {peer}")).await;
        self.check_power()?;
        let mut inner = self.lock();

        if let Some(error) = inner.fail.connect.take() {
            return Err(RadioError::ConnectionFailed(error));
        }
        if !inner.peers.contains_key(peer) {
            return Err(RadioError::ConnectionFailed(format!("{peer} out of range")));
        }

        inner.connected.insert(peer.clone());
        inner.counters.connects += 1;
        Ok(())
    }

    async fn discover_services(&self, peer: &PeerId) -> Result<GattProfile, RadioError> {
        let _op = self.begin(format!("discover {peer}")).await;
        let mut inner = self.lock();

        if !inner.connected.contains(peer) {
            return Err(RadioError::NotConnected(peer.clone()));
        }
        if let Some(error) = inner.fail.discover.take() {
            return Err(RadioError::Gatt(error));
        }

        inner
            .peers
            .get(peer)
            .map(|p| p.profile.clone())
            .ok_or_else(|| RadioError::NotConnected(peer.clone()))
    }

    async fn write_with_response(
        &self,
        peer: &PeerId,
        characteristic: Characteristic,
        value: &[u8],
    ) -> Result<Vec<u8>, RadioError> {
        let _op = self
            .begin(format!("write {peer} {characteristic:?} {}B", value.len()))
            .await;
        let server = {
            let mut inner = self.lock();
            let server = self.server_for(peer, &inner)?;
            if let Some(error) = inner.fail.write.take() {
                return Err(RadioError::WriteFailed(error));
            }
            inner.counters.writes += 1;
            server
        };

        server
            .handle_write(&self.address, characteristic, value)
            .await
    }

    async fn read(
        &self,
        peer: &PeerId,
        characteristic: Characteristic,
    ) -> Result<Vec<u8>, RadioError> {
        let _op = self.begin(format!("read {peer} {characteristic:?}")).await;
        let server = {
            let mut inner = self.lock();
            let server = self.server_for(peer, &inner)?;
            if let Some(error) = inner.fail.read.take() {
                return Err(RadioError::ReadFailed(error));
            }
            inner.counters.reads += 1;
            server
        };

        server.handle_read(&self.address, characteristic).await
    }

    async fn disconnect(&self, peer: &PeerId) -> Result<(), RadioError> {
        let _op = self.begin(format!("disconnect {peer}")).await;
        let (was_connected, server, failure) = {
            let mut inner = self.lock();
            inner.counters.disconnects += 1;
            let was_connected = inner.connected.remove(peer);
            let server = inner.peers.get(peer).and_then(|p| p.server.clone());
            (was_connected, server, inner.fail.disconnect.take())
        };

        if was_connected {
            if let Some(server) = server {
                server.central_disconnected(&self.address).await;
            }
        }

        match failure {
            Some(error) => Err(RadioError::ConnectionFailed(error)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Answers every write with the written bytes reversed and every read
    /// with a fixed value.
    struct EchoServer {
        disconnected: Mutex<Vec<PeerId>>,
    }

    impl EchoServer {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                disconnected: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl GattServer for EchoServer {
        async fn handle_write(
            &self,
            _central: &PeerId,
            _characteristic: Characteristic,
            value: &[u8],
        ) -> Result<Vec<u8>, RadioError> {
            Ok(value.iter().rev().copied().collect())
        }

        async fn handle_read(
            &self,
            _central: &PeerId,
            _characteristic: Characteristic,
        ) -> Result<Vec<u8>, RadioError> {
            Ok(b"value".to_vec())
        }

        async fn central_disconnected(&self, central: &PeerId) {
            self.disconnected.lock().unwrap().push(central.clone());
        }
    }

    fn peer() -> PeerId {
        PeerId::new("peer-1")
    }

    fn radio_with_peer() -> (MockRadio, Arc<EchoServer>) {
        let radio = MockRadio::new();
        let server = EchoServer::new();
        radio.add_peer(
            Advertisement::sync_peer("peer-1", "relief-1"),
            Some(server.clone()),
        );
        (radio, server)
    }

    // ===========================================
    // Scanning
    // ===========================================

    #[tokio::test]
    async fn scan_reports_matching_peers() {
        let (radio, _) = radio_with_peer();
        let mut other = Advertisement::sync_peer("speaker", "speaker");
        other.services.clear();
        radio.add_peer(other, None);

        let mut rx = radio.start_scan(&ScanFilter::sync_service()).await.unwrap();
        let ad = rx.recv().await.unwrap().unwrap();
        assert_eq!(ad.peer, peer());
        assert!(rx.try_recv().is_err());
        assert!(radio.is_scanning());

        radio.stop_scan().await.unwrap();
        assert!(!radio.is_scanning());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn peer_arriving_mid_scan_is_reported() {
        let radio = MockRadio::new();
        let mut rx = radio.start_scan(&ScanFilter::sync_service()).await.unwrap();

        radio.add_peer(Advertisement::sync_peer("late", "late"), None);

        let ad = rx.recv().await.unwrap().unwrap();
        assert_eq!(ad.peer, PeerId::new("late"));
    }

    #[tokio::test]
    async fn snapshot_scan_ends_after_peers_in_range() {
        let (radio, _) = radio_with_peer();
        radio.set_scan_snapshot(true);

        let mut stream = radio.start_scan(&ScanFilter::sync_service()).await.unwrap();

        assert_eq!(stream.recv().await.unwrap().unwrap().peer, peer());
        assert!(stream.recv().await.is_none());
        assert!(!radio.is_scanning());
    }

    #[tokio::test]
    async fn second_scan_is_rejected() {
        let radio = MockRadio::new();
        let _rx = radio.start_scan(&ScanFilter::sync_service()).await.unwrap();

        let result = radio.start_scan(&ScanFilter::sync_service()).await;
        assert!(matches!(result, Err(RadioError::ScanFailed(_))));
        assert_eq!(radio.counters().scans_started, 1);
    }

    #[tokio::test]
    async fn scan_requires_power() {
        let radio = MockRadio::new();
        radio.set_power(PowerState::PoweredOff);

        let result = radio.start_scan(&ScanFilter::sync_service()).await;
        assert!(matches!(
            result,
            Err(RadioError::Unavailable(PowerState::PoweredOff))
        ));
    }

    #[tokio::test]
    async fn scripted_scan_stream_error() {
        let (radio, _) = radio_with_peer();
        radio.fail_next_scan_stream("stack reset");

        let mut rx = radio.start_scan(&ScanFilter::sync_service()).await.unwrap();
        assert!(rx.recv().await.unwrap().is_ok());
        assert!(matches!(
            rx.recv().await.unwrap(),
            Err(RadioError::ScanFailed(_))
        ));
    }

    // ===========================================
    // Connections and characteristics
    // ===========================================

    #[tokio::test]
    async fn connect_write_read_disconnect() {
        let (radio, server) = radio_with_peer();

        radio.connect(&peer()).await.unwrap();
        assert!(radio.is_connected(&peer()));

        let profile = radio.discover_services(&peer()).await.unwrap();
        assert!(profile.has_sync_profile());

        let response = radio
            .write_with_response(&peer(), Characteristic::Summary, b"abc")
            .await
            .unwrap();
        assert_eq!(response, b"cba");

        let value = radio.read(&peer(), Characteristic::Data).await.unwrap();
        assert_eq!(value, b"value");

        radio.disconnect(&peer()).await.unwrap();
        assert!(!radio.is_connected(&peer()));
        assert_eq!(
            *server.disconnected.lock().unwrap(),
            vec![radio.address().clone()]
        );

        let counters = radio.counters();
        assert_eq!(counters.connects, 1);
        assert_eq!(counters.disconnects, 1);
        assert_eq!(counters.writes, 1);
        assert_eq!(counters.reads, 1);
    }

    #[tokio::test]
    async fn connect_to_unknown_peer_fails() {
        let radio = MockRadio::new();
        let result = radio.connect(&peer()).await;
        assert!(matches!(result, Err(RadioError::ConnectionFailed(_))));
    }

    #[tokio::test]
    async fn write_without_connect_fails() {
        let (radio, _) = radio_with_peer();
        let result = radio
            .write_with_response(&peer(), Characteristic::Summary, b"x")
            .await;
        assert!(matches!(result, Err(RadioError::NotConnected(_))));
    }

    #[tokio::test]
    async fn forced_failures_are_one_shot() {
        let (radio, _) = radio_with_peer();

        radio.fail_next_connect("out of range");
        assert!(radio.connect(&peer()).await.is_err());
        radio.connect(&peer()).await.unwrap();

        radio.fail_next_read("att error");
        assert!(matches!(
            radio.read(&peer(), Characteristic::Data).await,
            Err(RadioError::ReadFailed(_))
        ));
        assert!(radio.read(&peer(), Characteristic::Data).await.is_ok());
    }

    #[tokio::test]
    async fn disconnect_of_unconnected_peer_is_tolerated() {
        let (radio, server) = radio_with_peer();
        radio.disconnect(&peer()).await.unwrap();

        assert_eq!(radio.counters().disconnects, 1);
        assert!(server.disconnected.lock().unwrap().is_empty());
    }

    // ===========================================
    // Power and bookkeeping
    // ===========================================

    #[tokio::test]
    async fn power_changes_are_published() {
        let radio = MockRadio::new();
        let mut rx = radio.subscribe_power();
        assert_eq!(*rx.borrow(), PowerState::PoweredOn);

        radio.set_power(PowerState::PoweredOff);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), PowerState::PoweredOff);
        assert_eq!(radio.power_state(), PowerState::PoweredOff);
    }

    #[tokio::test]
    async fn clone_shares_state() {
        let (radio, _) = radio_with_peer();
        let other = radio.clone();

        radio.connect(&peer()).await.unwrap();
        assert!(other.is_connected(&peer()));
        assert_eq!(other.op_log(), vec!["connect peer-1".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_operations_are_measured() {
        let (radio, _) = radio_with_peer();
        radio.set_latency(Duration::from_millis(10));

        let p = peer();
        radio.connect(&p).await.unwrap();
        radio.discover_services(&p).await.unwrap();
        assert_eq!(radio.max_concurrent_ops(), 1);

        let a = radio.read(&p, Characteristic::Data);
        let b = radio.read(&p, Characteristic::Data);
        let (ra, rb) = tokio::join!(a, b);
        assert!(ra.is_ok() && rb.is_ok());
        assert_eq!(radio.max_concurrent_ops(), 2);
    }
}
