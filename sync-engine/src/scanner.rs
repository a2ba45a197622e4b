//! Peer Scanner.
//!
//! Finds one peer advertising the sync service, then stops. At most one
//! scan runs at a time: a second [`PeerScanner::start_scanning`] while one
//! is in flight returns [`ScanOutcome::AlreadyScanning`] without touching
//! the radio.

use crate::error::EngineError;
use crate::metrics::SyncMetrics;
use crate::radio::{Advertisement, Radio, ScanFilter};
use relief_sync_types::PeerId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// How a scan ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// A qualifying peer was found; scanning has stopped.
    Candidate(Advertisement),
    /// Another scan is in flight.
    AlreadyScanning,
    /// The scan window elapsed without a qualifying peer.
    Exhausted,
    /// [`PeerScanner::stop_scanning`] was called.
    Stopped,
}

/// Single-flight scanner over a [`Radio`].
pub struct PeerScanner {
    radio: Arc<dyn Radio>,
    metrics: Arc<SyncMetrics>,
    scan_window: Duration,
    cooldown: Duration,
    scanning: AtomicBool,
    stop_tx: Mutex<Option<oneshot::Sender<()>>>,
    recent: Mutex<HashMap<PeerId, Instant>>,
}

impl std::fmt::Debug for PeerScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerScanner")
            .field("scan_window", &self.scan_window)
            .field("cooldown", &self.cooldown)
            .field("scanning", &self.is_scanning())
            .finish_non_exhaustive()
    }
}

/// Clears the single-flight flag however the scan ends.
struct ScanGuard<'a>(&'a AtomicBool);

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl PeerScanner {
    /// Create a scanner.
    ///
    /// `scan_window` bounds how long one scan waits for a candidate;
    /// `cooldown` is how long a peer is skipped after a session with it.
    pub fn new(
        radio: Arc<dyn Radio>,
        metrics: Arc<SyncMetrics>,
        scan_window: Duration,
        cooldown: Duration,
    ) -> Self {
        Self {
            radio,
            metrics,
            scan_window,
            cooldown,
            scanning: AtomicBool::new(false),
            stop_tx: Mutex::new(None),
            recent: Mutex::new(HashMap::new()),
        }
    }

    /// Whether a scan is in flight.
    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::Acquire)
    }

    /// Scan until the first qualifying peer, the scan window, or a stop.
    ///
    /// A qualifying peer advertises the sync service, has a non-blank name
    /// and is not cooling down. The radio scan is stopped before this
    /// returns, on every path.
    pub async fn start_scanning(&self) -> Result<ScanOutcome, EngineError> {
        if self
            .scanning
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("scan already in flight");
            return Ok(ScanOutcome::AlreadyScanning);
        }
        let _guard = ScanGuard(&self.scanning);

        let (stop_tx, mut stop_rx) = oneshot::channel();
        *lock(&self.stop_tx) = Some(stop_tx);

        let mut stream = match self.radio.start_scan(&ScanFilter::sync_service()).await {
            Ok(stream) => stream,
            Err(e) => {
                lock(&self.stop_tx).take();
                SyncMetrics::incr(&self.metrics.scan_errors);
                tracing::warn!(error = %e, "scan failed to start");
                return Err(EngineError::Scan(e));
            }
        };
        SyncMetrics::incr(&self.metrics.scans_started);
        tracing::debug!(window = ?self.scan_window, "scanning for peers");

        let deadline = tokio::time::sleep(self.scan_window);
        tokio::pin!(deadline);

        let outcome = loop {
            tokio::select! {
                _ = &mut stop_rx => break Ok(ScanOutcome::Stopped),
                _ = &mut deadline => break Ok(ScanOutcome::Exhausted),
                item = stream.recv() => match item {
                    None => break Ok(ScanOutcome::Exhausted),
                    Some(Err(e)) => {
                        SyncMetrics::incr(&self.metrics.scan_errors);
                        tracing::warn!(error = %e, "scan aborted");
                        break Err(EngineError::Scan(e));
                    }
                    Some(Ok(ad)) => {
                        if self.qualifies(&ad) {
                            tracing::info!(
                                peer = %ad.peer,
                                name = ad.usable_name().unwrap_or_default(),
                                "found sync peer"
                            );
                            break Ok(ScanOutcome::Candidate(ad));
                        }
                    }
                },
            }
        };

        lock(&self.stop_tx).take();
        if let Err(e) = self.radio.stop_scan().await {
            tracing::warn!(error = %e, "failed to stop scan");
        }
        outcome
    }

    /// Stop the in-flight scan, if any. Returns whether one was stopped.
    pub fn stop_scanning(&self) -> bool {
        match lock(&self.stop_tx).take() {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    /// Skip `peer` for the cooldown period.
    pub fn cool_down(&self, peer: &PeerId) {
        lock(&self.recent).insert(peer.clone(), Instant::now() + self.cooldown);
    }

    /// Whether `peer` is in its cooldown period.
    pub fn is_cooling_down(&self, peer: &PeerId) -> bool {
        let mut recent = lock(&self.recent);
        let now = Instant::now();
        recent.retain(|_, until| *until > now);
        recent.contains_key(peer)
    }

    fn qualifies(&self, ad: &Advertisement) -> bool {
        if !ad.advertises_sync_service() || ad.usable_name().is_none() {
            return false;
        }
        if self.is_cooling_down(&ad.peer) {
            tracing::debug!(peer = %ad.peer, "skipping peer in cooldown");
            return false;
        }
        true
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::{MockRadio, PowerState};

    const WINDOW: Duration = Duration::from_secs(10);
    const COOLDOWN: Duration = Duration::from_secs(60);

    fn scanner(radio: &MockRadio) -> PeerScanner {
        PeerScanner::new(
            Arc::new(radio.clone()),
            Arc::new(SyncMetrics::new()),
            WINDOW,
            COOLDOWN,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn first_qualifying_peer_wins_and_scan_stops() {
        let radio = MockRadio::new();
        radio.add_peer(Advertisement::sync_peer("p1", "relief-1"), None);
        let scanner = scanner(&radio);

        let outcome = scanner.start_scanning().await.unwrap();

        assert!(matches!(outcome, ScanOutcome::Candidate(ad) if ad.peer == PeerId::new("p1")));
        assert!(!scanner.is_scanning());
        assert!(!radio.is_scanning());
        assert_eq!(radio.counters().scans_stopped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unnamed_and_foreign_peers_are_ignored() {
        let radio = MockRadio::new();
        let mut unnamed = Advertisement::sync_peer("p1", "");
        unnamed.local_name = None;
        radio.add_peer(unnamed, None);
        let scanner = scanner(&radio);

        let outcome = scanner.start_scanning().await.unwrap();

        assert_eq!(outcome, ScanOutcome::Exhausted);
        assert!(!radio.is_scanning());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_start_is_single_flight() {
        let radio = MockRadio::new();
        let scanner = scanner(&radio);

        let (a, b) = tokio::join!(scanner.start_scanning(), scanner.start_scanning());
        let outcomes = [a.unwrap(), b.unwrap()];

        assert!(outcomes.contains(&ScanOutcome::AlreadyScanning));
        assert!(outcomes.contains(&ScanOutcome::Exhausted));
        assert_eq!(radio.counters().scans_started, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn scan_error_clears_flag() {
        let radio = MockRadio::new();
        let scanner = scanner(&radio);

        radio.fail_next_scan("adapter busy");
        assert!(matches!(
            scanner.start_scanning().await,
            Err(EngineError::Scan(_))
        ));
        assert!(!scanner.is_scanning());

        radio.fail_next_scan_stream("stack reset");
        assert!(matches!(
            scanner.start_scanning().await,
            Err(EngineError::Scan(_))
        ));
        assert!(!scanner.is_scanning());
        assert!(!radio.is_scanning());

        // Next scan works again.
        radio.add_peer(Advertisement::sync_peer("p1", "one"), None);
        assert!(matches!(
            scanner.start_scanning().await.unwrap(),
            ScanOutcome::Candidate(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn unpowered_radio_is_a_scan_error() {
        let radio = MockRadio::new();
        radio.set_power(PowerState::PoweredOff);
        let scanner = scanner(&radio);

        assert!(scanner.start_scanning().await.is_err());
        assert!(!scanner.is_scanning());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_ends_the_scan() {
        let radio = MockRadio::new();
        let scanner = Arc::new(scanner(&radio));

        let task = {
            let scanner = Arc::clone(&scanner);
            tokio::spawn(async move { scanner.start_scanning().await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(scanner.stop_scanning());

        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome, ScanOutcome::Stopped);
        assert!(!radio.is_scanning());
        assert!(!scanner.stop_scanning());
    }

    #[tokio::test(start_paused = true)]
    async fn cooled_down_peer_is_skipped_until_expiry() {
        let radio = MockRadio::new();
        radio.add_peer(Advertisement::sync_peer("p1", "one"), None);
        radio.add_peer(Advertisement::sync_peer("p2", "two"), None);
        let scanner = scanner(&radio);

        scanner.cool_down(&PeerId::new("p1"));
        let outcome = scanner.start_scanning().await.unwrap();
        assert!(matches!(outcome, ScanOutcome::Candidate(ad) if ad.peer == PeerId::new("p2")));

        scanner.cool_down(&PeerId::new("p2"));
        assert_eq!(
            scanner.start_scanning().await.unwrap(),
            ScanOutcome::Exhausted
        );

        tokio::time::advance(COOLDOWN).await;
        assert!(!scanner.is_cooling_down(&PeerId::new("p1")));
        assert!(matches!(
            scanner.start_scanning().await.unwrap(),
            ScanOutcome::Candidate(_)
        ));
    }
}
