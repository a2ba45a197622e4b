//! Session runner - the Connection Manager.
//!
//! Drives one peer exchange by feeding radio and store results into the
//! pure [`SessionState`] machine from sync-core and executing the actions
//! it returns.
//!
//! ```text
//! SessionRunner → Radio → peer
//!       ↓
//! sync-core (pure state machine)
//! ```
//!
//! Every radio operation is bounded by the operation timeout and by what is
//! left of the session deadline. The disconnect step only honours the
//! operation timeout, so a connection opened by the session is always
//! released.

use crate::error::EngineError;
use crate::exchange::{ingest_payload, local_summary, outbound_delta};
use crate::metrics::SyncMetrics;
use crate::radio::{Radio, RadioError};
use crate::store::RecordStore;
use relief_sync_core::{Action, Event, SessionOutcome, SessionState, Stage, SyncEvent};
use relief_sync_types::{Characteristic, PeerId, Summary, SummaryPage, SyncError, WireCodec};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{timeout, Instant};

/// Time limits for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTiming {
    /// Limit for any single radio operation.
    pub operation_timeout: Duration,
    /// Limit for the session as a whole.
    pub session_timeout: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_secs(5),
            session_timeout: Duration::from_secs(20),
        }
    }
}

/// What happened in one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    /// The peer.
    pub peer: PeerId,
    /// Completed or failed, and where.
    pub outcome: SessionOutcome,
    /// Whether the state machine handed control back to the scanner.
    pub rearm: bool,
    /// Wall time spent.
    pub elapsed: Duration,
}

impl SessionReport {
    /// Whether both deltas were exchanged.
    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, SessionOutcome::Completed { .. })
    }
}

/// Runs sessions against one radio and store.
pub struct SessionRunner {
    radio: Arc<dyn Radio>,
    store: Arc<dyn RecordStore>,
    codec: WireCodec,
    timing: SessionTiming,
    metrics: Arc<SyncMetrics>,
    events: broadcast::Sender<SyncEvent>,
}

/// Per-session mutable state that is not part of the protocol state.
struct SessionContext {
    deadline: Instant,
    /// Raw data-characteristic value held until the batch is decoded.
    inbound: Vec<u8>,
    outcome: Option<SessionOutcome>,
    rearm: bool,
}

impl SessionRunner {
    /// Create a runner.
    pub fn new(
        radio: Arc<dyn Radio>,
        store: Arc<dyn RecordStore>,
        codec: WireCodec,
        timing: SessionTiming,
        metrics: Arc<SyncMetrics>,
        events: broadcast::Sender<SyncEvent>,
    ) -> Self {
        Self {
            radio,
            store,
            codec,
            timing,
            metrics,
            events,
        }
    }

    /// Run a full session with `peer`, from connect to disconnect.
    ///
    /// Never fails: errors end the session and are reported in the
    /// returned outcome and as a [`SyncEvent::SessionFailed`].
    pub async fn run(&self, peer: PeerId) -> SessionReport {
        let started = Instant::now();
        let mut ctx = SessionContext {
            deadline: started + self.timing.session_timeout,
            inbound: Vec::new(),
            outcome: None,
            rearm: false,
        };

        let (mut state, actions) = SessionState::new().on_event(Event::CandidateFound {
            peer: peer.clone(),
        });
        let mut pending: VecDeque<Action> = actions.into();

        while let Some(action) = pending.pop_front() {
            let Some(event) = self.perform(action, &mut ctx).await else {
                continue;
            };
            let (next, actions) = state.on_event(event);
            state = next;
            pending.extend(actions);
        }

        let outcome = ctx.outcome.unwrap_or(SessionOutcome::Failed {
            stage: Stage::Connect,
            error: "session ended without an outcome".into(),
        });
        SessionReport {
            peer,
            outcome,
            rearm: ctx.rearm,
            elapsed: started.elapsed(),
        }
    }

    /// Execute one action. Returns the event to feed back, if any.
    async fn perform(&self, action: Action, ctx: &mut SessionContext) -> Option<Event> {
        let result = match action {
            Action::EmitEvent(event) => {
                self.emit(event, ctx);
                return None;
            }
            Action::RearmScanner => {
                ctx.rearm = true;
                return None;
            }
            Action::Connect { peer } => self.connect(&peer, ctx).await,
            Action::DiscoverServices { peer } => self.discover(&peer, ctx).await,
            Action::ExchangeSummary { peer } => self.exchange_summary(&peer, ctx).await,
            Action::ExchangeDelta { peer, remote } => {
                self.exchange_delta(&peer, &remote, ctx).await
            }
            Action::Disconnect { peer } => self.disconnect(&peer).await,
        };

        Some(result.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "session step failed");
            Event::Failed {
                error: e.to_string(),
            }
        }))
    }

    fn emit(&self, event: SyncEvent, ctx: &mut SessionContext) {
        match &event {
            SyncEvent::SessionStarted { peer } => {
                SyncMetrics::incr(&self.metrics.sessions_started);
                tracing::info!(%peer, "session started");
            }
            SyncEvent::SessionCompleted {
                peer,
                sent,
                received,
            } => {
                SyncMetrics::incr(&self.metrics.sessions_completed);
                tracing::info!(%peer, sent, received, "session completed");
                ctx.outcome = Some(SessionOutcome::Completed {
                    sent: *sent,
                    received: *received,
                });
            }
            SyncEvent::SessionFailed { peer, stage, error } => {
                SyncMetrics::incr(&self.metrics.sessions_failed);
                tracing::warn!(%peer, %stage, error, "session failed");
                ctx.outcome = Some(SessionOutcome::Failed {
                    stage: *stage,
                    error: error.clone(),
                });
            }
        }
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    async fn connect(&self, peer: &PeerId, ctx: &SessionContext) -> Result<Event, EngineError> {
        self.bounded("connect", ctx.deadline, self.radio.connect(peer))
            .await?;
        Ok(Event::ConnectSucceeded)
    }

    async fn discover(&self, peer: &PeerId, ctx: &SessionContext) -> Result<Event, EngineError> {
        let profile = self
            .bounded(
                "discover services",
                ctx.deadline,
                self.radio.discover_services(peer),
            )
            .await?;
        if !profile.has_sync_profile() {
            return Err(EngineError::Connection(RadioError::ServiceNotFound));
        }
        Ok(Event::ServicesDiscovered)
    }

    /// Trade summaries page by page.
    ///
    /// Each write carries page `i` of the local summary and its response
    /// carries page `i` of the peer's. Writes continue until both sides
    /// have sent every page; the side with fewer pages sends empty ones.
    async fn exchange_summary(
        &self,
        peer: &PeerId,
        ctx: &SessionContext,
    ) -> Result<Event, EngineError> {
        let summary = local_summary(self.store.as_ref()).await?;
        let pages = self.codec.paginate_summary(&summary)?;
        let local_pages = pages.first().map_or(1, |page| page.pages);

        let mut remote = Summary::new();
        let mut total = local_pages;
        let mut index = 0u16;
        while index < total {
            let request = match pages.get(usize::from(index)) {
                Some(page) => self.codec.encode_summary_page(page)?,
                None => self
                    .codec
                    .encode_summary_page(&SummaryPage::empty(index, local_pages))?,
            };
            let response = self
                .bounded(
                    "summary exchange",
                    ctx.deadline,
                    self.radio
                        .write_with_response(peer, Characteristic::Summary, &request),
                )
                .await?;

            let page = self.codec.decode_summary_page(&response)?;
            if page.index != index {
                return Err(SyncError::InvalidData(format!(
                    "asked for summary page {index}, peer answered {}",
                    page.index
                ))
                .into());
            }
            total = total.max(page.pages);
            remote.merge(&page.entries);
            index += 1;
        }

        tracing::debug!(
            %peer,
            local = summary.len(),
            remote = remote.len(),
            pages = total,
            "summaries exchanged"
        );
        Ok(Event::SummaryReceived { remote })
    }

    async fn exchange_delta(
        &self,
        peer: &PeerId,
        remote: &Summary,
        ctx: &mut SessionContext,
    ) -> Result<Event, EngineError> {
        let delta = outbound_delta(self.store.as_ref(), remote, &self.codec, &self.metrics).await?;

        if !delta.payload.is_empty() {
            self.bounded(
                "delta push",
                ctx.deadline,
                self.radio
                    .write_with_response(peer, Characteristic::Data, &delta.payload),
            )
            .await?;
            SyncMetrics::add(&self.metrics.records_sent, delta.sent);
        }

        ctx.inbound = self
            .bounded(
                "delta pull",
                ctx.deadline,
                self.radio.read(peer, Characteristic::Data),
            )
            .await?;

        let inbound = std::mem::take(&mut ctx.inbound);
        let report =
            ingest_payload(self.store.as_ref(), &self.codec, &inbound, &self.metrics).await?;

        Ok(Event::DeltaExchanged {
            sent: delta.sent,
            received: report.ingest.inserted,
        })
    }

    async fn disconnect(&self, peer: &PeerId) -> Result<Event, EngineError> {
        match timeout(self.timing.operation_timeout, self.radio.disconnect(peer)).await {
            Ok(Ok(())) => Ok(Event::Disconnected),
            Ok(Err(e)) => Err(EngineError::Connection(e)),
            Err(_) => Err(EngineError::Timeout {
                operation: "disconnect",
            }),
        }
    }

    /// Run a radio operation under the operation timeout and session deadline.
    async fn bounded<T, F>(
        &self,
        operation: &'static str,
        deadline: Instant,
        op: F,
    ) -> Result<T, EngineError>
    where
        F: Future<Output = Result<T, RadioError>>,
    {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(EngineError::Timeout {
                operation: "session",
            });
        }

        match timeout(self.timing.operation_timeout.min(remaining), op).await {
            Ok(result) => result.map_err(EngineError::Connection),
            Err(_) => Err(EngineError::Timeout { operation }),
        }
    }
}
