//! Session state machine for relief-sync.
//!
//! This module provides a pure, side-effect-free state machine for one peer
//! exchange. The state machine takes events as input and produces a new
//! state plus a list of actions to execute.
//!
//! ```text
//! Idle → Connecting → DiscoveringServices → ExchangingSummary
//!      → ExchangingDelta → Disconnecting → Idle
//! ```
//!
//! A failure in any active state moves to `Disconnecting` carrying a failed
//! outcome, so the connection is released on every path. The actual radio
//! and store I/O is performed by sync-engine, not by this module.

use relief_sync_types::{PeerId, Summary};
use std::fmt;

/// Protocol step a session was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Opening the radio connection.
    Connect,
    /// Enumerating the peer's services and characteristics.
    DiscoverServices,
    /// Writing our summary and reading the peer's.
    ExchangeSummary,
    /// Pushing our delta and pulling the peer's.
    ExchangeDelta,
    /// Releasing the radio connection.
    Disconnect,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Connect => "connect",
            Stage::DiscoverServices => "discover-services",
            Stage::ExchangeSummary => "exchange-summary",
            Stage::ExchangeDelta => "exchange-delta",
            Stage::Disconnect => "disconnect",
        };
        f.write_str(name)
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Both deltas were exchanged.
    Completed {
        /// Records pushed to the peer.
        sent: usize,
        /// Records newly inserted from the peer's push.
        received: usize,
    },
    /// The session was abandoned.
    Failed {
        /// Where it failed.
        stage: Stage,
        /// Error message describing the failure.
        error: String,
    },
}

/// Session state machine - NO I/O, just state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No session. Initial and terminal state.
    Idle,
    /// Radio connection attempt in progress.
    Connecting {
        /// Peer being connected to.
        peer: PeerId,
    },
    /// Connected, enumerating services.
    DiscoveringServices {
        /// Connected peer.
        peer: PeerId,
    },
    /// Summary write-with-response in progress.
    ExchangingSummary {
        /// Connected peer.
        peer: PeerId,
    },
    /// Delta push and pull in progress.
    ExchangingDelta {
        /// Connected peer.
        peer: PeerId,
        /// The peer's freshness digest.
        remote: Summary,
    },
    /// Releasing the connection.
    Disconnecting {
        /// Peer being disconnected.
        peer: PeerId,
        /// Outcome to report once released.
        outcome: SessionOutcome,
    },
}

impl SessionState {
    /// Create a new state machine in the Idle state.
    pub fn new() -> Self {
        Self::Idle
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function - no side effects. The caller (sync-engine)
    /// is responsible for executing the returned actions.
    pub fn on_event(self, event: Event) -> (Self, Vec<Action>) {
        match (self, event) {
            // From Idle
            (Self::Idle, Event::CandidateFound { peer }) => (
                Self::Connecting { peer: peer.clone() },
                vec![
                    Action::EmitEvent(SyncEvent::SessionStarted { peer: peer.clone() }),
                    Action::Connect { peer },
                ],
            ),

            // Happy path
            (Self::Connecting { peer }, Event::ConnectSucceeded) => (
                Self::DiscoveringServices { peer: peer.clone() },
                vec![Action::DiscoverServices { peer }],
            ),
            (Self::DiscoveringServices { peer }, Event::ServicesDiscovered) => (
                Self::ExchangingSummary { peer: peer.clone() },
                vec![Action::ExchangeSummary { peer }],
            ),
            (Self::ExchangingSummary { peer }, Event::SummaryReceived { remote }) => (
                Self::ExchangingDelta {
                    peer: peer.clone(),
                    remote: remote.clone(),
                },
                vec![Action::ExchangeDelta { peer, remote }],
            ),
            (Self::ExchangingDelta { peer, .. }, Event::DeltaExchanged { sent, received }) => (
                Self::Disconnecting {
                    peer: peer.clone(),
                    outcome: SessionOutcome::Completed { sent, received },
                },
                vec![Action::Disconnect { peer }],
            ),

            // Failure from any active state routes through Disconnecting
            (state, Event::Failed { error }) if state.is_active() => {
                let stage = state.stage().unwrap_or(Stage::Connect);
                let peer = state.peer().cloned().unwrap_or_else(|| PeerId::new(""));
                (
                    Self::Disconnecting {
                        peer: peer.clone(),
                        outcome: SessionOutcome::Failed { stage, error },
                    },
                    vec![Action::Disconnect { peer }],
                )
            }

            // Release is final whether or not the radio reported success
            (Self::Disconnecting { peer, outcome }, Event::Disconnected) => {
                (Self::Idle, finish(peer, outcome))
            }
            (Self::Disconnecting { peer, outcome }, Event::Failed { .. }) => {
                (Self::Idle, finish(peer, outcome))
            }

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// Check if a session is in progress (any state but Idle).
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle | Self::Disconnecting { .. })
    }

    /// Check if the state machine is idle.
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// The peer this session is talking to, if any.
    pub fn peer(&self) -> Option<&PeerId> {
        match self {
            Self::Idle => None,
            Self::Connecting { peer }
            | Self::DiscoveringServices { peer }
            | Self::ExchangingSummary { peer }
            | Self::ExchangingDelta { peer, .. }
            | Self::Disconnecting { peer, .. } => Some(peer),
        }
    }

    /// The protocol step the current state performs.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Idle => None,
            Self::Connecting { .. } => Some(Stage::Connect),
            Self::DiscoveringServices { .. } => Some(Stage::DiscoverServices),
            Self::ExchangingSummary { .. } => Some(Stage::ExchangeSummary),
            Self::ExchangingDelta { .. } => Some(Stage::ExchangeDelta),
            Self::Disconnecting { .. } => Some(Stage::Disconnect),
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

fn finish(peer: PeerId, outcome: SessionOutcome) -> Vec<Action> {
    let event = match outcome {
        SessionOutcome::Completed { sent, received } => SyncEvent::SessionCompleted {
            peer,
            sent,
            received,
        },
        SessionOutcome::Failed { stage, error } => SyncEvent::SessionFailed { peer, stage, error },
    };
    vec![Action::EmitEvent(event), Action::RearmScanner]
}

/// Events that can occur during a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The scanner handed off a candidate peer.
    CandidateFound {
        /// The discovered peer.
        peer: PeerId,
    },
    /// Radio connection established.
    ConnectSucceeded,
    /// Sync service and both characteristics found.
    ServicesDiscovered,
    /// Peer's summary decoded from the write response.
    SummaryReceived {
        /// The peer's freshness digest.
        remote: Summary,
    },
    /// Delta push and pull finished.
    DeltaExchanged {
        /// Records pushed to the peer.
        sent: usize,
        /// Records newly inserted from the peer's push.
        received: usize,
    },
    /// Radio connection released.
    Disconnected,
    /// The current step failed.
    Failed {
        /// Error message describing the failure.
        error: String,
    },
}

/// Actions to be executed by sync-engine.
///
/// These are instructions, not side effects. The engine interprets
/// these and performs the actual radio and store I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Open a radio connection.
    Connect {
        /// Target peer.
        peer: PeerId,
    },
    /// Enumerate services and characteristics.
    DiscoverServices {
        /// Connected peer.
        peer: PeerId,
    },
    /// Write the local summary, decode the peer's from the response.
    ExchangeSummary {
        /// Connected peer.
        peer: PeerId,
    },
    /// Push the computed delta, then read and ingest the peer's push.
    ExchangeDelta {
        /// Connected peer.
        peer: PeerId,
        /// The peer's freshness digest.
        remote: Summary,
    },
    /// Close the radio connection.
    Disconnect {
        /// Connected peer.
        peer: PeerId,
    },
    /// Hand control back to the scanner.
    RearmScanner,
    /// Emit an event to the application.
    EmitEvent(SyncEvent),
}

/// Events emitted to the application layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A session with a peer began.
    SessionStarted {
        /// The peer.
        peer: PeerId,
    },
    /// A session finished both exchanges.
    SessionCompleted {
        /// The peer.
        peer: PeerId,
        /// Records pushed to the peer.
        sent: usize,
        /// Records newly inserted from the peer.
        received: usize,
    },
    /// A session was abandoned.
    SessionFailed {
        /// The peer.
        peer: PeerId,
        /// Where it failed.
        stage: Stage,
        /// Error message describing the failure.
        error: String,
    },
}
