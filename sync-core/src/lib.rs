//! # sync-core
//!
//! Pure logic for relief-sync (no I/O, instant tests).
//!
//! This crate implements the anti-entropy algorithms and the per-peer
//! session state machine without any radio or disk I/O.
//!
//! ## Purity
//!
//! Nothing here touches a radio, a clock or a store. Summaries, reconciliation
//! and delta planning are functions of their arguments, and the session
//! machine only moves from state to state, handing back the [`Action`]s to
//! perform. Every test in the crate is a plain synchronous `#[test]`.
//!
//! The actual I/O (radio operations, store access) is performed by
//! `sync-engine`, which interprets the actions produced by the state machine.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod delta;
pub mod reconcile;
pub mod session;
pub mod summary;

pub use delta::{plan_delta, DeltaPlan};
pub use reconcile::{is_missing_for_remote, missing_for_remote};
pub use session::{Action, Event, SessionOutcome, SessionState, Stage, SyncEvent};
pub use summary::build_summary;
