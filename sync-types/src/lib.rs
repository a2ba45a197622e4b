//! # sync-types
//!
//! Wire format types for relief-sync.
//!
//! This crate provides the foundational types shared by every relief-sync crate:
//! - [`RecordId`], [`OriginId`], [`PeerId`], [`Timestamp`] - Identity and ordering types
//! - [`Record`] - The immutable disaster-status fact being replicated
//! - [`Summary`] - Per-origin freshness digest exchanged before data
//! - [`WireCodec`], [`SummaryPage`] - Paged summaries and record batches for the radio
//! - [`SyncError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod codec;
mod error;
mod gatt;
mod ids;
mod record;
mod summary;

pub use codec::{
    DecodedBatch, SummaryPage, WireCodec, BATCH_HEADER_LEN, DEFAULT_MAX_PAYLOAD, FRAME_HEADER_LEN,
    MAX_SUMMARY_PAGES, WIRE_VERSION,
};
pub use error::SyncError;
pub use gatt::{
    Characteristic, DATA_CHARACTERISTIC_UUID, SERVICE_UUID, SUMMARY_CHARACTERISTIC_UUID,
};
pub use ids::{OriginId, PeerId, RecordId, Timestamp};
pub use record::Record;
pub use summary::Summary;
