//! Error types for relief-sync wire handling.

use thiserror::Error;

/// Errors that can occur while encoding or decoding wire payloads.
#[derive(Debug, Error)]
pub enum SyncError {
    /// MessagePack serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] rmp_serde::encode::Error),

    /// MessagePack deserialization failed
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] rmp_serde::decode::Error),

    /// Payload was produced by an unknown protocol version
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// Payload ended before the declared content
    #[error("truncated payload: needed {needed} bytes at offset {offset}")]
    Truncated {
        /// Offset at which decoding stopped.
        offset: usize,
        /// Number of bytes that were required from that offset.
        needed: usize,
    },

    /// Payload exceeds what the characteristic can carry
    #[error("payload too large: {size} bytes (limit: {limit} bytes)")]
    PayloadTooLarge {
        /// Size of the payload in bytes.
        size: usize,
        /// Maximum allowed size.
        limit: usize,
    },

    /// Structurally invalid data
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// The peer returned no value where one was required
    #[error("missing response from peer")]
    MissingResponse,
}
