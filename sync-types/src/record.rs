//! The replicated record.

use serde::{Deserialize, Serialize};

use crate::{OriginId, RecordId, Timestamp};

/// An immutable disaster-status fact collected on one device.
///
/// Fields are never changed after creation. Identity is `id` alone; two
/// records with the same id are the same record regardless of content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Globally unique identifier
    pub id: RecordId,
    /// Device that produced this record
    pub origin: OriginId,
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
    /// Battery level as reported by the platform (e.g. "0.82")
    pub battery_level: String,
    /// Battery state as reported by the platform (e.g. "unplugged")
    pub battery_state: String,
    /// Instant of collection
    pub timestamp: Timestamp,
}

impl Record {
    /// Create a freshly collected record with a new id and the current time.
    pub fn new(
        origin: OriginId,
        latitude: f64,
        longitude: f64,
        battery_level: impl Into<String>,
        battery_state: impl Into<String>,
    ) -> Self {
        Self::with_timestamp(
            origin,
            Timestamp::now(),
            latitude,
            longitude,
            battery_level,
            battery_state,
        )
    }

    /// Create a record with a new id and an explicit collection time.
    pub fn with_timestamp(
        origin: OriginId,
        timestamp: Timestamp,
        latitude: f64,
        longitude: f64,
        battery_level: impl Into<String>,
        battery_state: impl Into<String>,
    ) -> Self {
        Self {
            id: RecordId::new(),
            origin,
            latitude,
            longitude,
            battery_level: battery_level.into(),
            battery_state: battery_state.into(),
            timestamp,
        }
    }

    /// Serialize a single record to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, crate::SyncError> {
        rmp_serde::to_vec(self).map_err(crate::SyncError::Serialization)
    }

    /// Deserialize a single record from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, crate::SyncError> {
        rmp_serde::from_slice(bytes).map_err(crate::SyncError::Deserialization)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_gets_fresh_identity() {
        let a = Record::new(OriginId::from("a"), 1.0, 2.0, "0.5", "charging");
        let b = Record::new(OriginId::from("a"), 1.0, 2.0, "0.5", "charging");
        assert_ne!(a.id, b.id);
        assert_eq!(a.origin, b.origin);
    }

    #[test]
    fn record_roundtrip_preserves_every_field() {
        let record = Record::with_timestamp(
            OriginId::from("field-unit-7"),
            Timestamp::from_millis(1_705_000_000_123),
            -33.868_820,
            151.209_296,
            "0.43",
            "unplugged",
        );

        let bytes = record.to_bytes().unwrap();
        let restored = Record::from_bytes(&bytes).unwrap();

        assert_eq!(record, restored);
    }

    #[test]
    fn record_msgpack_is_compact() {
        let record = Record::with_timestamp(
            OriginId::from("device-1"),
            Timestamp::from_millis(1),
            0.0,
            0.0,
            "1.0",
            "full",
        );
        // A typical record must leave room for several per 512-byte payload.
        assert!(record.to_bytes().unwrap().len() < 100);
    }
}
