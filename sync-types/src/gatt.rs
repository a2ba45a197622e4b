//! Radio profile identifiers.
//!
//! Every device advertises [`SERVICE_UUID`] and exposes two characteristics
//! under it: one for the summary exchange and one for record batches.

use uuid::Uuid;

/// Service identifier advertised by every participating device.
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x5f1e_0001_8c2b_4d7a_9a51_3e0c_6b2d_7a10);

/// Characteristic used for the write-with-response summary exchange.
pub const SUMMARY_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x5f1e_0002_8c2b_4d7a_9a51_3e0c_6b2d_7a10);

/// Characteristic used to push (write) and pull (read) record batches.
pub const DATA_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x5f1e_0003_8c2b_4d7a_9a51_3e0c_6b2d_7a10);

/// The two characteristics of the sync service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Characteristic {
    /// Summary exchange endpoint
    Summary,
    /// Record batch endpoint
    Data,
}

impl Characteristic {
    /// The characteristic's 128-bit identifier.
    pub fn uuid(&self) -> Uuid {
        match self {
            Characteristic::Summary => SUMMARY_CHARACTERISTIC_UUID,
            Characteristic::Data => DATA_CHARACTERISTIC_UUID,
        }
    }

    /// Map a 128-bit identifier back to a sync characteristic.
    pub fn from_uuid(uuid: &Uuid) -> Option<Self> {
        if *uuid == SUMMARY_CHARACTERISTIC_UUID {
            Some(Characteristic::Summary)
        } else if *uuid == DATA_CHARACTERISTIC_UUID {
            Some(Characteristic::Data)
        } else {
            None
        }
    }
}
