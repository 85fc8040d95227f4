// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Peripheral and GATT identifier models.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Bluetooth base UUID (`0000xxxx-0000-1000-8000-00805F9B34FB`) with the
/// 16-bit slot zeroed.
const BLUETOOTH_BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_0080_5F9B_34FB;

const fn from_assigned_number(short: u16) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID | ((short as u128) << 96))
}

/// Identifier of a GATT service (a capability a sensor advertises).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceId(pub Uuid);

impl ServiceId {
    /// Build a service identifier from its 16-bit assigned number.
    pub const fn from_short(short: u16) -> Self {
        Self(from_assigned_number(short))
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of a GATT characteristic (a data stream within a service).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CharacteristicId(pub Uuid);

impl CharacteristicId {
    /// Build a characteristic identifier from its 16-bit assigned number.
    pub const fn from_short(short: u16) -> Self {
        Self(from_assigned_number(short))
    }
}

impl fmt::Display for CharacteristicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Stable identity of a physical peripheral.
///
/// Distinct from the advertised name, which may be absent or change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SensorIdentity(pub Uuid);

impl SensorIdentity {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for SensorIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Link state of a peripheral as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnecting => "disconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One advertisement received during a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeripheralAdvertisement {
    pub identity: SensorIdentity,
    /// Advertised local name; anonymous peripherals are valid.
    pub display_name: Option<String>,
    pub state: ConnectionState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assigned_numbers_expand_on_base_uuid() {
        let heart_rate = ServiceId::from_short(0x180D);
        assert_eq!(
            heart_rate.to_string(),
            "0000180d-0000-1000-8000-00805f9b34fb"
        );

        let power_measurement = CharacteristicId::from_short(0x2A63);
        assert_eq!(
            power_measurement.to_string(),
            "00002a63-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_identity_serializes_as_plain_uuid() {
        let identity = SensorIdentity::new(Uuid::from_u128(1));
        let json = serde_json::to_string(&identity).unwrap();
        assert_eq!(json, "\"00000000-0000-0000-0000-000000000001\"");
    }
}
