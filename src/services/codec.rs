// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Measurement codec for standardized GATT payloads.
//!
//! Payloads come from untrusted hardware: every decoder returns `None` for
//! short or malformed input and never panics.
//!
//! Supported layouts:
//! - Heart Rate Measurement (0x2A37): flags byte, then bpm as `u8` or, when
//!   flag bit 0 is set, as little-endian `u16`.
//! - Cycling Power Measurement (0x2A63): two flag bytes, then instantaneous
//!   power as little-endian `u16` (watts).

use crate::models::{CharacteristicId, Metric, ServiceId};

/// Placeholder rendered when a payload cannot be decoded.
pub const NO_READING: &str = "--";

/// Heart rate value format flag (bit 0 of the flags byte).
const HR_VALUE_FORMAT_U16: u8 = 0x01;

/// Per-metric binding of GATT identifiers to a decoder.
#[derive(Debug)]
pub struct MetricSpec {
    pub metric: Metric,
    pub service: ServiceId,
    pub characteristic: CharacteristicId,
    /// Unit suffix used by [`describe`]
    pub unit: &'static str,
    pub decode: fn(&[u8]) -> Option<u32>,
}

/// Dispatch table, one entry per [`Metric`] variant.
static METRIC_SPECS: [MetricSpec; 2] = [
    MetricSpec {
        metric: Metric::HeartRate,
        service: ServiceId::from_short(0x180D),
        characteristic: CharacteristicId::from_short(0x2A37),
        unit: "bpm",
        decode: decode_heart_rate,
    },
    MetricSpec {
        metric: Metric::Power,
        service: ServiceId::from_short(0x1818),
        characteristic: CharacteristicId::from_short(0x2A63),
        unit: "watts",
        decode: decode_power,
    },
];

impl Metric {
    /// Codec table entry for this metric.
    pub fn spec(self) -> &'static MetricSpec {
        match self {
            Metric::HeartRate => &METRIC_SPECS[0],
            Metric::Power => &METRIC_SPECS[1],
        }
    }

    pub fn service(self) -> ServiceId {
        self.spec().service
    }

    pub fn characteristic(self) -> CharacteristicId {
        self.spec().characteristic
    }

    /// Metric whose service matches `service`, if any.
    pub fn for_service(service: ServiceId) -> Option<Metric> {
        METRIC_SPECS
            .iter()
            .find(|spec| spec.service == service)
            .map(|spec| spec.metric)
    }
}

/// Decode a payload for `metric`. Absent, short, or malformed payloads yield `None`.
pub fn decode(metric: Metric, payload: Option<&[u8]>) -> Option<u32> {
    payload.and_then(metric.spec().decode)
}

/// Render a payload as text with units, or [`NO_READING`] if it cannot be decoded.
pub fn describe(metric: Metric, payload: Option<&[u8]>) -> String {
    match decode(metric, payload) {
        Some(value) => format!("{} {}", value, metric.spec().unit),
        None => NO_READING.to_string(),
    }
}

/// Decode a Heart Rate Measurement payload into beats per minute.
pub fn decode_heart_rate(payload: &[u8]) -> Option<u32> {
    let (&flags, rest) = payload.split_first()?;
    if flags & HR_VALUE_FORMAT_U16 != 0 {
        let bytes = rest.get(..2)?;
        Some(u32::from(u16::from_le_bytes([bytes[0], bytes[1]])))
    } else {
        rest.first().map(|&bpm| u32::from(bpm))
    }
}

/// Decode a Cycling Power Measurement payload into instantaneous watts.
pub fn decode_power(payload: &[u8]) -> Option<u32> {
    let bytes = payload.get(2..4)?;
    Some(u32::from(u16::from_le_bytes([bytes[0], bytes[1]])))
}
