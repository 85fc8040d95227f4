// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Wireless transport abstraction.
//!
//! The radio stack (scanning, connecting, notification delivery) lives
//! outside this crate. Everything in `services` talks to it through the
//! [`Transport`] trait.

pub mod simulated;

pub use simulated::{SimulatedPeripheral, SimulatedTransport};

use crate::models::{CharacteristicId, PeripheralAdvertisement, SensorIdentity, ServiceId};
use async_trait::async_trait;
use futures_util::stream::BoxStream;

/// Errors raised by the transport or by a sensor link.
///
/// Decode failures are not errors; they are dropped by the link.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    /// The link could not be established or was lost.
    #[error("Sensor connection failed: {0}")]
    Connection(String),

    /// The peripheral is connected but lacks the expected service or characteristic.
    #[error("Sensor protocol error: {0}")]
    Protocol(String),

    /// The link or metric already has a consumer or a bind in flight.
    #[error("Sensor busy: {0}")]
    Busy(String),
}

/// A resolved service on a connected peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceHandle {
    pub peripheral: SensorIdentity,
    pub service: ServiceId,
}

/// A resolved characteristic within a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CharacteristicHandle {
    pub peripheral: SensorIdentity,
    pub service: ServiceId,
    pub characteristic: CharacteristicId,
}

/// Capability supplied by the environment to reach physical sensors.
///
/// No operation imposes a timeout; callers that need a bounded wait wrap
/// the future themselves.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Start a fresh scan for peripherals advertising any of `services`.
    ///
    /// The stream is infinite; dropping it stops the scan.
    fn scan(&self, services: &[ServiceId]) -> BoxStream<'static, PeripheralAdvertisement>;

    /// Establish a link to `identity`.
    async fn connect(&self, identity: SensorIdentity) -> Result<(), LinkError>;

    /// Tear down the link to `identity`. Best-effort.
    async fn disconnect(&self, identity: SensorIdentity) -> Result<(), LinkError>;

    /// Resolve `service` on a connected peripheral.
    async fn discover_service(
        &self,
        identity: SensorIdentity,
        service: ServiceId,
    ) -> Result<ServiceHandle, LinkError>;

    /// Resolve `characteristic` within a resolved service.
    async fn discover_characteristic(
        &self,
        service: &ServiceHandle,
        characteristic: CharacteristicId,
    ) -> Result<CharacteristicHandle, LinkError>;

    /// Subscribe to notifications and return the payload stream.
    ///
    /// The stream ends when the subscription is removed or the link drops.
    async fn notifications(
        &self,
        characteristic: &CharacteristicHandle,
    ) -> Result<BoxStream<'static, Vec<u8>>, LinkError>;

    /// Remove a notification subscription. Best-effort.
    async fn unsubscribe(&self, characteristic: &CharacteristicHandle) -> Result<(), LinkError>;
}
