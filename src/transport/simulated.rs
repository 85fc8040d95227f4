// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process transport with scripted peripherals.
//!
//! Used by the server binary when no radio stack is attached, and by tests
//! to drive advertisements, connection failures and notification payloads.

use super::{CharacteristicHandle, LinkError, ServiceHandle, Transport};
use crate::models::{
    CharacteristicId, ConnectionState, Metric, PeripheralAdvertisement, SensorIdentity, ServiceId,
};
use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const ADVERTISEMENT_CHANNEL_CAPACITY: usize = 64;

/// A scripted peripheral and the GATT layout it exposes.
#[derive(Debug, Clone)]
pub struct SimulatedPeripheral {
    pub identity: SensorIdentity,
    pub display_name: Option<String>,
    pub services: HashMap<ServiceId, Vec<CharacteristicId>>,
    /// Whether connection attempts succeed
    pub reachable: bool,
}

impl SimulatedPeripheral {
    pub fn new(identity: SensorIdentity, display_name: Option<&str>) -> Self {
        Self {
            identity,
            display_name: display_name.map(str::to_string),
            services: HashMap::new(),
            reachable: true,
        }
    }

    /// Expose the standard service and measurement characteristic for `metric`.
    pub fn with_metric(self, metric: Metric) -> Self {
        self.with_service(metric.service(), vec![metric.characteristic()])
    }

    /// Expose an arbitrary service layout (possibly missing characteristics).
    pub fn with_service(
        mut self,
        service: ServiceId,
        characteristics: Vec<CharacteristicId>,
    ) -> Self {
        self.services.insert(service, characteristics);
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    fn advertises_any(&self, services: &[ServiceId]) -> bool {
        services.is_empty() || services.iter().any(|s| self.services.contains_key(s))
    }
}

/// Scripted [`Transport`] implementation.
pub struct SimulatedTransport {
    peripherals: DashMap<SensorIdentity, SimulatedPeripheral>,
    states: DashMap<SensorIdentity, ConnectionState>,
    subscriptions: DashMap<CharacteristicHandle, mpsc::UnboundedSender<Vec<u8>>>,
    /// Advertisements paired with the services the peripheral offers
    advertisements: broadcast::Sender<(PeripheralAdvertisement, Vec<ServiceId>)>,
    fail_teardown: AtomicBool,
}

impl Default for SimulatedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedTransport {
    pub fn new() -> Self {
        let (advertisements, _) = broadcast::channel(ADVERTISEMENT_CHANNEL_CAPACITY);
        Self {
            peripherals: DashMap::new(),
            states: DashMap::new(),
            subscriptions: DashMap::new(),
            advertisements,
            fail_teardown: AtomicBool::new(false),
        }
    }

    /// Transport preloaded with a chest strap, a power meter, and an
    /// anonymous heart-rate sensor.
    pub fn with_demo_peripherals() -> Self {
        let transport = Self::new();
        transport.add_peripheral(
            SimulatedPeripheral::new(
                SensorIdentity::new(Uuid::from_u128(0x5a1e_0001)),
                Some("HRM-Pro 4821"),
            )
            .with_metric(Metric::HeartRate),
        );
        transport.add_peripheral(
            SimulatedPeripheral::new(
                SensorIdentity::new(Uuid::from_u128(0x5a1e_0002)),
                Some("Assioma DUO 0193"),
            )
            .with_metric(Metric::Power),
        );
        transport.add_peripheral(
            SimulatedPeripheral::new(SensorIdentity::new(Uuid::from_u128(0x5a1e_0003)), None)
                .with_metric(Metric::HeartRate),
        );
        transport
    }

    /// Register a peripheral and broadcast its first advertisement.
    pub fn add_peripheral(&self, peripheral: SimulatedPeripheral) {
        let identity = peripheral.identity;
        self.peripherals.insert(identity, peripheral);
        self.broadcast_advertisement(identity);
    }

    /// Re-advertise a known peripheral, optionally under a new name.
    pub fn advertise(&self, identity: SensorIdentity, display_name: Option<&str>) {
        if let Some(mut peripheral) = self.peripherals.get_mut(&identity) {
            peripheral.display_name = display_name.map(str::to_string);
        }
        self.broadcast_advertisement(identity);
    }

    /// Change reachability. Going out of range drops the link.
    pub fn set_reachable(&self, identity: SensorIdentity, reachable: bool) {
        if let Some(mut peripheral) = self.peripherals.get_mut(&identity) {
            peripheral.reachable = reachable;
        }
        if !reachable {
            self.drop_link(identity);
        }
    }

    /// Make `disconnect` and `unsubscribe` report failures (after tearing down).
    pub fn fail_teardown(&self, fail: bool) {
        self.fail_teardown.store(fail, Ordering::SeqCst);
    }

    /// Push a notification payload to subscribers of `characteristic`.
    ///
    /// Returns false if nobody is subscribed.
    pub fn notify(
        &self,
        identity: SensorIdentity,
        characteristic: CharacteristicId,
        payload: Vec<u8>,
    ) -> bool {
        let target = self.subscriptions.iter().find(|entry| {
            entry.key().peripheral == identity && entry.key().characteristic == characteristic
        });
        match target {
            Some(entry) => entry.value().send(payload).is_ok(),
            None => false,
        }
    }

    pub fn is_connected(&self, identity: SensorIdentity) -> bool {
        self.connection_state(identity) == ConnectionState::Connected
    }

    pub fn connection_state(&self, identity: SensorIdentity) -> ConnectionState {
        self.states
            .get(&identity)
            .map(|s| *s)
            .unwrap_or(ConnectionState::Disconnected)
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Emit synthetic measurements to every subscription at `interval`
    /// until `cancel` fires.
    pub fn spawn_synthetic_feed(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let transport = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut tick: u32 = 0;
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                tick = tick.wrapping_add(1);
                transport.emit_synthetic(tick);
            }
            tracing::debug!("Synthetic sensor feed stopped");
        })
    }

    fn emit_synthetic(&self, tick: u32) {
        for entry in self.subscriptions.iter() {
            if let Some(payload) = synthetic_payload(entry.key().characteristic, tick) {
                let _ = entry.value().send(payload);
            }
        }
    }

    fn broadcast_advertisement(&self, identity: SensorIdentity) {
        let Some(peripheral) = self.peripherals.get(&identity) else {
            return;
        };
        let advertisement = PeripheralAdvertisement {
            identity,
            display_name: peripheral.display_name.clone(),
            state: self.connection_state(identity),
        };
        let services = peripheral.services.keys().copied().collect();
        drop(peripheral);
        // No receivers simply means no scan is running
        let _ = self.advertisements.send((advertisement, services));
    }

    fn drop_link(&self, identity: SensorIdentity) {
        self.subscriptions
            .retain(|handle, _| handle.peripheral != identity);
        self.states.insert(identity, ConnectionState::Disconnected);
    }

    fn require_connected(&self, identity: SensorIdentity) -> Result<(), LinkError> {
        if self.is_connected(identity) {
            Ok(())
        } else {
            Err(LinkError::Connection(format!(
                "Peripheral {identity} is not connected"
            )))
        }
    }

    fn teardown_result(&self, what: &str) -> Result<(), LinkError> {
        if self.fail_teardown.load(Ordering::SeqCst) {
            Err(LinkError::Connection(format!("{what} failed")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Transport for SimulatedTransport {
    fn scan(&self, services: &[ServiceId]) -> BoxStream<'static, PeripheralAdvertisement> {
        let wanted = services.to_vec();
        // Subscribe before taking the snapshot so nothing falls between them
        let mut rx = self.advertisements.subscribe();
        let known: Vec<PeripheralAdvertisement> = self
            .peripherals
            .iter()
            .filter(|p| p.advertises_any(&wanted))
            .map(|p| PeripheralAdvertisement {
                identity: p.identity,
                display_name: p.display_name.clone(),
                state: self.connection_state(p.identity),
            })
            .collect();

        async_stream::stream! {
            for advertisement in known {
                yield advertisement;
            }
            loop {
                match rx.recv().await {
                    Ok((advertisement, offered)) => {
                        if wanted.is_empty() || offered.iter().any(|s| wanted.contains(s)) {
                            yield advertisement;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Scan fell behind advertisements");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
        .boxed()
    }

    async fn connect(&self, identity: SensorIdentity) -> Result<(), LinkError> {
        let reachable = self.peripherals.get(&identity).map(|p| p.reachable);
        match reachable {
            None => Err(LinkError::Connection(format!(
                "Peripheral {identity} not found"
            ))),
            Some(false) => Err(LinkError::Connection(format!(
                "Peripheral {identity} is out of range"
            ))),
            Some(true) => {
                self.states.insert(identity, ConnectionState::Connected);
                Ok(())
            }
        }
    }

    async fn disconnect(&self, identity: SensorIdentity) -> Result<(), LinkError> {
        self.drop_link(identity);
        self.teardown_result("Disconnect")
    }

    async fn discover_service(
        &self,
        identity: SensorIdentity,
        service: ServiceId,
    ) -> Result<ServiceHandle, LinkError> {
        self.require_connected(identity)?;
        let present = self
            .peripherals
            .get(&identity)
            .is_some_and(|p| p.services.contains_key(&service));
        if !present {
            return Err(LinkError::Protocol(format!(
                "Service {service} not found on {identity}"
            )));
        }
        Ok(ServiceHandle {
            peripheral: identity,
            service,
        })
    }

    async fn discover_characteristic(
        &self,
        service: &ServiceHandle,
        characteristic: CharacteristicId,
    ) -> Result<CharacteristicHandle, LinkError> {
        self.require_connected(service.peripheral)?;
        let present = self.peripherals.get(&service.peripheral).is_some_and(|p| {
            p.services
                .get(&service.service)
                .is_some_and(|chars| chars.contains(&characteristic))
        });
        if !present {
            return Err(LinkError::Protocol(format!(
                "Characteristic {characteristic} not found in service {}",
                service.service
            )));
        }
        Ok(CharacteristicHandle {
            peripheral: service.peripheral,
            service: service.service,
            characteristic,
        })
    }

    async fn notifications(
        &self,
        characteristic: &CharacteristicHandle,
    ) -> Result<BoxStream<'static, Vec<u8>>, LinkError> {
        self.require_connected(characteristic.peripheral)?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscriptions.insert(*characteristic, tx);
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    async fn unsubscribe(&self, characteristic: &CharacteristicHandle) -> Result<(), LinkError> {
        self.subscriptions.remove(characteristic);
        self.teardown_result("Unsubscribe")
    }
}

/// Synthetic payload for one feed tick, in the standard GATT layout.
fn synthetic_payload(characteristic: CharacteristicId, tick: u32) -> Option<Vec<u8>> {
    if characteristic == Metric::HeartRate.characteristic() {
        let bpm = 118 + (tick % 8) * 3;
        // Alternate between the 8-bit and 16-bit encodings
        if tick % 5 == 0 {
            let [lo, hi] = (bpm as u16).to_le_bytes();
            Some(vec![0x01, lo, hi])
        } else {
            Some(vec![0x00, bpm as u8])
        }
    } else if characteristic == Metric::Power.characteristic() {
        let watts = 180 + (tick % 90) * 7 % 90;
        let [lo, hi] = (watts as u16).to_le_bytes();
        Some(vec![0x00, 0x00, lo, hi])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::codec;

    fn identity(n: u128) -> SensorIdentity {
        SensorIdentity::new(Uuid::from_u128(n))
    }

    #[tokio::test]
    async fn test_connect_unknown_peripheral_fails() {
        let transport = SimulatedTransport::new();
        let err = transport.connect(identity(9)).await.unwrap_err();
        assert!(matches!(err, LinkError::Connection(_)));
    }

    #[tokio::test]
    async fn test_scan_filters_by_service() {
        let transport = SimulatedTransport::with_demo_peripherals();
        let adverts: Vec<_> = transport
            .scan(&[Metric::Power.service()])
            .take(1)
            .collect()
            .await;
        assert_eq!(adverts[0].display_name.as_deref(), Some("Assioma DUO 0193"));
    }

    #[tokio::test]
    async fn test_notify_reaches_subscriber() {
        let transport = SimulatedTransport::new();
        let id = identity(1);
        transport.add_peripheral(
            SimulatedPeripheral::new(id, Some("strap")).with_metric(Metric::HeartRate),
        );
        transport.connect(id).await.unwrap();
        let service = transport
            .discover_service(id, Metric::HeartRate.service())
            .await
            .unwrap();
        let handle = transport
            .discover_characteristic(&service, Metric::HeartRate.characteristic())
            .await
            .unwrap();
        let mut stream = transport.notifications(&handle).await.unwrap();

        assert!(transport.notify(id, Metric::HeartRate.characteristic(), vec![0x00, 90]));
        assert_eq!(stream.next().await, Some(vec![0x00, 90]));

        transport.disconnect(id).await.unwrap();
        assert_eq!(stream.next().await, None);
        assert!(!transport.is_connected(id));
    }

    #[test]
    fn test_synthetic_payloads_near_tick_wraparound() {
        for tick in [u32::MAX - 1, u32::MAX, 0, 1] {
            let hr = synthetic_payload(Metric::HeartRate.characteristic(), tick).unwrap();
            assert!(codec::decode(Metric::HeartRate, Some(&hr)).is_some());
            let power = synthetic_payload(Metric::Power.characteristic(), tick).unwrap();
            assert!(codec::decode(Metric::Power, Some(&power)).is_some());
        }
    }

    #[test]
    fn test_synthetic_payloads_decode() {
        for tick in 1..20 {
            let hr = synthetic_payload(Metric::HeartRate.characteristic(), tick).unwrap();
            let bpm = codec::decode(Metric::HeartRate, Some(&hr)).unwrap();
            assert!((118..142).contains(&bpm));

            let power = synthetic_payload(Metric::Power.characteristic(), tick).unwrap();
            let watts = codec::decode(Metric::Power, Some(&power)).unwrap();
            assert!((180..270).contains(&watts));
        }
    }
}
