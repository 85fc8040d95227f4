// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request};
use axum::response::Response;
use ride_tracker::config::Config;
use futures_util::stream::BoxStream;
use ride_tracker::models::{
    CharacteristicId, Metric, PeripheralAdvertisement, SensorIdentity, ServiceId,
};
use ride_tracker::routes::create_router;
use ride_tracker::transport::{
    CharacteristicHandle, LinkError, ServiceHandle, SimulatedPeripheral, SimulatedTransport,
    Transport,
};
use ride_tracker::AppState;
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use uuid::Uuid;

/// Heart-rate strap registered by [`test_transport`].
#[allow(dead_code)]
pub const STRAP: u128 = 0x1001;
/// Power meter registered by [`test_transport`].
#[allow(dead_code)]
pub const POWER_METER: u128 = 0x2002;
/// Advertises heart rate but has no measurement characteristic.
#[allow(dead_code)]
pub const BROKEN_STRAP: u128 = 0x3003;
/// Heart-rate strap that is out of range.
#[allow(dead_code)]
pub const FAR_STRAP: u128 = 0x4004;

#[allow(dead_code)]
pub fn identity(n: u128) -> SensorIdentity {
    SensorIdentity::new(Uuid::from_u128(n))
}

/// Transport with a strap, a power meter, and two misbehaving straps.
#[allow(dead_code)]
pub fn test_transport() -> Arc<SimulatedTransport> {
    let transport = Arc::new(SimulatedTransport::new());
    transport.add_peripheral(
        SimulatedPeripheral::new(identity(STRAP), Some("Test Strap"))
            .with_metric(Metric::HeartRate),
    );
    transport.add_peripheral(
        SimulatedPeripheral::new(identity(POWER_METER), Some("Test Meter"))
            .with_metric(Metric::Power),
    );
    transport.add_peripheral(
        SimulatedPeripheral::new(identity(BROKEN_STRAP), None)
            .with_service(Metric::HeartRate.service(), vec![]),
    );
    transport.add_peripheral(
        SimulatedPeripheral::new(identity(FAR_STRAP), Some("Far Strap"))
            .with_metric(Metric::HeartRate)
            .unreachable(),
    );
    transport
}

/// Create a test app over [`test_transport`].
/// Returns the router, the shared state, and the transport for scripting.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>, Arc<SimulatedTransport>) {
    let transport = test_transport();
    let state = Arc::new(AppState::new(Config::test_default(), transport.clone()));
    (create_router(state.clone()), state, transport)
}

#[allow(dead_code)]
pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[allow(dead_code)]
pub fn post(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[allow(dead_code)]
pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Read and deserialize a JSON response body.
#[allow(dead_code)]
pub async fn read_json<T: DeserializeOwned>(response: Response) -> T {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Wraps a [`SimulatedTransport`] and holds `connect` for one peripheral
/// until [`GatedTransport::open`] is called.
#[allow(dead_code)]
pub struct GatedTransport {
    inner: Arc<SimulatedTransport>,
    gated: SensorIdentity,
    gate: Semaphore,
    waiting: AtomicUsize,
}

#[allow(dead_code)]
impl GatedTransport {
    pub fn new(inner: Arc<SimulatedTransport>, gated: SensorIdentity) -> Self {
        Self {
            inner,
            gated,
            gate: Semaphore::new(0),
            waiting: AtomicUsize::new(0),
        }
    }

    /// Release every held and future connect. Closing the semaphore wakes all waiters.
    pub fn open(&self) {
        self.gate.close();
    }

    /// Wait until a connect to the gated peripheral is being held.
    pub async fn wait_until_held(&self) {
        while self.waiting.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl Transport for GatedTransport {
    fn scan(&self, services: &[ServiceId]) -> BoxStream<'static, PeripheralAdvertisement> {
        self.inner.scan(services)
    }

    async fn connect(&self, identity: SensorIdentity) -> Result<(), LinkError> {
        if identity == self.gated {
            self.waiting.fetch_add(1, Ordering::SeqCst);
            let _ = self.gate.acquire().await;
        }
        self.inner.connect(identity).await
    }

    async fn disconnect(&self, identity: SensorIdentity) -> Result<(), LinkError> {
        self.inner.disconnect(identity).await
    }

    async fn discover_service(
        &self,
        identity: SensorIdentity,
        service: ServiceId,
    ) -> Result<ServiceHandle, LinkError> {
        self.inner.discover_service(identity, service).await
    }

    async fn discover_characteristic(
        &self,
        service: &ServiceHandle,
        characteristic: CharacteristicId,
    ) -> Result<CharacteristicHandle, LinkError> {
        self.inner
            .discover_characteristic(service, characteristic)
            .await
    }

    async fn notifications(
        &self,
        characteristic: &CharacteristicHandle,
    ) -> Result<BoxStream<'static, Vec<u8>>, LinkError> {
        self.inner.notifications(characteristic).await
    }

    async fn unsubscribe(&self, characteristic: &CharacteristicHandle) -> Result<(), LinkError> {
        self.inner.unsubscribe(characteristic).await
    }
}
