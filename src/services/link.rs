// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Connection to one sensor for one metric.
//!
//! Handles the full pipeline:
//! 1. Connect to the peripheral
//! 2. Resolve the metric's service and characteristic
//! 3. Subscribe to notifications and decode each payload
//! 4. Forward decoded samples, in delivery order, to a [`SampleSink`]
//!
//! Malformed payloads are dropped without interrupting the stream. Once a
//! link is cancelled it never delivers another sample, even if the transport
//! still has a buffered notification. If the notification stream ends on its
//! own the link moves to [`LinkState::Lost`].

use crate::models::{Metric, Sample, SensorIdentity};
use crate::services::codec;
use crate::services::session::SampleSink;
use crate::transport::{CharacteristicHandle, LinkError, Transport};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Progress of a link through its pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    Connected,
    Subscribed,
    Streaming,
    /// The transport dropped the link while streaming
    Lost,
}

struct LinkInner {
    characteristic: Option<CharacteristicHandle>,
    cancel: CancellationToken,
    forwarder: Option<JoinHandle<()>>,
}

/// One logical connection to one peripheral for one metric.
pub struct SensorLink {
    transport: Arc<dyn Transport>,
    identity: SensorIdentity,
    metric: Metric,
    state: Arc<watch::Sender<LinkState>>,
    inner: Mutex<LinkInner>,
}

impl SensorLink {
    pub fn new(transport: Arc<dyn Transport>, identity: SensorIdentity, metric: Metric) -> Self {
        let (state, _) = watch::channel(LinkState::Idle);
        Self {
            transport,
            identity,
            metric,
            state: Arc::new(state),
            inner: Mutex::new(LinkInner {
                characteristic: None,
                cancel: CancellationToken::new(),
                forwarder: None,
            }),
        }
    }

    pub fn identity(&self) -> SensorIdentity {
        self.identity
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    /// Live view of the link state.
    pub fn watch_state(&self) -> watch::Receiver<LinkState> {
        self.state.subscribe()
    }

    /// Establish the transport link. Idempotent.
    pub async fn connect(&self) -> Result<(), LinkError> {
        let _inner = self.inner.lock().await;
        self.connect_locked().await
    }

    /// Resolve service and characteristic on the connected peripheral,
    /// connecting first if needed. Idempotent.
    pub async fn subscribe(&self) -> Result<CharacteristicHandle, LinkError> {
        let mut inner = self.inner.lock().await;
        self.subscribe_locked(&mut inner).await
    }

    /// Lazy stream of decoded samples. Malformed payloads are skipped.
    ///
    /// The stream ends when the link is disconnected. A link has a single
    /// consumer, so this fails with [`LinkError::Busy`] while streaming.
    pub async fn samples(&self) -> Result<BoxStream<'static, Sample>, LinkError> {
        let mut inner = self.inner.lock().await;
        self.ensure_not_streaming()?;
        let handle = self.subscribe_locked(&mut inner).await?;
        let payloads = self.transport.notifications(&handle).await?;
        self.state.send_replace(LinkState::Streaming);
        let cancelled = inner.cancel.clone().cancelled_owned();
        Ok(decode_payloads(self.metric, self.identity, payloads)
            .take_until(cancelled)
            .boxed())
    }

    /// Start forwarding decoded samples into `sink`.
    ///
    /// Fails with [`LinkError::Busy`] if the link is already streaming.
    pub async fn attach(&self, sink: Arc<dyn SampleSink>) -> Result<(), LinkError> {
        let mut inner = self.inner.lock().await;
        self.ensure_not_streaming()?;
        let handle = self.subscribe_locked(&mut inner).await?;
        let payloads = self.transport.notifications(&handle).await?;

        let cancel = inner.cancel.clone();
        let state = Arc::clone(&self.state);
        let metric = self.metric;
        let identity = self.identity;
        self.state.send_replace(LinkState::Streaming);
        inner.forwarder = Some(tokio::spawn(async move {
            forward_samples(metric, identity, payloads, sink, cancel, state).await;
        }));
        tracing::info!(identity = %self.identity, metric = %self.metric, "Sensor streaming");
        Ok(())
    }

    /// Stop streaming and release the transport link.
    ///
    /// Teardown failures are logged and swallowed. Safe to call repeatedly
    /// and from any state; the link returns to `Idle`.
    pub async fn disconnect(&self) {
        self.teardown(true).await;
    }

    /// Stop streaming and unsubscribe, leaving the peripheral connected for
    /// other links that share it.
    pub async fn detach(&self) {
        self.teardown(false).await;
    }

    async fn teardown(&self, close_transport: bool) {
        let mut inner = self.inner.lock().await;
        inner.cancel.cancel();
        if let Some(forwarder) = inner.forwarder.take() {
            if let Err(e) = forwarder.await {
                tracing::warn!(identity = %self.identity, error = %e, "Sample forwarder ended abnormally");
            }
        }

        if let Some(handle) = inner.characteristic.take() {
            if let Err(e) = self.transport.unsubscribe(&handle).await {
                tracing::warn!(identity = %self.identity, error = %e, "Unsubscribe failed");
            }
        }

        if self.state() != LinkState::Idle {
            if close_transport {
                if let Err(e) = self.transport.disconnect(self.identity).await {
                    tracing::warn!(identity = %self.identity, error = %e, "Disconnect failed");
                }
                tracing::info!(identity = %self.identity, metric = %self.metric, "Sensor disconnected");
            } else {
                tracing::info!(identity = %self.identity, metric = %self.metric, "Sensor detached");
            }
        }

        self.state.send_replace(LinkState::Idle);
        inner.cancel = CancellationToken::new();
    }

    fn ensure_not_streaming(&self) -> Result<(), LinkError> {
        if self.state() == LinkState::Streaming {
            return Err(LinkError::Busy(format!(
                "{} sensor {} is already streaming",
                self.metric, self.identity
            )));
        }
        Ok(())
    }

    async fn connect_locked(&self) -> Result<(), LinkError> {
        match self.state() {
            LinkState::Idle => {}
            LinkState::Lost => {
                return Err(LinkError::Connection(format!(
                    "Link to {} was lost",
                    self.identity
                )))
            }
            _ => return Ok(()),
        }
        tracing::debug!(identity = %self.identity, "Connecting to sensor");
        self.transport.connect(self.identity).await.map_err(|e| {
            tracing::warn!(identity = %self.identity, error = %e, "Sensor connection failed");
            e
        })?;
        self.state.send_replace(LinkState::Connected);
        Ok(())
    }

    async fn subscribe_locked(
        &self,
        inner: &mut LinkInner,
    ) -> Result<CharacteristicHandle, LinkError> {
        if let Some(handle) = inner.characteristic {
            return Ok(handle);
        }
        self.connect_locked().await?;

        let spec = self.metric.spec();
        let resolved = async {
            let service = self
                .transport
                .discover_service(self.identity, spec.service)
                .await?;
            self.transport
                .discover_characteristic(&service, spec.characteristic)
                .await
        }
        .await;

        let handle = resolved.map_err(|e| {
            tracing::warn!(
                identity = %self.identity,
                metric = %self.metric,
                error = %e,
                "Sensor does not expose expected measurement"
            );
            e
        })?;
        inner.characteristic = Some(handle);
        self.state.send_replace(LinkState::Subscribed);
        Ok(handle)
    }
}

/// Decode payloads for `metric`, dropping any that fail to decode.
fn decode_payloads(
    metric: Metric,
    identity: SensorIdentity,
    payloads: BoxStream<'static, Vec<u8>>,
) -> impl futures_util::Stream<Item = Sample> + Send + 'static {
    payloads.filter_map(move |payload| {
        let sample = match codec::decode(metric, Some(&payload)) {
            Some(value) => Some(Sample::now(metric, value)),
            None => {
                tracing::debug!(%identity, %metric, len = payload.len(), "Dropping malformed payload");
                None
            }
        };
        async move { sample }
    })
}

/// Forward decoded samples into `sink` until the stream ends or `cancel` fires.
///
/// A stream that ends without cancellation means the transport dropped the
/// link, and `state` is moved to `Lost`.
async fn forward_samples(
    metric: Metric,
    identity: SensorIdentity,
    payloads: BoxStream<'static, Vec<u8>>,
    sink: Arc<dyn SampleSink>,
    cancel: CancellationToken,
    state: Arc<watch::Sender<LinkState>>,
) {
    let mut samples = decode_payloads(metric, identity, payloads)
        .take_until(cancel.clone().cancelled_owned())
        .boxed();

    while let Some(sample) = samples.next().await {
        if cancel.is_cancelled() {
            break;
        }
        sink.append_sample(sample).await;
    }

    if cancel.is_cancelled() {
        tracing::debug!(%identity, %metric, "Sample forwarding stopped");
    } else {
        tracing::warn!(%identity, %metric, "Sensor link lost");
        state.send_replace(LinkState::Lost);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{SimulatedPeripheral, SimulatedTransport};
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use uuid::Uuid;

    #[derive(Default)]
    struct RecordingSink {
        samples: StdMutex<Vec<Sample>>,
    }

    #[async_trait]
    impl SampleSink for RecordingSink {
        async fn append_sample(&self, sample: Sample) -> bool {
            self.samples.lock().unwrap().push(sample);
            true
        }
    }

    fn strap() -> (Arc<SimulatedTransport>, SensorIdentity) {
        let transport = Arc::new(SimulatedTransport::new());
        let identity = SensorIdentity::new(Uuid::from_u128(7));
        transport.add_peripheral(
            SimulatedPeripheral::new(identity, Some("Strap")).with_metric(Metric::HeartRate),
        );
        (transport, identity)
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let (transport, identity) = strap();
        let link = SensorLink::new(transport.clone(), identity, Metric::HeartRate);
        link.connect().await.unwrap();
        link.connect().await.unwrap();
        assert_eq!(link.state(), LinkState::Connected);
        assert!(transport.is_connected(identity));
    }

    #[tokio::test]
    async fn test_missing_service_is_protocol_error() {
        let (transport, identity) = strap();
        let link = SensorLink::new(transport, identity, Metric::Power);
        let err = link.subscribe().await.unwrap_err();
        assert!(matches!(err, LinkError::Protocol(_)));
        // Connected but never subscribed
        assert_eq!(link.state(), LinkState::Connected);
        link.disconnect().await;
        assert_eq!(link.state(), LinkState::Idle);
    }

    #[tokio::test]
    async fn test_samples_stream_skips_malformed() {
        let (transport, identity) = strap();
        let link = SensorLink::new(transport.clone(), identity, Metric::HeartRate);
        let mut samples = link.samples().await.unwrap();

        let characteristic = Metric::HeartRate.characteristic();
        transport.notify(identity, characteristic, vec![0x00, 101]);
        transport.notify(identity, characteristic, vec![0x01]);
        transport.notify(identity, characteristic, vec![0x00, 102]);

        assert_eq!(samples.next().await.unwrap().value, 101);
        assert_eq!(samples.next().await.unwrap().value, 102);
    }

    #[tokio::test]
    async fn test_disconnect_twice_is_safe() {
        let (transport, identity) = strap();
        let link = SensorLink::new(transport.clone(), identity, Metric::HeartRate);
        link.attach(Arc::new(RecordingSink::default())).await.unwrap();
        link.disconnect().await;
        link.disconnect().await;
        assert!(!transport.is_connected(identity));
        assert_eq!(transport.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_without_connect_is_noop() {
        let (transport, identity) = strap();
        let link = SensorLink::new(transport, identity, Metric::HeartRate);
        link.disconnect().await;
        assert_eq!(link.state(), LinkState::Idle);
    }

    #[tokio::test]
    async fn test_teardown_failures_are_swallowed() {
        let (transport, identity) = strap();
        let link = SensorLink::new(transport.clone(), identity, Metric::HeartRate);
        link.attach(Arc::new(RecordingSink::default())).await.unwrap();
        transport.fail_teardown(true);
        link.disconnect().await;
        assert_eq!(link.state(), LinkState::Idle);
    }

    #[tokio::test]
    async fn test_second_consumer_is_refused() {
        let (transport, identity) = strap();
        let link = SensorLink::new(transport.clone(), identity, Metric::HeartRate);
        let sink = Arc::new(RecordingSink::default());
        link.attach(sink.clone()).await.unwrap();

        assert!(matches!(link.samples().await, Err(LinkError::Busy(_))));
        assert!(matches!(link.attach(sink.clone()).await, Err(LinkError::Busy(_))));

        // The attached forwarder still receives notifications
        let characteristic = Metric::HeartRate.characteristic();
        assert!(transport.notify(identity, characteristic, vec![0x00, 77]));
        for _ in 0..100 {
            if !sink.samples.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let values: Vec<u32> = sink.samples.lock().unwrap().iter().map(|s| s.value).collect();
        assert_eq!(values, vec![77]);
        link.disconnect().await;
    }

    #[tokio::test]
    async fn test_transport_drop_marks_link_lost() {
        let (transport, identity) = strap();
        let link = SensorLink::new(transport.clone(), identity, Metric::HeartRate);
        link.attach(Arc::new(RecordingSink::default())).await.unwrap();

        let mut state = link.watch_state();
        transport.set_reachable(identity, false);
        state.wait_for(|s| *s == LinkState::Lost).await.unwrap();

        let err = link.connect().await.unwrap_err();
        assert!(matches!(err, LinkError::Connection(_)));
        link.disconnect().await;
        assert_eq!(link.state(), LinkState::Idle);
    }
}
