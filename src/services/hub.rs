// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Owner of the live sensor links for the running application.
//!
//! The hub lock only guards bookkeeping. Connecting, subscribing and tearing
//! down links all happen outside it, so a peripheral that never answers
//! cannot stall binds for other metrics, `bindings()` or `disconnect_all()`.

use crate::models::{Metric, SensorIdentity, ServiceId};
use crate::services::link::{LinkState, SensorLink};
use crate::services::selection::SensorSelection;
use crate::services::session::SampleSink;
use crate::transport::{LinkError, Transport};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Default)]
struct HubInner {
    selection: SensorSelection,
    links: HashMap<ServiceId, Arc<SensorLink>>,
    /// Services with a bind in flight, tagged with the generation it started in
    pending: HashMap<ServiceId, u64>,
    /// Links (bound or still connecting) per peripheral
    peripheral_users: HashMap<SensorIdentity, usize>,
    /// Bumped by `disconnect_all`; binds started earlier are discarded
    generation: u64,
}

impl HubInner {
    fn acquire(&mut self, identity: SensorIdentity) {
        *self.peripheral_users.entry(identity).or_default() += 1;
    }

    /// Drop one user of `identity`. Returns true if it was the last one.
    fn release(&mut self, identity: SensorIdentity) -> bool {
        match self.peripheral_users.get_mut(&identity) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            _ => {
                self.peripheral_users.remove(&identity);
                true
            }
        }
    }

    fn finish_pending(&mut self, service: ServiceId, generation: u64) {
        if self.pending.get(&service) == Some(&generation) {
            self.pending.remove(&service);
        }
    }
}

/// Binds at most one streaming sensor per metric and tears down replaced links.
pub struct SensorHub {
    transport: Arc<dyn Transport>,
    inner: Arc<Mutex<HubInner>>,
}

impl SensorHub {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            inner: Arc::new(Mutex::new(HubInner::default())),
        }
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    /// Current bind generation. Pass it to [`SensorHub::connect_sensor_in`]
    /// to have the bind discarded if `disconnect_all` runs meanwhile.
    pub async fn generation(&self) -> u64 {
        self.inner.lock().await.generation
    }

    /// Connect `identity` for `metric` and stream its samples into `sink`.
    pub async fn connect_sensor(
        &self,
        metric: Metric,
        identity: SensorIdentity,
        sink: Arc<dyn SampleSink>,
    ) -> Result<(), LinkError> {
        let generation = self.generation().await;
        self.connect_sensor_in(generation, metric, identity, sink)
            .await
    }

    /// Connect `identity` for `metric` as part of bind `generation`.
    ///
    /// The new link is fully established before the binding changes, so a
    /// failed attempt leaves any existing sensor for this metric in place.
    /// A replaced sensor is released. Only one bind per metric may be in
    /// flight; a second one fails with [`LinkError::Busy`], as does a bind
    /// whose generation was invalidated by `disconnect_all`.
    pub async fn connect_sensor_in(
        &self,
        generation: u64,
        metric: Metric,
        identity: SensorIdentity,
        sink: Arc<dyn SampleSink>,
    ) -> Result<(), LinkError> {
        let service = metric.service();
        {
            let mut inner = self.inner.lock().await;
            if inner.generation != generation {
                return Err(superseded(metric));
            }
            if inner.selection.get(service) == Some(identity) {
                tracing::debug!(%identity, %metric, "Sensor already bound");
                return Ok(());
            }
            if inner.pending.contains_key(&service) {
                return Err(LinkError::Busy(format!(
                    "A {metric} sensor is already connecting"
                )));
            }
            inner.pending.insert(service, generation);
            inner.acquire(identity);
        }

        let link = Arc::new(SensorLink::new(Arc::clone(&self.transport), identity, metric));
        if let Err(e) = link.attach(sink).await {
            let last_user = {
                let mut inner = self.inner.lock().await;
                inner.finish_pending(service, generation);
                inner.release(identity)
            };
            // Release whatever part of the link was established
            release_link(&link, last_user).await;
            return Err(e);
        }

        let mut inner = self.inner.lock().await;
        inner.finish_pending(service, generation);
        if inner.generation != generation {
            let last_user = inner.release(identity);
            drop(inner);
            release_link(&link, last_user).await;
            return Err(superseded(metric));
        }

        let evicted = inner.selection.rebind(service, identity);
        let old_link = inner.links.insert(service, Arc::clone(&link));
        let replaced = old_link.map(|old| {
            let last_user = inner.release(old.identity());
            (old, last_user)
        });
        drop(inner);

        self.supervise(service, link);
        if let Some(previous) = evicted {
            tracing::info!(%previous, replacement = %identity, %metric, "Replacing sensor");
        }
        if let Some((old_link, last_user)) = replaced {
            release_link(&old_link, last_user).await;
        }
        Ok(())
    }

    /// Disconnect the sensor bound to `metric`. Returns the identity that was bound.
    pub async fn disconnect_sensor(&self, metric: Metric) -> Option<SensorIdentity> {
        let service = metric.service();
        let (identity, released) = {
            let mut inner = self.inner.lock().await;
            let identity = inner.selection.unbind(service);
            let link = inner.links.remove(&service);
            let released = link.map(|link| {
                let last_user = inner.release(link.identity());
                (link, last_user)
            });
            (identity, released)
        };
        if let Some((link, last_user)) = released {
            release_link(&link, last_user).await;
        }
        identity
    }

    /// Disconnect every bound sensor and invalidate binds still in flight.
    pub async fn disconnect_all(&self) {
        let released: Vec<(Arc<SensorLink>, bool)> = {
            let mut inner = self.inner.lock().await;
            inner.generation += 1;
            inner.pending.clear();
            inner.selection = SensorSelection::new();
            let links: Vec<Arc<SensorLink>> = inner.links.drain().map(|(_, link)| link).collect();
            links
                .into_iter()
                .map(|link| {
                    let last_user = inner.release(link.identity());
                    (link, last_user)
                })
                .collect()
        };
        for (link, last_user) in released {
            release_link(&link, last_user).await;
        }
    }

    /// Current metric-to-sensor bindings.
    pub async fn bindings(&self) -> Vec<(Metric, SensorIdentity)> {
        let inner = self.inner.lock().await;
        inner
            .selection
            .bindings()
            .filter_map(|(service, identity)| {
                Metric::for_service(service).map(|metric| (metric, identity))
            })
            .collect()
    }

    /// Drop the binding for `link` if the transport loses it.
    fn supervise(&self, service: ServiceId, link: Arc<SensorLink>) {
        let inner = Arc::clone(&self.inner);
        let mut state = link.watch_state();
        tokio::spawn(async move {
            let ended = state
                .wait_for(|s| matches!(s, LinkState::Lost | LinkState::Idle))
                .await
                .map(|s| *s);
            if !matches!(ended, Ok(LinkState::Lost)) {
                return;
            }

            let last_user = {
                let mut inner = inner.lock().await;
                let still_bound = inner
                    .links
                    .get(&service)
                    .is_some_and(|bound| Arc::ptr_eq(bound, &link));
                if !still_bound {
                    return;
                }
                inner.links.remove(&service);
                let _ = inner.selection.unbind(service);
                inner.release(link.identity())
            };
            tracing::warn!(
                identity = %link.identity(),
                metric = %link.metric(),
                "Sensor lost; binding removed"
            );
            release_link(&link, last_user).await;
        });
    }
}

fn superseded(metric: Metric) -> LinkError {
    LinkError::Busy(format!("{metric} bind was cancelled by a session change"))
}

/// Tear down `link`, closing the transport link only for the last user.
async fn release_link(link: &SensorLink, last_user: bool) {
    if last_user {
        link.disconnect().await;
    } else {
        link.detach().await;
    }
}
