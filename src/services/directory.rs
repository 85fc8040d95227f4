// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Discovery of peripherals advertising a requested capability.

use crate::models::{ConnectionState, PeripheralAdvertisement, SensorIdentity, ServiceId};
use crate::transport::Transport;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// One discoverable peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceEntry {
    pub identity: SensorIdentity,
    pub display_name: Option<String>,
    pub state: ConnectionState,
}

impl DeviceEntry {
    /// Name to show in a picker; anonymous peripherals fall back to their identity.
    pub fn label(&self) -> String {
        match &self.display_name {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => format!("Unnamed sensor {}", short_id(self.identity)),
        }
    }
}

fn short_id(identity: SensorIdentity) -> String {
    let simple = identity.0.simple().to_string();
    simple[simple.len().saturating_sub(6)..].to_string()
}

impl From<PeripheralAdvertisement> for DeviceEntry {
    fn from(adv: PeripheralAdvertisement) -> Self {
        Self {
            identity: adv.identity,
            display_name: adv.display_name,
            state: adv.state,
        }
    }
}

/// Deduplicated, insertion-ordered set of discovered peripherals.
#[derive(Debug, Clone, Default)]
pub struct DiscoveredDevices {
    entries: Vec<DeviceEntry>,
}

impl DiscoveredDevices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update in place. Returns whether anything changed.
    pub fn upsert(&mut self, advertisement: PeripheralAdvertisement) -> bool {
        let entry = DeviceEntry::from(advertisement);
        match self.entries.iter_mut().find(|e| e.identity == entry.identity) {
            Some(existing) if *existing == entry => false,
            Some(existing) => {
                *existing = entry;
                true
            }
            None => {
                self.entries.push(entry);
                true
            }
        }
    }

    pub fn entries(&self) -> &[DeviceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Surfaces candidate peripherals for selection.
#[derive(Clone)]
pub struct DeviceDirectory {
    transport: Arc<dyn Transport>,
}

impl DeviceDirectory {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Scan for peripherals offering any of `services`.
    ///
    /// Each item is the full deduplicated list after a change. The stream is
    /// infinite; dropping it stops the underlying scan, and calling again
    /// starts a fresh one.
    pub fn discover(&self, services: &[ServiceId]) -> BoxStream<'static, Vec<DeviceEntry>> {
        let mut advertisements = self.transport.scan(services);
        tracing::debug!(services = ?services, "Starting discovery");

        async_stream::stream! {
            let mut devices = DiscoveredDevices::new();
            while let Some(advertisement) = advertisements.next().await {
                if devices.upsert(advertisement) {
                    yield devices.entries().to_vec();
                }
            }
        }
        .boxed()
    }

    /// Scan for `window` and return the last list seen.
    pub async fn scan_for(&self, services: &[ServiceId], window: Duration) -> Vec<DeviceEntry> {
        let mut snapshots = self.discover(services);
        let mut latest = Vec::new();
        let deadline = tokio::time::sleep(window);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                () = &mut deadline => break,
                next = snapshots.next() => match next {
                    Some(snapshot) => latest = snapshot,
                    None => break,
                },
            }
        }
        tracing::debug!(found = latest.len(), "Discovery window closed");
        latest
    }
}
