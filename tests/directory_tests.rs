// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Device discovery over the simulated transport.

use futures_util::StreamExt;
use ride_tracker::models::{ConnectionState, Metric};
use ride_tracker::services::{DeviceDirectory, DeviceEntry};
use ride_tracker::transport::SimulatedPeripheral;
use std::time::Duration;

mod common;
use common::{identity, test_transport, POWER_METER, STRAP};

async fn next_snapshot(
    stream: &mut futures_util::stream::BoxStream<'static, Vec<DeviceEntry>>,
) -> Vec<DeviceEntry> {
    tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .expect("snapshot should arrive")
        .expect("discovery should not end")
}

#[tokio::test]
async fn test_readvertisement_updates_in_place() {
    let transport = test_transport();
    let directory = DeviceDirectory::new(transport.clone());
    let mut snapshots = directory.discover(&[Metric::Power.service()]);

    let first = next_snapshot(&mut snapshots).await;
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].identity, identity(POWER_METER));
    assert_eq!(first[0].display_name.as_deref(), Some("Test Meter"));

    transport.advertise(identity(POWER_METER), Some("Crank Meter"));
    let second = next_snapshot(&mut snapshots).await;
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].display_name.as_deref(), Some("Crank Meter"));
}

#[tokio::test]
async fn test_discovery_filters_by_service() {
    let transport = test_transport();
    let directory = DeviceDirectory::new(transport.clone());

    let found = directory
        .scan_for(&[Metric::HeartRate.service()], Duration::from_millis(50))
        .await;
    assert_eq!(found.len(), 3);
    assert!(found.iter().all(|entry| entry.identity != identity(POWER_METER)));
    let strap = found
        .iter()
        .find(|entry| entry.identity == identity(STRAP))
        .expect("strap should be listed");
    assert_eq!(strap.label(), "Test Strap");
}

#[tokio::test]
async fn test_new_peripheral_appears_during_scan() {
    let transport = test_transport();
    let directory = DeviceDirectory::new(transport.clone());
    let mut snapshots = directory.discover(&[Metric::Power.service()]);
    assert_eq!(next_snapshot(&mut snapshots).await.len(), 1);

    let late = identity(0x6006);
    transport.add_peripheral(SimulatedPeripheral::new(late, None).with_metric(Metric::Power));
    let snapshot = next_snapshot(&mut snapshots).await;
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot[1].identity, late);
    assert_eq!(snapshot[1].display_name, None);
    assert!(snapshot[1].label().starts_with("Unnamed sensor"));
}

#[tokio::test]
async fn test_discovery_restarts_cleanly() {
    let transport = test_transport();
    let directory = DeviceDirectory::new(transport.clone());

    let mut first = directory.discover(&[Metric::Power.service()]);
    assert_eq!(next_snapshot(&mut first).await.len(), 1);
    drop(first);

    let mut second = directory.discover(&[Metric::Power.service()]);
    let snapshot = next_snapshot(&mut second).await;
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].state, ConnectionState::Disconnected);
}
