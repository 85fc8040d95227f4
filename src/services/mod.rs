// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - session timing and the sensor pipeline.

pub mod clock;
pub mod codec;
pub mod directory;
pub mod hub;
pub mod link;
pub mod selection;
pub mod session;

pub use clock::SessionClock;
pub use directory::{DeviceDirectory, DeviceEntry, DiscoveredDevices};
pub use hub::SensorHub;
pub use link::{LinkState, SensorLink};
pub use selection::SensorSelection;
pub use session::{SampleSink, SessionSnapshot, SessionStatus, WorkoutSession};
