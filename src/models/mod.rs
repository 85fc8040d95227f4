// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod activity;
pub mod record;
pub mod sample;
pub mod sensor;

pub use activity::Activity;
pub use record::WorkoutRecord;
pub use sample::{Metric, Sample};
pub use sensor::{
    CharacteristicId, ConnectionState, PeripheralAdvertisement, SensorIdentity, ServiceId,
};
