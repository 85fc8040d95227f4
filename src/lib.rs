// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Ride-Tracker: live workout sessions fed by wireless sensors
//!
//! This crate tracks the timing and lifecycle of a workout session while
//! discovering, connecting to, and decoding measurements from heart-rate
//! and cycling-power sensors.

pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;
pub mod transport;

use config::Config;
use error::{AppError, Result};
use models::{Activity, Metric, SensorIdentity};
use services::{DeviceDirectory, SampleSink, SensorHub, WorkoutSession};
use std::sync::Arc;
use tokio::sync::RwLock;
use transport::Transport;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    /// Current session; replaced when a new workout is set up
    pub session: RwLock<Arc<WorkoutSession>>,
    pub hub: SensorHub,
    pub directory: DeviceDirectory,
}

impl AppState {
    /// Build state around `transport` with a fresh session for the configured activity.
    pub fn new(config: Config, transport: Arc<dyn Transport>) -> Self {
        let session = WorkoutSession::with_sample_capacity(
            config.default_activity,
            config.sample_channel_capacity,
        );
        Self {
            session: RwLock::new(Arc::new(session)),
            hub: SensorHub::new(Arc::clone(&transport)),
            directory: DeviceDirectory::new(transport),
            config,
        }
    }

    pub async fn current_session(&self) -> Arc<WorkoutSession> {
        Arc::clone(&*self.session.read().await)
    }

    /// Swap in a new `Ready` session for `activity`.
    ///
    /// Refused while the current session is in progress or paused. Sensors
    /// streaming into the old session are disconnected, and binds still
    /// connecting for it are cancelled.
    pub async fn replace_session(&self, activity: Activity) -> Result<Arc<WorkoutSession>> {
        let mut slot = self.session.write().await;
        let status = slot.status().await;
        if status.accepts_samples() {
            return Err(AppError::Conflict(format!(
                "Current session is {}; stop it first",
                status.as_str()
            )));
        }
        let session = Arc::new(WorkoutSession::with_sample_capacity(
            activity,
            self.config.sample_channel_capacity,
        ));
        *slot = Arc::clone(&session);
        // Still under the slot lock, so no bind can pair the new session
        // with the old generation
        self.hub.disconnect_all().await;
        drop(slot);

        tracing::info!(activity = %activity, "New session ready");
        Ok(session)
    }

    /// Bind `identity` for `metric`, streaming into the current session.
    pub async fn connect_sensor(&self, metric: Metric, identity: SensorIdentity) -> Result<()> {
        let (sink, generation) = {
            let slot = self.session.read().await;
            let session = Arc::clone(&*slot);
            let sink: Arc<dyn SampleSink> = session;
            (sink, self.hub.generation().await)
        };
        self.hub
            .connect_sensor_in(generation, metric, identity, sink)
            .await?;
        Ok(())
    }
}
