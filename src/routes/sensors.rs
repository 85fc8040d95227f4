// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Device discovery and sensor binding routes.

use crate::error::{AppError, Result};
use crate::models::{Metric, SensorIdentity};
use crate::services::DeviceEntry;
use crate::AppState;
use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use uuid::Uuid;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/devices/{metric}", get(list_devices))
        .route("/api/devices/{metric}/stream", get(stream_devices))
        .route("/api/sensors", get(list_sensors))
        .route(
            "/api/sensors/{metric}",
            axum::routing::put(connect_sensor).delete(disconnect_sensor),
        )
}

// ─── Discovery ───────────────────────────────────────────────

/// A discoverable peripheral.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct DeviceResponse {
    pub identity: String,
    /// Name to show; falls back to a generated label for anonymous sensors
    pub label: String,
    pub display_name: Option<String>,
    pub state: String,
}

impl From<&DeviceEntry> for DeviceResponse {
    fn from(entry: &DeviceEntry) -> Self {
        Self {
            identity: entry.identity.to_string(),
            label: entry.label(),
            display_name: entry.display_name.clone(),
            state: entry.state.as_str().to_string(),
        }
    }
}

/// Scan for the configured window and list what was found.
async fn list_devices(
    State(state): State<Arc<AppState>>,
    Path(metric): Path<Metric>,
) -> Json<Vec<DeviceResponse>> {
    let entries = state
        .directory
        .scan_for(&[metric.service()], state.config.scan_window)
        .await;
    Json(entries.iter().map(DeviceResponse::from).collect())
}

/// Server-sent events with the device list after every change.
///
/// The scan runs for as long as the client stays connected.
async fn stream_devices(
    State(state): State<Arc<AppState>>,
    Path(metric): Path<Metric>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let snapshots = state.directory.discover(&[metric.service()]);
    let events = snapshots.filter_map(|entries| async move {
        let body: Vec<DeviceResponse> = entries.iter().map(DeviceResponse::from).collect();
        match Event::default().event("devices").json_data(body) {
            Ok(event) => Some(Ok::<Event, Infallible>(event)),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode device event");
                None
            }
        }
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

// ─── Bindings ────────────────────────────────────────────────

/// A sensor bound to a metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct BindingResponse {
    pub metric: String,
    pub identity: String,
}

impl BindingResponse {
    fn new(metric: Metric, identity: SensorIdentity) -> Self {
        Self {
            metric: metric.as_str().to_string(),
            identity: identity.to_string(),
        }
    }
}

async fn list_sensors(State(state): State<Arc<AppState>>) -> Json<Vec<BindingResponse>> {
    let bindings = state.hub.bindings().await;
    Json(
        bindings
            .into_iter()
            .map(|(metric, identity)| BindingResponse::new(metric, identity))
            .collect(),
    )
}

#[derive(Deserialize)]
struct ConnectSensorRequest {
    identity: String,
}

/// Connect a sensor for `metric`, replacing any sensor already bound.
async fn connect_sensor(
    State(state): State<Arc<AppState>>,
    Path(metric): Path<Metric>,
    Json(body): Json<ConnectSensorRequest>,
) -> Result<Json<BindingResponse>> {
    let identity = Uuid::parse_str(body.identity.trim())
        .map(SensorIdentity::new)
        .map_err(|_| AppError::BadRequest("Invalid 'identity': must be a UUID".to_string()))?;

    state.connect_sensor(metric, identity).await?;

    tracing::info!(%identity, %metric, "Sensor bound");
    Ok(Json(BindingResponse::new(metric, identity)))
}

/// Disconnect the sensor bound to `metric`.
async fn disconnect_sensor(
    State(state): State<Arc<AppState>>,
    Path(metric): Path<Metric>,
) -> Result<Json<BindingResponse>> {
    let identity = state
        .hub
        .disconnect_sensor(metric)
        .await
        .ok_or_else(|| AppError::NotFound(format!("No {metric} sensor is connected")))?;
    Ok(Json(BindingResponse::new(metric, identity)))
}
