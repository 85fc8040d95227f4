// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session lifecycle routes.

use crate::error::{AppError, Result};
use crate::models::{Activity, Sample, WorkoutRecord};
use crate::services::{SessionSnapshot, WorkoutSession};
use crate::time_utils::{format_elapsed, format_utc_rfc3339};
use crate::AppState;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/session", get(get_session).post(new_session))
        .route("/api/session/start", post(start_session))
        .route("/api/session/pause", post(pause_session))
        .route("/api/session/resume", post(resume_session))
        .route("/api/session/stop", post(stop_session))
        .route("/api/session/samples", get(get_samples))
        .route("/api/session/samples/stream", get(stream_samples))
        .route("/api/session/record", get(get_record))
}

// ─── Session View ────────────────────────────────────────────

/// Live session state for display.
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SessionResponse {
    pub activity: String,
    pub status: String,
    pub elapsed_seconds: f64,
    /// Elapsed active time as `HH:MM:SS`
    pub elapsed_display: String,
    pub sample_count: usize,
    pub started_at: Option<String>,
}

impl SessionResponse {
    fn new(activity: Activity, snapshot: SessionSnapshot) -> Self {
        Self {
            activity: activity.as_str().to_string(),
            status: snapshot.status.as_str().to_string(),
            elapsed_seconds: snapshot.elapsed.as_secs_f64(),
            elapsed_display: format_elapsed(snapshot.elapsed),
            sample_count: snapshot.sample_count,
            started_at: snapshot.started_at.map(format_utc_rfc3339),
        }
    }
}

async fn session_view(session: &WorkoutSession) -> SessionResponse {
    SessionResponse::new(session.activity(), session.snapshot().await)
}

/// Get the current session.
async fn get_session(State(state): State<Arc<AppState>>) -> Json<SessionResponse> {
    let session = state.current_session().await;
    Json(session_view(&session).await)
}

#[derive(Deserialize)]
struct NewSessionRequest {
    activity: String,
}

/// Replace a ready or completed session with a fresh one.
async fn new_session(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewSessionRequest>,
) -> Result<Json<SessionResponse>> {
    let activity: Activity = body
        .activity
        .parse()
        .map_err(|e: crate::models::activity::UnknownActivity| {
            AppError::BadRequest(e.to_string())
        })?;
    let session = state.replace_session(activity).await?;
    Ok(Json(session_view(&session).await))
}

// ─── Lifecycle Commands ──────────────────────────────────────

async fn start_session(State(state): State<Arc<AppState>>) -> Json<SessionResponse> {
    let session = state.current_session().await;
    session.start().await;
    Json(session_view(&session).await)
}

async fn pause_session(State(state): State<Arc<AppState>>) -> Json<SessionResponse> {
    let session = state.current_session().await;
    session.pause().await;
    Json(session_view(&session).await)
}

async fn resume_session(State(state): State<Arc<AppState>>) -> Json<SessionResponse> {
    let session = state.current_session().await;
    session.resume().await;
    Json(session_view(&session).await)
}

/// Stop the session and return its record (the same record on repeat calls).
async fn stop_session(State(state): State<Arc<AppState>>) -> Result<Json<RecordResponse>> {
    let session = state.current_session().await;
    let record = session
        .stop()
        .await
        .ok_or_else(|| AppError::Conflict("Session has not been started".to_string()))?;
    Ok(Json(RecordResponse::from(record.as_ref())))
}

// ─── Samples ─────────────────────────────────────────────────

/// A recorded sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SampleResponse {
    pub timestamp: String,
    pub metric: String,
    pub value: u32,
}

impl From<&Sample> for SampleResponse {
    fn from(sample: &Sample) -> Self {
        Self {
            timestamp: format_utc_rfc3339(sample.timestamp),
            metric: sample.metric.as_str().to_string(),
            value: sample.value,
        }
    }
}

async fn get_samples(State(state): State<Arc<AppState>>) -> Json<Vec<SampleResponse>> {
    let session = state.current_session().await;
    let samples = session.samples().await;
    Json(samples.iter().map(SampleResponse::from).collect())
}

/// Server-sent events carrying each sample as it is accepted.
async fn stream_samples(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let session = state.current_session().await;
    let mut rx = session.subscribe_samples();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(sample) => match Event::default()
                    .event("sample")
                    .json_data(SampleResponse::from(&sample))
                {
                    Ok(event) => {
                        yield Ok::<Event, Infallible>(event);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to encode sample event");
                    }
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Sample stream client lagging");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

// ─── Record ──────────────────────────────────────────────────

/// A finished workout.
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RecordResponse {
    pub activity: String,
    pub start: String,
    pub end: String,
    pub active_seconds: f64,
    pub paused_seconds: f64,
    pub active_display: String,
    pub samples: Vec<SampleResponse>,
}

impl From<&WorkoutRecord> for RecordResponse {
    fn from(record: &WorkoutRecord) -> Self {
        Self {
            activity: record.activity.as_str().to_string(),
            start: format_utc_rfc3339(record.start),
            end: format_utc_rfc3339(record.end),
            active_seconds: record.active_duration.as_secs_f64(),
            paused_seconds: record.paused_duration().as_secs_f64(),
            active_display: format_elapsed(record.active_duration),
            samples: record.samples.iter().map(SampleResponse::from).collect(),
        }
    }
}

async fn get_record(State(state): State<Arc<AppState>>) -> Result<Json<RecordResponse>> {
    let session = state.current_session().await;
    let record = session
        .record()
        .await
        .ok_or_else(|| AppError::NotFound("Session is not complete".to_string()))?;
    Ok(Json(RecordResponse::from(record.as_ref())))
}
