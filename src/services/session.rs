// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Workout session lifecycle.
//!
//! ```text
//! Ready ──start──▶ InProgress ◀──resume── Paused
//!                       │ └────pause─────────▲
//!                       └──stop──▶ Complete ◀──stop── (Paused)
//! ```
//!
//! Every transition is total: events that do not apply in the current state
//! are no-ops. Clock, samples and status live behind one lock, so concurrent
//! commands are serialized and readers always see a consistent snapshot.

use crate::models::{Activity, Sample, WorkoutRecord};
use crate::services::clock::SessionClock;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, RwLock};
use tokio::time::Instant;

/// Default capacity of the live sample broadcast.
pub const DEFAULT_SAMPLE_CHANNEL_CAPACITY: usize = 256;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Ready,
    InProgress,
    Paused,
    Complete,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Ready => "ready",
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Paused => "paused",
            SessionStatus::Complete => "complete",
        }
    }

    /// Whether samples are accepted in this state.
    pub fn accepts_samples(&self) -> bool {
        matches!(self, SessionStatus::InProgress | SessionStatus::Paused)
    }
}

/// The single append capability sensor links write through.
#[async_trait]
pub trait SampleSink: Send + Sync {
    /// Offer a sample. Returns whether it was kept.
    async fn append_sample(&self, sample: Sample) -> bool;
}

/// Consistent point-in-time view of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub elapsed: Duration,
    pub sample_count: usize,
    pub started_at: Option<DateTime<Utc>>,
}

struct SessionState {
    status: SessionStatus,
    clock: SessionClock,
    /// Wall-clock and monotonic time of the first start
    started: Option<(DateTime<Utc>, Instant)>,
    samples: Vec<Sample>,
    record: Option<Arc<WorkoutRecord>>,
}

/// A live workout: clock, samples and lifecycle.
pub struct WorkoutSession {
    activity: Activity,
    state: RwLock<SessionState>,
    sample_tx: broadcast::Sender<Sample>,
    status_tx: watch::Sender<SessionStatus>,
}

impl WorkoutSession {
    pub fn new(activity: Activity) -> Self {
        Self::with_sample_capacity(activity, DEFAULT_SAMPLE_CHANNEL_CAPACITY)
    }

    /// Create a session whose live sample feed buffers `capacity` samples per
    /// subscriber.
    pub fn with_sample_capacity(activity: Activity, capacity: usize) -> Self {
        let (sample_tx, _) = broadcast::channel(capacity.max(1));
        let (status_tx, _) = watch::channel(SessionStatus::Ready);
        Self {
            activity,
            state: RwLock::new(SessionState {
                status: SessionStatus::Ready,
                clock: SessionClock::new(),
                started: None,
                samples: Vec::new(),
                record: None,
            }),
            sample_tx,
            status_tx,
        }
    }

    pub fn activity(&self) -> Activity {
        self.activity
    }

    pub async fn status(&self) -> SessionStatus {
        self.state.read().await.status
    }

    /// Active duration as of now.
    pub async fn elapsed(&self) -> Duration {
        self.elapsed_at(Instant::now()).await
    }

    /// Active duration as of `now`.
    pub async fn elapsed_at(&self, now: Instant) -> Duration {
        self.state.read().await.clock.elapsed(now)
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let now = Instant::now();
        let state = self.state.read().await;
        SessionSnapshot {
            status: state.status,
            elapsed: state.clock.elapsed(now),
            sample_count: state.samples.len(),
            started_at: state.started.map(|(wall, _)| wall),
        }
    }

    /// Copy of the samples accepted so far, in arrival order.
    pub async fn samples(&self) -> Vec<Sample> {
        self.state.read().await.samples.clone()
    }

    pub async fn sample_count(&self) -> usize {
        self.state.read().await.samples.len()
    }

    /// The finished record, once the session is complete.
    pub async fn record(&self) -> Option<Arc<WorkoutRecord>> {
        self.state.read().await.record.clone()
    }

    /// Live feed of accepted samples.
    pub fn subscribe_samples(&self) -> broadcast::Receiver<Sample> {
        self.sample_tx.subscribe()
    }

    /// Live view of the lifecycle status.
    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    /// `Ready → InProgress`. No-op elsewhere.
    pub async fn start(&self) -> SessionStatus {
        let mut state = self.state.write().await;
        if state.status == SessionStatus::Ready {
            let now = Instant::now();
            state.clock.start(now);
            state.started = Some((Utc::now(), now));
            self.transition(&mut state, SessionStatus::InProgress);
        }
        state.status
    }

    /// `InProgress → Paused`. No-op elsewhere.
    pub async fn pause(&self) -> SessionStatus {
        let mut state = self.state.write().await;
        if state.status == SessionStatus::InProgress {
            state.clock.pause(Instant::now());
            self.transition(&mut state, SessionStatus::Paused);
        }
        state.status
    }

    /// `Paused → InProgress`. No-op elsewhere.
    pub async fn resume(&self) -> SessionStatus {
        let mut state = self.state.write().await;
        if state.status == SessionStatus::Paused {
            state.clock.resume(Instant::now());
            self.transition(&mut state, SessionStatus::InProgress);
        }
        state.status
    }

    /// Finish the session and produce its record.
    ///
    /// From `InProgress` or `Paused` this freezes the clock and builds the
    /// record; from `Complete` it returns the same record again. From `Ready`
    /// there is nothing to record and `None` is returned.
    pub async fn stop(&self) -> Option<Arc<WorkoutRecord>> {
        let mut state = self.state.write().await;
        match state.status {
            SessionStatus::Ready => None,
            SessionStatus::Complete => state.record.clone(),
            SessionStatus::InProgress | SessionStatus::Paused => {
                let now = Instant::now();
                state.clock.stop(now);
                let (start, start_instant) = state.started.unwrap_or((Utc::now(), now));
                // Derive the end from monotonic time so wall-clock jumps cannot
                // shrink the span below the active duration
                let span = now.saturating_duration_since(start_instant);
                let end = start + chrono::Duration::from_std(span).unwrap_or_default();
                let record = Arc::new(WorkoutRecord {
                    activity: self.activity,
                    start,
                    end,
                    active_duration: state.clock.elapsed(now),
                    samples: state.samples.clone(),
                });
                state.record = Some(Arc::clone(&record));
                self.transition(&mut state, SessionStatus::Complete);
                tracing::info!(
                    activity = %self.activity,
                    active_secs = record.active_duration.as_secs(),
                    samples = record.samples.len(),
                    "Workout complete"
                );
                Some(record)
            }
        }
    }

    /// Append a sample if the session is `InProgress` or `Paused`.
    ///
    /// Samples offered while `Ready` or `Complete` are dropped silently; a
    /// sensor may deliver one last notification after stop.
    pub async fn append_sample(&self, sample: Sample) -> bool {
        let mut state = self.state.write().await;
        if !state.status.accepts_samples() {
            tracing::trace!(status = state.status.as_str(), "Dropping sample outside active session");
            return false;
        }
        state.samples.push(sample.clone());
        // Lagging or absent subscribers do not affect the session
        let _ = self.sample_tx.send(sample);
        true
    }

    fn transition(&self, state: &mut SessionState, next: SessionStatus) {
        tracing::debug!(
            from = state.status.as_str(),
            to = next.as_str(),
            "Session transition"
        );
        state.status = next;
        self.status_tx.send_replace(next);
    }
}

#[async_trait]
impl SampleSink for WorkoutSession {
    async fn append_sample(&self, sample: Sample) -> bool {
        WorkoutSession::append_sample(self, sample).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Metric;

    fn hr(value: u32) -> Sample {
        Sample::now(Metric::HeartRate, value)
    }

    #[tokio::test]
    async fn test_new_session_is_ready() {
        let session = WorkoutSession::new(Activity::IndoorRide);
        assert_eq!(session.status().await, SessionStatus::Ready);
        assert_eq!(session.elapsed().await, Duration::ZERO);
        assert!(session.record().await.is_none());
    }

    #[tokio::test]
    async fn test_transitions_follow_table() {
        let session = WorkoutSession::new(Activity::Ride);

        // Invalid from Ready
        assert_eq!(session.pause().await, SessionStatus::Ready);
        assert_eq!(session.resume().await, SessionStatus::Ready);
        assert!(session.stop().await.is_none());
        assert_eq!(session.status().await, SessionStatus::Ready);

        assert_eq!(session.start().await, SessionStatus::InProgress);
        assert_eq!(session.start().await, SessionStatus::InProgress);
        assert_eq!(session.resume().await, SessionStatus::InProgress);
        assert_eq!(session.pause().await, SessionStatus::Paused);
        assert_eq!(session.pause().await, SessionStatus::Paused);
        assert_eq!(session.start().await, SessionStatus::Paused);
        assert_eq!(session.resume().await, SessionStatus::InProgress);

        assert!(session.stop().await.is_some());
        assert_eq!(session.status().await, SessionStatus::Complete);
        assert_eq!(session.start().await, SessionStatus::Complete);
        assert_eq!(session.pause().await, SessionStatus::Complete);
        assert_eq!(session.resume().await, SessionStatus::Complete);
    }

    #[tokio::test]
    async fn test_stop_from_paused_completes() {
        let session = WorkoutSession::new(Activity::Run);
        session.start().await;
        session.pause().await;
        let record = session.stop().await.unwrap();
        assert_eq!(record.activity, Activity::Run);
        assert_eq!(session.status().await, SessionStatus::Complete);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let session = WorkoutSession::new(Activity::Ride);
        session.start().await;
        session.append_sample(hr(100)).await;
        let first = session.stop().await.unwrap();
        let second = session.stop().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*first, *second);
    }

    #[tokio::test]
    async fn test_append_rejected_when_ready_or_complete() {
        let session = WorkoutSession::new(Activity::Ride);
        assert!(!session.append_sample(hr(90)).await);
        assert_eq!(session.sample_count().await, 0);

        session.start().await;
        assert!(session.append_sample(hr(91)).await);
        session.pause().await;
        assert!(session.append_sample(hr(92)).await);
        session.stop().await;

        assert!(!session.append_sample(hr(93)).await);
        assert_eq!(session.sample_count().await, 2);
        let record = session.record().await.unwrap();
        let values: Vec<u32> = record.samples.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![91, 92]);
    }

    #[tokio::test]
    async fn test_accepted_samples_are_broadcast() {
        let session = WorkoutSession::new(Activity::Ride);
        let mut rx = session.subscribe_samples();
        session.append_sample(hr(80)).await;
        session.start().await;
        session.append_sample(hr(81)).await;
        assert_eq!(rx.recv().await.unwrap().value, 81);
    }

    #[tokio::test]
    async fn test_status_watch_tracks_transitions() {
        let session = WorkoutSession::new(Activity::Ride);
        let rx = session.watch_status();
        session.start().await;
        assert_eq!(*rx.borrow(), SessionStatus::InProgress);
        session.pause().await;
        assert_eq!(*rx.borrow(), SessionStatus::Paused);
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_excludes_pause_gap() {
        let session = WorkoutSession::new(Activity::Ride);
        session.start().await;
        tokio::time::advance(Duration::from_secs(10)).await;
        session.pause().await;
        assert_eq!(session.elapsed().await, Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(session.elapsed().await, Duration::from_secs(10));

        session.resume().await;
        tokio::time::advance(Duration::from_secs(5)).await;
        let record = session.stop().await.unwrap();
        assert_eq!(record.active_duration, Duration::from_secs(15));
        assert_eq!(record.wall_clock_span(), Duration::from_secs(45));
    }

    #[tokio::test]
    async fn test_concurrent_appends_all_land() {
        let session = Arc::new(WorkoutSession::new(Activity::Ride));
        session.start().await;

        let mut handles = Vec::new();
        for i in 0..20 {
            let session = Arc::clone(&session);
            handles.push(tokio::spawn(async move {
                session.append_sample(hr(100 + i)).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }
        assert_eq!(session.sample_count().await, 20);
    }
}
