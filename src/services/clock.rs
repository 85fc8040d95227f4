// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Active-duration clock for a workout session.
//!
//! Only the start of the current running segment and the total of finished
//! segments are stored. Elapsed time is recomputed from those on every query,
//! so polling frequency has no effect on the result.

use std::time::Duration;
use tokio::time::Instant;

/// Accumulates active time across start/pause/resume/stop.
#[derive(Debug, Clone, Default)]
pub struct SessionClock {
    /// Start of the current (or most recent) running segment
    started_at: Option<Instant>,
    /// Sum of all finished running segments
    accumulated: Duration,
    running: bool,
    stopped: bool,
}

impl SessionClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin timing. No-op once the clock has been started.
    pub fn start(&mut self, now: Instant) {
        if self.started_at.is_some() || self.stopped {
            return;
        }
        self.started_at = Some(now);
        self.running = true;
    }

    /// Close the current running segment. No-op while not running.
    pub fn pause(&mut self, now: Instant) {
        if !self.running {
            return;
        }
        if let Some(started_at) = self.started_at {
            self.accumulated += now.saturating_duration_since(started_at);
        }
        self.running = false;
    }

    /// Open a new running segment. Only valid while paused.
    pub fn resume(&mut self, now: Instant) {
        if self.running || self.stopped || self.started_at.is_none() {
            return;
        }
        self.started_at = Some(now);
        self.running = true;
    }

    /// Pause (if running) and freeze the clock permanently.
    pub fn stop(&mut self, now: Instant) {
        self.pause(now);
        self.stopped = true;
    }

    /// Active duration as of `now`. Pure; safe to call at any frequency.
    pub fn elapsed(&self, now: Instant) -> Duration {
        match (self.running, self.started_at) {
            (true, Some(started_at)) => {
                self.accumulated + now.saturating_duration_since(started_at)
            }
            _ => self.accumulated,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn has_started(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}
