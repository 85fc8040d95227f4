// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Completed workout record.

use crate::models::{Activity, Metric, Sample};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Immutable record of a finished session, created once at the `Complete`
/// transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkoutRecord {
    pub activity: Activity,
    /// Wall-clock time of the first `start`
    pub start: DateTime<Utc>,
    /// Wall-clock time of `stop`
    pub end: DateTime<Utc>,
    /// Time spent in progress, excluding paused intervals
    pub active_duration: Duration,
    /// Samples in the order they were accepted
    pub samples: Vec<Sample>,
}

impl WorkoutRecord {
    /// Wall-clock span between start and end. At least `active_duration`.
    pub fn wall_clock_span(&self) -> Duration {
        (self.end - self.start).to_std().unwrap_or_default()
    }

    /// Time the session spent paused.
    pub fn paused_duration(&self) -> Duration {
        self.wall_clock_span().saturating_sub(self.active_duration)
    }

    /// Samples for one metric, in recorded order.
    pub fn samples_for(&self, metric: Metric) -> impl Iterator<Item = &Sample> {
        self.samples.iter().filter(move |s| s.metric == metric)
    }
}
