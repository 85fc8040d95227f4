// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Measurement samples produced by sensor links.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of measurement a sensor link produces.
///
/// Each variant maps to one entry in the codec dispatch table
/// (see [`crate::services::codec::MetricSpec`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    HeartRate,
    Power,
}

impl Metric {
    pub const ALL: [Metric; 2] = [Metric::HeartRate, Metric::Power];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::HeartRate => "heart_rate",
            Metric::Power => "power",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single decoded measurement. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub metric: Metric,
    pub value: u32,
}

impl Sample {
    /// Create a sample stamped with the current time.
    pub fn now(metric: Metric, value: u32) -> Self {
        Self {
            timestamp: Utc::now(),
            metric,
            value,
        }
    }
}
