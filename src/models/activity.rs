// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Workout activity descriptor.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of workout being tracked. Fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activity {
    IndoorRide,
    Ride,
    Run,
    Walk,
}

impl Activity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Activity::IndoorRide => "indoor_ride",
            Activity::Ride => "ride",
            Activity::Run => "run",
            Activity::Walk => "walk",
        }
    }

    /// Human-readable label (e.g. "Indoor Ride").
    pub fn label(&self) -> &'static str {
        match self {
            Activity::IndoorRide => "Indoor Ride",
            Activity::Ride => "Ride",
            Activity::Run => "Run",
            Activity::Walk => "Walk",
        }
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error parsing an activity name.
#[derive(Debug, thiserror::Error)]
#[error("Unknown activity: {0}")]
pub struct UnknownActivity(pub String);

impl FromStr for Activity {
    type Err = UnknownActivity;

    /// Accepts the snake_case form or the display label, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "indoor_ride" | "indoorride" => Ok(Activity::IndoorRide),
            "ride" => Ok(Activity::Ride),
            "run" => Ok(Activity::Run),
            "walk" => Ok(Activity::Walk),
            _ => Err(UnknownActivity(s.to_string())),
        }
    }
}
