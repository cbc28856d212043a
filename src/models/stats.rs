// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Derived fitness statistics for the dashboard.
//!
//! Never persisted; recomputed from the session and weight snapshots on
//! every data change.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Statistics derived from one owner's workout and weight history.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct DerivedStats {
    pub total_workouts: u32,
    /// Consecutive days with a workout, anchored at today
    pub current_streak: u32,
    /// Longest run of consecutive workout days ever
    pub longest_streak: u32,
    /// Mean session duration in minutes
    pub average_duration: f64,
    /// Sum of session durations in minutes
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub total_time: u64,
    /// Most recent weight minus oldest weight (kg)
    pub weight_change: f64,
    /// Trailing six months, oldest first
    pub monthly_progress: Vec<MonthlyProgress>,
}

/// One calendar month bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct MonthlyProgress {
    /// Three-letter month abbreviation ("Jan")
    pub month: String,
    pub workout_count: u32,
    /// Weight recorded in the month, 0 when none
    pub last_known_weight: f64,
}
