//! Timer log entries written by the local timer engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Note used when the user leaves the timer label blank.
pub const DEFAULT_TIMER_NOTE: &str = "Exercise";

/// Counting direction of the local timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerMode {
    Stopwatch,
    Countdown,
}

/// A saved timer reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerEntry {
    pub id: String,
    pub owner_id: String,
    pub note: String,
    /// Persisted reading in whole seconds
    pub time_seconds: u64,
    pub created_at: Option<DateTime<Utc>>,
}

/// Insert payload for a timer log entry.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTimerEntry {
    pub owner_id: String,
    pub note: String,
    pub time_seconds: u64,
}
