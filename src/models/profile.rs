//! Application-level user profile.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Profile row, one per identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Profile {
    /// Same as the identity ID
    pub id: String,
    pub name: String,
    pub email: String,
    /// Consecutive login days
    pub streak_count: u32,
    pub created_at: DateTime<Utc>,
    /// Last login/edit stamp; `None` until the first streak update
    pub updated_at: Option<DateTime<Utc>>,
}

/// Insert payload for a lazily created profile.
#[derive(Debug, Clone)]
pub struct NewProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Partial profile update. Every update stamps `updated_at`.
#[derive(Debug, Clone)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub streak_count: Option<u32>,
    pub updated_at: DateTime<Utc>,
}
