//! Remote data gateway seam.
//!
//! The hosted backend (row store, auth provider and push channel) is an
//! external collaborator; everything above this module talks to it only
//! through the [`Gateway`] trait.

pub mod gateway;
pub mod memory;
pub mod realtime;
pub mod rows;
pub mod supabase;

pub use gateway::{ChangeEvent, ChangeKind, Gateway};
pub use memory::MemoryGateway;
pub use realtime::RealtimeClient;
pub use supabase::SupabaseGateway;

use serde::{Deserialize, Serialize};

/// Table names as constants.
pub mod tables {
    pub const PROFILES: &str = "users";
    pub const WORKOUT_SESSIONS: &str = "workout_sessions";
    pub const EXERCISES: &str = "exercises";
    pub const WEIGHT_PROGRESS: &str = "weight_progress";
    pub const TIMER_LOGS: &str = "timer_logs";
}

/// Logical tables that emit change events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Table {
    Profiles,
    WorkoutSessions,
    Exercises,
    WeightProgress,
    TimerLogs,
}

impl Table {
    pub const ALL: [Table; 5] = [
        Table::Profiles,
        Table::WorkoutSessions,
        Table::Exercises,
        Table::WeightProgress,
        Table::TimerLogs,
    ];

    /// Backend table name.
    pub fn name(self) -> &'static str {
        match self {
            Table::Profiles => tables::PROFILES,
            Table::WorkoutSessions => tables::WORKOUT_SESSIONS,
            Table::Exercises => tables::EXERCISES,
            Table::WeightProgress => tables::WEIGHT_PROGRESS,
            Table::TimerLogs => tables::TIMER_LOGS,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }
}
