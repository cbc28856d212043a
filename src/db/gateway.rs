// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! The gateway trait and its push-event types.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use super::rows::{self, ExerciseRow, ProfileRow, TimerLogRow, WeightRow, WorkoutSessionRow};
use super::Table;
use crate::error::Result;
use crate::models::{
    AuthEvent, AuthSession, Exercise, ExerciseDraft, NewExercise, NewProfile, NewTimerEntry,
    NewWeightEntry, NewWorkoutSession, Profile, ProfileUpdate, SignUpOutcome, TimerEntry,
    WeightDraft, WeightEntry, WorkoutSession, WorkoutSessionUpdate,
};

/// Capacity of the per-table and auth broadcast channels.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Kind of row change reported on the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn from_wire(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "INSERT" => Some(ChangeKind::Insert),
            "UPDATE" => Some(ChangeKind::Update),
            "DELETE" => Some(ChangeKind::Delete),
            _ => None,
        }
    }
}

/// A row change pushed by the backend.
///
/// The payload stays raw on the channel and is decoded on demand with
/// [`ChangeEvent::decode_row`]. Subscribers use the decoded owner only to
/// filter; they still re-fetch from the source of truth instead of
/// patching local state from the row.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
    pub row: Value,
}

/// A pushed row decoded into its entity.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangedRow {
    Profile(Profile),
    WorkoutSession(WorkoutSession),
    Exercise(Exercise),
    WeightEntry(WeightEntry),
    TimerEntry(TimerEntry),
}

impl ChangedRow {
    /// Owning user. Exercises only name their session.
    pub fn owner_id(&self) -> Option<&str> {
        match self {
            ChangedRow::Profile(p) => Some(&p.id),
            ChangedRow::WorkoutSession(s) => Some(&s.owner_id),
            ChangedRow::Exercise(_) => None,
            ChangedRow::WeightEntry(w) => Some(&w.owner_id),
            ChangedRow::TimerEntry(t) => Some(&t.owner_id),
        }
    }
}

impl ChangeEvent {
    /// Decode the payload through the wire-row boundary.
    pub fn decode_row(&self) -> Result<ChangedRow> {
        let row = self.row.clone();
        Ok(match self.table {
            Table::Profiles => ChangedRow::Profile(rows::decode::<ProfileRow, _>(row)?),
            Table::WorkoutSessions => {
                ChangedRow::WorkoutSession(rows::decode::<WorkoutSessionRow, _>(row)?)
            }
            Table::Exercises => ChangedRow::Exercise(rows::decode::<ExerciseRow, _>(row)?),
            Table::WeightProgress => ChangedRow::WeightEntry(rows::decode::<WeightRow, _>(row)?),
            Table::TimerLogs => ChangedRow::TimerEntry(rows::decode::<TimerLogRow, _>(row)?),
        })
    }

    /// Whether the change can affect `owner_id`'s data.
    ///
    /// Rows that do not decode (delete payloads often carry only the key)
    /// or that carry no owner are treated as relevant.
    pub fn concerns_owner(&self, owner_id: &str) -> bool {
        match self.decode_row() {
            Ok(row) => row.owner_id().map_or(true, |owner| owner == owner_id),
            Err(e) => {
                tracing::debug!(table = self.table.name(), error = %e, "Undecodable pushed row");
                true
            }
        }
    }
}

/// Row CRUD, auth and change subscriptions against the hosted backend.
///
/// List operations return rows already decoded into strict entities;
/// rows that fail decoding are skipped with a warning by the adapter.
#[async_trait]
pub trait Gateway: Send + Sync {
    // ─── Auth ────────────────────────────────────────────────────

    /// Persisted session, if any. Errors mean the query itself failed.
    async fn get_session(&self) -> Result<Option<AuthSession>>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession>;

    async fn sign_up(&self, email: &str, password: &str, name: &str) -> Result<SignUpOutcome>;

    async fn sign_out(&self) -> Result<()>;

    /// Subscribe to auth state changes.
    fn auth_events(&self) -> broadcast::Receiver<AuthEvent>;

    // ─── Profiles ────────────────────────────────────────────────

    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>>;

    async fn create_profile(&self, profile: &NewProfile) -> Result<Profile>;

    async fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> Result<Profile>;

    // ─── Workout sessions ────────────────────────────────────────

    async fn create_workout_session(&self, session: &NewWorkoutSession) -> Result<WorkoutSession>;

    /// All sessions of an owner, newest start first, exercises attached.
    async fn list_workout_sessions(&self, owner_id: &str) -> Result<Vec<WorkoutSession>>;

    async fn update_workout_session(
        &self,
        session_id: &str,
        update: &WorkoutSessionUpdate,
    ) -> Result<WorkoutSession>;

    // ─── Exercises ───────────────────────────────────────────────

    async fn create_exercise(&self, exercise: &NewExercise) -> Result<Exercise>;

    async fn update_exercise(&self, exercise_id: &str, draft: &ExerciseDraft) -> Result<Exercise>;

    async fn delete_exercise(&self, exercise_id: &str) -> Result<()>;

    // ─── Weight progress ─────────────────────────────────────────

    async fn create_weight_entry(&self, entry: &NewWeightEntry) -> Result<WeightEntry>;

    /// All entries of an owner, newest date first.
    async fn list_weight_entries(&self, owner_id: &str) -> Result<Vec<WeightEntry>>;

    async fn update_weight_entry(&self, entry_id: &str, draft: &WeightDraft) -> Result<WeightEntry>;

    async fn delete_weight_entry(&self, entry_id: &str) -> Result<()>;

    // ─── Timer logs ──────────────────────────────────────────────

    async fn create_timer_entry(&self, entry: &NewTimerEntry) -> Result<TimerEntry>;

    // ─── Push events ─────────────────────────────────────────────

    /// Subscribe to insert/update/delete events of one table.
    fn subscribe(&self, table: Table) -> broadcast::Receiver<ChangeEvent>;
}
