// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Active-workout state machine.
//!
//! States:
//! - `Idle`: no open session
//! - `ActiveLocal`: device-local record, used when nobody is signed in
//! - `ActiveRemote`: a backend session with `end_time` unset
//!
//! Push events on the session and exercise tables are forwarded into one
//! reconciliation queue; each event triggers a full reload from the
//! gateway rather than a patch of local state.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, watch, Mutex};

use crate::db::{ChangeEvent, Gateway, Table};
use crate::error::{AppError, Result};
use crate::models::{
    Exercise, ExerciseDraft, Identity, LocalActiveWorkout, NewExercise, NewWorkoutSession,
    WorkoutSession, WorkoutSessionUpdate, LOCAL_WORKOUT_ID,
};
use crate::services::auth::AuthSnapshot;
use crate::services::clock::Clock;
use crate::services::local_store::{self, LocalStore, ACTIVE_WORKOUT_KEY};
use crate::services::tasks::{spawn_periodic, TaskSet};

/// Period of the elapsed-seconds display tick.
pub const ELAPSED_TICK: Duration = Duration::from_secs(1);

/// Depth of the reconciliation queue.
const RECONCILE_QUEUE_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum WorkoutState {
    #[default]
    Idle,
    ActiveLocal(LocalActiveWorkout),
    ActiveRemote(WorkoutSession),
}

impl WorkoutState {
    pub fn is_active(&self) -> bool {
        !matches!(self, WorkoutState::Idle)
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        match self {
            WorkoutState::Idle => None,
            WorkoutState::ActiveLocal(record) => Some(record.start_time),
            WorkoutState::ActiveRemote(session) => Some(session.start_time),
        }
    }

    pub fn notes(&self) -> &str {
        match self {
            WorkoutState::Idle => "",
            WorkoutState::ActiveLocal(record) => &record.notes,
            WorkoutState::ActiveRemote(session) => &session.notes,
        }
    }

    pub fn exercises(&self) -> &[Exercise] {
        match self {
            WorkoutState::ActiveRemote(session) => &session.exercises,
            _ => &[],
        }
    }

    fn remote_session_id(&self) -> Option<&str> {
        match self {
            WorkoutState::ActiveRemote(session) => Some(&session.id),
            _ => None,
        }
    }
}

/// Rendered state of the workout page.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WorkoutSnapshot {
    pub state: WorkoutState,
    /// Whole seconds since the workout started, refreshed every second
    pub elapsed_seconds: u64,
}

/// Typed input of the reconciliation queue.
#[derive(Debug)]
enum Reconcile {
    Changed(ChangeEvent),
    IdentityChanged,
    Resync,
}

fn elapsed_seconds(start: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    u64::try_from((now - start).num_seconds()).unwrap_or(0)
}

/// Owner of the active workout.
pub struct WorkoutManager {
    gateway: Arc<dyn Gateway>,
    store: Arc<dyn LocalStore>,
    clock: Arc<dyn Clock>,
    auth: watch::Receiver<AuthSnapshot>,
    state: watch::Sender<WorkoutSnapshot>,
    /// Serializes transitions and reloads
    transition: Mutex<()>,
}

impl WorkoutManager {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        store: Arc<dyn LocalStore>,
        clock: Arc<dyn Clock>,
        auth: watch::Receiver<AuthSnapshot>,
    ) -> Self {
        let (state, _) = watch::channel(WorkoutSnapshot::default());
        Self {
            gateway,
            store,
            clock,
            auth,
            state,
            transition: Mutex::new(()),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkoutSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> WorkoutSnapshot {
        self.state.borrow().clone()
    }

    fn identity(&self) -> Option<Identity> {
        self.auth.borrow().identity.clone()
    }

    fn set_state(&self, state: WorkoutState) {
        let now = self.clock.now_utc();
        self.state.send_if_modified(|snapshot| {
            let elapsed = state.start_time().map_or(0, |start| elapsed_seconds(start, now));
            if snapshot.state == state && snapshot.elapsed_seconds == elapsed {
                return false;
            }
            snapshot.state = state;
            snapshot.elapsed_seconds = elapsed;
            true
        });
    }

    // ─── Background tasks ────────────────────────────────────────────────────

    /// Recompute the elapsed-seconds display value.
    pub fn tick(&self) {
        let now = self.clock.now_utc();
        self.state.send_if_modified(|snapshot| {
            let elapsed = snapshot
                .state
                .start_time()
                .map_or(0, |start| elapsed_seconds(start, now));
            if snapshot.elapsed_seconds == elapsed {
                return false;
            }
            snapshot.elapsed_seconds = elapsed;
            true
        });
    }

    /// Spawn the reconciliation queue and its forwarders plus the
    /// elapsed-seconds ticker. Dropping the returned set stops them all.
    pub fn spawn_background(self: &Arc<Self>) -> TaskSet {
        let (tx, rx) = mpsc::channel(RECONCILE_QUEUE_DEPTH);
        let mut tasks = TaskSet::new();

        for table in [Table::WorkoutSessions, Table::Exercises] {
            tasks.spawn(forward_changes(self.gateway.subscribe(table), tx.clone()));
        }
        tasks.spawn(forward_identity(self.auth.clone(), tx));

        let manager = Arc::clone(self);
        tasks.spawn(async move { manager.reconcile(rx).await });

        let manager = Arc::clone(self);
        tasks.push(spawn_periodic(ELAPSED_TICK, move || manager.tick()));
        tasks
    }

    async fn reconcile(&self, mut queue: mpsc::Receiver<Reconcile>) {
        while let Some(signal) = queue.recv().await {
            match &signal {
                Reconcile::Changed(event) => {
                    tracing::debug!(table = event.table.name(), kind = ?event.kind, "Workout data changed");
                }
                Reconcile::IdentityChanged => tracing::debug!("Identity changed"),
                Reconcile::Resync => tracing::debug!("Resync requested"),
            }
            // One reload covers everything queued so far.
            let mut coalesced = 0usize;
            while queue.try_recv().is_ok() {
                coalesced += 1;
            }
            if coalesced > 0 {
                tracing::debug!(coalesced, "Coalesced queued reconcile signals");
            }
            self.load().await;
        }
    }

    // ─── Transitions ─────────────────────────────────────────────────────────

    /// Re-derive the state from local storage and the gateway.
    ///
    /// A local record resumes the workout regardless of auth state. When
    /// signed in, an open backend session takes precedence; the local
    /// record is shadowed, never merged.
    pub async fn load(&self) {
        let _guard = self.transition.lock().await;
        let state = self.derive_state().await;
        self.set_state(state);
    }

    async fn derive_state(&self) -> WorkoutState {
        let local: Option<LocalActiveWorkout> =
            local_store::load_json(self.store.as_ref(), ACTIVE_WORKOUT_KEY);

        let Some(identity) = self.identity() else {
            return local.map_or(WorkoutState::Idle, WorkoutState::ActiveLocal);
        };

        match self.gateway.list_workout_sessions(&identity.id).await {
            Ok(sessions) => {
                if let Some(active) = sessions.into_iter().find(WorkoutSession::is_active) {
                    return WorkoutState::ActiveRemote(active);
                }
                match local {
                    // Mirror of a session that was closed elsewhere.
                    Some(record) if !record.is_local_only() => {
                        tracing::info!(session_id = %record.id, "Dropping stale active-workout mirror");
                        self.clear_local_record();
                        WorkoutState::Idle
                    }
                    other => other.map_or(WorkoutState::Idle, WorkoutState::ActiveLocal),
                }
            }
            Err(e) => {
                tracing::error!(error = %e, detail = ?e.detail(), "Failed to query active workout");
                local.map_or(WorkoutState::Idle, WorkoutState::ActiveLocal)
            }
        }
    }

    /// Start a workout: local when signed out, a backend session otherwise.
    pub async fn start(&self) -> Result<WorkoutState> {
        let _guard = self.transition.lock().await;
        if self.state.borrow().state.is_active() {
            return Err(AppError::Validation("A workout is already in progress".to_string()));
        }
        let now = self.clock.now_utc();

        let state = match self.identity() {
            None => {
                let record = LocalActiveWorkout {
                    id: LOCAL_WORKOUT_ID.to_string(),
                    start_time: now,
                    notes: String::new(),
                };
                local_store::save_json(self.store.as_ref(), ACTIVE_WORKOUT_KEY, &record)?;
                tracing::info!("Started local workout");
                WorkoutState::ActiveLocal(record)
            }
            Some(identity) => {
                // Local state can lag another device; one open session per owner.
                let open = self
                    .gateway
                    .list_workout_sessions(&identity.id)
                    .await?
                    .into_iter()
                    .find(WorkoutSession::is_active);
                let session = match open {
                    Some(session) => {
                        tracing::info!(
                            user_id = %identity.id,
                            session_id = %session.id,
                            "Resuming workout already open on the backend"
                        );
                        session
                    }
                    None => {
                        let session = self
                            .gateway
                            .create_workout_session(&NewWorkoutSession {
                                owner_id: identity.id.clone(),
                                start_time: now,
                                duration_minutes: 0,
                                notes: String::new(),
                            })
                            .await?;
                        tracing::info!(user_id = %identity.id, session_id = %session.id, "Started workout");
                        session
                    }
                };
                let mirror = LocalActiveWorkout {
                    id: session.id.clone(),
                    start_time: session.start_time,
                    notes: session.notes.clone(),
                };
                if let Err(e) = local_store::save_json(self.store.as_ref(), ACTIVE_WORKOUT_KEY, &mirror) {
                    tracing::warn!(error = %e, "Failed to mirror active workout locally");
                }
                WorkoutState::ActiveRemote(session)
            }
        };
        self.set_state(state.clone());
        Ok(state)
    }

    /// Stop the active workout.
    ///
    /// The local record is always cleared. A backend session is closed with
    /// its whole elapsed minutes; if that write fails the session stays
    /// active so the stop can be retried.
    pub async fn stop(&self) -> Result<()> {
        let _guard = self.transition.lock().await;
        self.clear_local_record();

        let current = self.state.borrow().state.clone();
        match current {
            WorkoutState::Idle => Ok(()),
            WorkoutState::ActiveLocal(record) => {
                tracing::info!(local = record.is_local_only(), "Stopped local workout");
                self.set_state(WorkoutState::Idle);
                Ok(())
            }
            WorkoutState::ActiveRemote(session) if session.id == LOCAL_WORKOUT_ID => {
                self.set_state(WorkoutState::Idle);
                Ok(())
            }
            WorkoutState::ActiveRemote(session) => {
                let now = self.clock.now_utc();
                let minutes = elapsed_seconds(session.start_time, now) / 60;
                let update = WorkoutSessionUpdate {
                    end_time: Some(now),
                    duration_minutes: Some(u32::try_from(minutes).unwrap_or(u32::MAX)),
                    notes: Some(session.notes.clone()),
                };
                self.gateway
                    .update_workout_session(&session.id, &update)
                    .await?;
                tracing::info!(session_id = %session.id, minutes, "Stopped workout");
                self.set_state(WorkoutState::Idle);
                Ok(())
            }
        }
    }

    fn clear_local_record(&self) {
        if let Err(e) = self.store.remove(ACTIVE_WORKOUT_KEY) {
            tracing::warn!(error = %e, "Failed to clear active-workout record");
        }
    }

    // ─── Exercises and notes ─────────────────────────────────────────────────

    /// ID of the backend session edits apply to; requires a signed-in owner.
    fn editable_session(&self) -> Result<String> {
        if self.identity().is_none() {
            return Err(AppError::Auth("Not signed in".to_string()));
        }
        self.state
            .borrow()
            .state
            .remote_session_id()
            .filter(|id| *id != LOCAL_WORKOUT_ID)
            .map(String::from)
            .ok_or_else(|| AppError::NotFound("No active workout session".to_string()))
    }

    pub async fn add_exercise(&self, draft: ExerciseDraft) -> Result<Exercise> {
        let draft = draft.checked()?;
        let _guard = self.transition.lock().await;
        let session_id = self.editable_session()?;

        let exercise = self
            .gateway
            .create_exercise(&NewExercise {
                workout_session_id: session_id.clone(),
                draft,
            })
            .await?;
        tracing::debug!(session_id = %session_id, exercise_id = %exercise.id, "Added exercise");
        self.reload_exercises(&session_id).await;
        Ok(exercise)
    }

    pub async fn edit_exercise(&self, exercise_id: &str, draft: ExerciseDraft) -> Result<Exercise> {
        let draft = draft.checked()?;
        let _guard = self.transition.lock().await;
        let session_id = self.editable_session()?;

        let exercise = self.gateway.update_exercise(exercise_id, &draft).await?;
        tracing::debug!(session_id = %session_id, exercise_id, "Edited exercise");
        self.reload_exercises(&session_id).await;
        Ok(exercise)
    }

    pub async fn delete_exercise(&self, exercise_id: &str) -> Result<()> {
        let _guard = self.transition.lock().await;
        let session_id = self.editable_session()?;

        self.gateway.delete_exercise(exercise_id).await?;
        tracing::debug!(session_id = %session_id, exercise_id, "Deleted exercise");
        self.reload_exercises(&session_id).await;
        Ok(())
    }

    /// Replace the workout notes.
    ///
    /// A local workout keeps its notes in the local record only.
    pub async fn update_notes(&self, notes: &str) -> Result<()> {
        let _guard = self.transition.lock().await;
        let current = self.state.borrow().state.clone();

        match current {
            WorkoutState::ActiveLocal(mut record) => {
                record.notes = notes.to_string();
                local_store::save_json(self.store.as_ref(), ACTIVE_WORKOUT_KEY, &record)?;
                self.set_state(WorkoutState::ActiveLocal(record));
                Ok(())
            }
            WorkoutState::ActiveRemote(_) => {
                let session_id = self.editable_session()?;
                let update = WorkoutSessionUpdate {
                    notes: Some(notes.to_string()),
                    ..WorkoutSessionUpdate::default()
                };
                let updated = self
                    .gateway
                    .update_workout_session(&session_id, &update)
                    .await?;
                self.state.send_modify(|snapshot| {
                    if let WorkoutState::ActiveRemote(session) = &mut snapshot.state {
                        if session.id == updated.id {
                            session.notes = updated.notes.clone();
                        }
                    }
                });
                Ok(())
            }
            WorkoutState::Idle => Err(AppError::NotFound("No active workout".to_string())),
        }
    }

    /// Replace the exercise list of `session_id` from the gateway.
    ///
    /// A failed read empties the list rather than keeping stale rows.
    async fn reload_exercises(&self, session_id: &str) {
        let exercises = match self.identity() {
            Some(identity) => match self.gateway.list_workout_sessions(&identity.id).await {
                Ok(sessions) => sessions
                    .into_iter()
                    .find(|s| s.id == session_id)
                    .map(|s| s.exercises)
                    .unwrap_or_default(),
                Err(e) => {
                    tracing::error!(session_id, error = %e, detail = ?e.detail(), "Failed to reload exercises");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        self.state.send_if_modified(|snapshot| match &mut snapshot.state {
            WorkoutState::ActiveRemote(session) if session.id == session_id => {
                if session.exercises == exercises {
                    return false;
                }
                session.exercises = exercises;
                true
            }
            _ => false,
        });
    }
}

async fn forward_changes(mut events: broadcast::Receiver<ChangeEvent>, tx: mpsc::Sender<Reconcile>) {
    loop {
        let signal = match events.recv().await {
            Ok(event) => Reconcile::Changed(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Change forwarder lagged");
                Reconcile::Resync
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        if tx.send(signal).await.is_err() {
            break;
        }
    }
}

async fn forward_identity(mut auth: watch::Receiver<AuthSnapshot>, tx: mpsc::Sender<Reconcile>) {
    let mut current = auth.borrow_and_update().identity.as_ref().map(|i| i.id.clone());
    while auth.changed().await.is_ok() {
        let next = auth.borrow_and_update().identity.as_ref().map(|i| i.id.clone());
        if next == current {
            continue;
        }
        current = next;
        if tx.send(Reconcile::IdentityChanged).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_elapsed_seconds_never_negative() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        assert_eq!(elapsed_seconds(start, start + chrono::Duration::seconds(61)), 61);
        assert_eq!(elapsed_seconds(start, start - chrono::Duration::seconds(5)), 0);
    }

    #[test]
    fn test_state_accessors() {
        let record = LocalActiveWorkout {
            id: LOCAL_WORKOUT_ID.to_string(),
            start_time: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
            notes: "legs".to_string(),
        };
        let state = WorkoutState::ActiveLocal(record.clone());
        assert!(state.is_active());
        assert_eq!(state.start_time(), Some(record.start_time));
        assert_eq!(state.notes(), "legs");
        assert!(state.exercises().is_empty());
        assert!(state.remote_session_id().is_none());
        assert!(!WorkoutState::Idle.is_active());
    }
}
