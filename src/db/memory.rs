// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process gateway.
//!
//! Mirrors the hosted backend closely enough to run the state managers
//! offline and in tests: every write echoes a change event on the table's
//! push channel, and individual operations can be made to fail.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;

use super::gateway::{ChangeEvent, ChangeKind, Gateway, EVENT_CHANNEL_CAPACITY};
use super::Table;
use crate::error::{AppError, Result};
use crate::models::{
    AuthEvent, AuthSession, Exercise, ExerciseDraft, Identity, NewExercise, NewProfile,
    NewTimerEntry, NewWeightEntry, NewWorkoutSession, Profile, ProfileUpdate, SignUpOutcome,
    TimerEntry, WeightDraft, WeightEntry, WorkoutSession, WorkoutSessionUpdate,
};
use crate::services::clock::Clock;

struct Account {
    password: String,
    identity: Identity,
}

/// Gateway backed by in-memory maps.
pub struct MemoryGateway {
    clock: Arc<dyn Clock>,
    accounts: DashMap<String, Account>,
    session: Mutex<Option<AuthSession>>,
    require_email_confirmation: AtomicBool,
    profiles: DashMap<String, Profile>,
    sessions: DashMap<String, WorkoutSession>,
    /// Exercises keyed by ID, with an insertion sequence for stable order
    exercises: DashMap<String, (u64, Exercise)>,
    weights: DashMap<String, WeightEntry>,
    timer_logs: DashMap<String, TimerEntry>,
    seq: AtomicU64,
    /// Remaining forced failures per operation name
    faults: DashMap<&'static str, usize>,
    /// Number of list (read) calls served, per operation name
    reads: DashMap<&'static str, u64>,
    auth_tx: broadcast::Sender<AuthEvent>,
    change_tx: DashMap<Table, broadcast::Sender<ChangeEvent>>,
}

impl MemoryGateway {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let (auth_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let change_tx = DashMap::new();
        for table in Table::ALL {
            let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
            change_tx.insert(table, tx);
        }
        Self {
            clock,
            accounts: DashMap::new(),
            session: Mutex::new(None),
            require_email_confirmation: AtomicBool::new(false),
            profiles: DashMap::new(),
            sessions: DashMap::new(),
            exercises: DashMap::new(),
            weights: DashMap::new(),
            timer_logs: DashMap::new(),
            seq: AtomicU64::new(0),
            faults: DashMap::new(),
            reads: DashMap::new(),
            auth_tx,
            change_tx,
        }
    }

    // ─── Test controls ───────────────────────────────────────────

    /// Register an account that can sign in.
    pub fn register(&self, email: &str, password: &str, name: Option<&str>) -> Identity {
        let identity = Identity {
            id: uuid::Uuid::new_v4().to_string(),
            email: email.to_string(),
            name: name.map(String::from),
        };
        self.accounts.insert(
            email.to_ascii_lowercase(),
            Account {
                password: password.to_string(),
                identity: identity.clone(),
            },
        );
        identity
    }

    /// Make the next `times` calls of `op` fail with a network error.
    pub fn fail_next(&self, op: &'static str, times: usize) {
        self.faults.insert(op, times);
    }

    /// Require email confirmation on sign-up (no session returned).
    pub fn set_require_email_confirmation(&self, required: bool) {
        self.require_email_confirmation
            .store(required, Ordering::SeqCst);
    }

    /// Replace the persisted session without emitting an event.
    pub fn set_session(&self, session: Option<AuthSession>) {
        *self.session.lock().unwrap_or_else(|e| e.into_inner()) = session;
    }

    /// Push an auth event to subscribers.
    pub fn emit_auth(&self, event: AuthEvent) {
        let _ = self.auth_tx.send(event);
    }

    /// Insert or replace a profile row directly.
    pub fn put_profile(&self, profile: Profile) {
        self.profiles.insert(profile.id.clone(), profile);
    }

    /// Insert or replace a workout session row directly (no event).
    pub fn put_workout_session(&self, session: WorkoutSession) {
        self.sessions.insert(session.id.clone(), session);
    }

    /// Insert or replace a weight row directly (no event).
    pub fn put_weight_entry(&self, entry: WeightEntry) {
        self.weights.insert(entry.id.clone(), entry);
    }

    pub fn profile(&self, user_id: &str) -> Option<Profile> {
        self.profiles.get(user_id).map(|p| p.clone())
    }

    pub fn workout_session(&self, id: &str) -> Option<WorkoutSession> {
        self.sessions.get(id).map(|s| s.clone())
    }

    pub fn timer_entries(&self) -> Vec<TimerEntry> {
        self.timer_logs.iter().map(|e| e.clone()).collect()
    }

    /// How many times a read operation has been served.
    pub fn read_count(&self, op: &'static str) -> u64 {
        self.reads.get(&op).map(|c| *c).unwrap_or(0)
    }

    // ─── Internals ───────────────────────────────────────────────

    fn check(&self, op: &'static str) -> Result<()> {
        if let Some(mut remaining) = self.faults.get_mut(&op) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(AppError::Network(format!("{}: injected failure", op)));
            }
        }
        Ok(())
    }

    fn count_read(&self, op: &'static str) {
        *self.reads.entry(op).or_insert(0) += 1;
    }

    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }

    fn emit_change<T: Serialize>(&self, table: Table, kind: ChangeKind, row: &T) {
        let row = serde_json::to_value(row).unwrap_or_default();
        if let Some(tx) = self.change_tx.get(&table) {
            // No receivers is fine: nobody is listening yet.
            let _ = tx.send(ChangeEvent { table, kind, row });
        }
    }

    fn issue_session(&self, identity: Identity) -> AuthSession {
        AuthSession {
            access_token: format!("access-{}", self.next_id()),
            refresh_token: format!("refresh-{}", self.next_id()),
            expires_at: Some(self.clock.now_utc() + chrono::Duration::hours(1)),
            user: identity,
        }
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    async fn get_session(&self) -> Result<Option<AuthSession>> {
        self.check("get_session")?;
        Ok(self.session.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession> {
        self.check("sign_in")?;
        let identity = match self.accounts.get(&email.to_ascii_lowercase()) {
            Some(account) if account.password == password => account.identity.clone(),
            _ => return Err(AppError::Auth("Invalid login credentials".to_string())),
        };
        let session = self.issue_session(identity);
        self.set_session(Some(session.clone()));
        self.emit_auth(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str, name: &str) -> Result<SignUpOutcome> {
        self.check("sign_up")?;
        if self.accounts.contains_key(&email.to_ascii_lowercase()) {
            return Err(AppError::Auth("User already registered".to_string()));
        }
        let identity = self.register(email, password, Some(name));
        if self.require_email_confirmation.load(Ordering::SeqCst) {
            return Ok(SignUpOutcome {
                identity,
                session: None,
            });
        }
        let session = self.issue_session(identity.clone());
        self.set_session(Some(session.clone()));
        self.emit_auth(AuthEvent::SignedIn(session.clone()));
        Ok(SignUpOutcome {
            identity,
            session: Some(session),
        })
    }

    async fn sign_out(&self) -> Result<()> {
        self.check("sign_out")?;
        let held = self.session.lock().unwrap_or_else(|e| e.into_inner()).take();
        // Nothing to announce when no session was held.
        if held.is_some() {
            self.emit_auth(AuthEvent::SignedOut);
        }
        Ok(())
    }

    fn auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.auth_tx.subscribe()
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        self.check("get_profile")?;
        self.count_read("get_profile");
        Ok(self.profile(user_id))
    }

    async fn create_profile(&self, profile: &NewProfile) -> Result<Profile> {
        self.check("create_profile")?;
        if self.profiles.contains_key(&profile.id) {
            return Err(AppError::Database {
                message: "duplicate key value violates unique constraint \"users_pkey\"".to_string(),
                details: Some(format!("Key (id)=({}) already exists.", profile.id)),
            });
        }
        let row = Profile {
            id: profile.id.clone(),
            name: profile.name.clone(),
            email: profile.email.clone(),
            streak_count: 0,
            created_at: profile.created_at,
            updated_at: None,
        };
        self.profiles.insert(row.id.clone(), row.clone());
        self.emit_change(Table::Profiles, ChangeKind::Insert, &row);
        Ok(row)
    }

    async fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> Result<Profile> {
        self.check("update_profile")?;
        let row = {
            let mut profile = self
                .profiles
                .get_mut(user_id)
                .ok_or_else(|| AppError::NotFound(format!("Profile {}", user_id)))?;
            if let Some(name) = &update.name {
                profile.name = name.clone();
            }
            if let Some(streak) = update.streak_count {
                profile.streak_count = streak;
            }
            profile.updated_at = Some(update.updated_at);
            profile.clone()
        };
        self.emit_change(Table::Profiles, ChangeKind::Update, &row);
        Ok(row)
    }

    async fn create_workout_session(&self, session: &NewWorkoutSession) -> Result<WorkoutSession> {
        self.check("create_workout_session")?;
        let now = self.clock.now_utc();
        let row = WorkoutSession {
            id: self.next_id(),
            owner_id: session.owner_id.clone(),
            start_time: session.start_time,
            end_time: None,
            duration_minutes: session.duration_minutes,
            notes: session.notes.clone(),
            exercises: Vec::new(),
            created_at: Some(now),
            updated_at: Some(now),
        };
        self.sessions.insert(row.id.clone(), row.clone());
        self.emit_change(Table::WorkoutSessions, ChangeKind::Insert, &row);
        Ok(row)
    }

    async fn list_workout_sessions(&self, owner_id: &str) -> Result<Vec<WorkoutSession>> {
        self.check("list_workout_sessions")?;
        self.count_read("list_workout_sessions");

        let mut exercises: Vec<(u64, Exercise)> =
            self.exercises.iter().map(|e| e.value().clone()).collect();
        exercises.sort_by_key(|(seq, _)| *seq);

        let mut sessions: Vec<WorkoutSession> = self
            .sessions
            .iter()
            .filter(|s| s.owner_id == owner_id)
            .map(|s| {
                let mut session = s.clone();
                session.exercises = exercises
                    .iter()
                    .filter(|(_, e)| e.workout_session_id == session.id)
                    .map(|(_, e)| e.clone())
                    .collect();
                session
            })
            .collect();
        sessions.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(sessions)
    }

    async fn update_workout_session(
        &self,
        session_id: &str,
        update: &WorkoutSessionUpdate,
    ) -> Result<WorkoutSession> {
        self.check("update_workout_session")?;
        let row = {
            let mut session = self
                .sessions
                .get_mut(session_id)
                .ok_or_else(|| AppError::NotFound(format!("Workout session {}", session_id)))?;
            if let Some(end_time) = update.end_time {
                session.end_time = Some(end_time);
            }
            if let Some(duration) = update.duration_minutes {
                session.duration_minutes = duration;
            }
            if let Some(notes) = &update.notes {
                session.notes = notes.clone();
            }
            session.updated_at = Some(self.clock.now_utc());
            session.clone()
        };
        self.emit_change(Table::WorkoutSessions, ChangeKind::Update, &row);
        Ok(row)
    }

    async fn create_exercise(&self, exercise: &NewExercise) -> Result<Exercise> {
        self.check("create_exercise")?;
        if !self.sessions.contains_key(&exercise.workout_session_id) {
            return Err(AppError::Database {
                message: "insert or update on table \"exercises\" violates foreign key constraint"
                    .to_string(),
                details: Some(format!(
                    "Key (workout_session_id)=({}) is not present.",
                    exercise.workout_session_id
                )),
            });
        }
        let draft = &exercise.draft;
        let row = Exercise {
            id: self.next_id(),
            workout_session_id: exercise.workout_session_id.clone(),
            name: draft.name.clone(),
            sets: draft.sets,
            reps: draft.reps,
            weight: draft.weight,
            notes: draft.notes.clone(),
        };
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        self.exercises.insert(row.id.clone(), (seq, row.clone()));
        self.emit_change(Table::Exercises, ChangeKind::Insert, &row);
        Ok(row)
    }

    async fn update_exercise(&self, exercise_id: &str, draft: &ExerciseDraft) -> Result<Exercise> {
        self.check("update_exercise")?;
        let row = {
            let mut entry = self
                .exercises
                .get_mut(exercise_id)
                .ok_or_else(|| AppError::NotFound(format!("Exercise {}", exercise_id)))?;
            let exercise = &mut entry.1;
            exercise.name = draft.name.clone();
            exercise.sets = draft.sets;
            exercise.reps = draft.reps;
            exercise.weight = draft.weight;
            exercise.notes = draft.notes.clone();
            exercise.clone()
        };
        self.emit_change(Table::Exercises, ChangeKind::Update, &row);
        Ok(row)
    }

    async fn delete_exercise(&self, exercise_id: &str) -> Result<()> {
        self.check("delete_exercise")?;
        // Deleting a missing row is not an error, matching the REST backend.
        if let Some((_, (_, row))) = self.exercises.remove(exercise_id) {
            self.emit_change(Table::Exercises, ChangeKind::Delete, &row);
        }
        Ok(())
    }

    async fn create_weight_entry(&self, entry: &NewWeightEntry) -> Result<WeightEntry> {
        self.check("create_weight_entry")?;
        let row = WeightEntry {
            id: self.next_id(),
            owner_id: entry.owner_id.clone(),
            weight: entry.draft.weight,
            date: entry.draft.date,
            notes: entry.draft.notes.clone(),
            created_at: Some(self.clock.now_utc()),
        };
        self.weights.insert(row.id.clone(), row.clone());
        self.emit_change(Table::WeightProgress, ChangeKind::Insert, &row);
        Ok(row)
    }

    async fn list_weight_entries(&self, owner_id: &str) -> Result<Vec<WeightEntry>> {
        self.check("list_weight_entries")?;
        self.count_read("list_weight_entries");
        let mut entries: Vec<WeightEntry> = self
            .weights
            .iter()
            .filter(|w| w.owner_id == owner_id)
            .map(|w| w.clone())
            .collect();
        entries.sort_by(|a, b| b.date.cmp(&a.date).then(b.created_at.cmp(&a.created_at)));
        Ok(entries)
    }

    async fn update_weight_entry(&self, entry_id: &str, draft: &WeightDraft) -> Result<WeightEntry> {
        self.check("update_weight_entry")?;
        let row = {
            let mut entry = self
                .weights
                .get_mut(entry_id)
                .ok_or_else(|| AppError::NotFound(format!("Weight entry {}", entry_id)))?;
            entry.weight = draft.weight;
            entry.date = draft.date;
            entry.notes = draft.notes.clone();
            entry.clone()
        };
        self.emit_change(Table::WeightProgress, ChangeKind::Update, &row);
        Ok(row)
    }

    async fn delete_weight_entry(&self, entry_id: &str) -> Result<()> {
        self.check("delete_weight_entry")?;
        if let Some((_, row)) = self.weights.remove(entry_id) {
            self.emit_change(Table::WeightProgress, ChangeKind::Delete, &row);
        }
        Ok(())
    }

    async fn create_timer_entry(&self, entry: &NewTimerEntry) -> Result<TimerEntry> {
        self.check("create_timer_entry")?;
        let row = TimerEntry {
            id: self.next_id(),
            owner_id: entry.owner_id.clone(),
            note: entry.note.clone(),
            time_seconds: entry.time_seconds,
            created_at: Some(self.clock.now_utc()),
        };
        self.timer_logs.insert(row.id.clone(), row.clone());
        self.emit_change(Table::TimerLogs, ChangeKind::Insert, &row);
        Ok(row)
    }

    fn subscribe(&self, table: Table) -> broadcast::Receiver<ChangeEvent> {
        self.change_tx
            .entry(table)
            .or_insert_with(|| broadcast::channel(EVENT_CHANNEL_CAPACITY).0)
            .subscribe()
    }
}
