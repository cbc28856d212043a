// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Hosted backend client.
//!
//! Handles:
//! - Password sign-in, sign-up and sign-out against the auth API
//! - Session persistence in the local store and proactive token refresh
//! - Row CRUD against the REST API (filters, ordering, returned rows)
//! - Wiring table subscriptions to the realtime client

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};

use super::gateway::{ChangeEvent, Gateway, EVENT_CHANNEL_CAPACITY};
use super::realtime::RealtimeClient;
use super::rows::{self, ExerciseRow, ProfileRow, TimerLogRow, WeightRow, WorkoutSessionRow};
use super::{tables, Table};
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{
    AuthEvent, AuthSession, Exercise, ExerciseDraft, Identity, NewExercise, NewProfile,
    NewTimerEntry, NewWeightEntry, NewWorkoutSession, Profile, ProfileUpdate, SignUpOutcome,
    TimerEntry, WeightDraft, WeightEntry, WorkoutSession, WorkoutSessionUpdate,
};
use crate::services::clock::Clock;
use crate::services::local_store::{self, LocalStore, AUTH_SESSION_KEY};
use crate::time_utils::format_utc_rfc3339;

/// Margin before token expiration when we proactively refresh (60 seconds).
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// Shared per-table push channels.
pub type ChangeChannels = Arc<DashMap<Table, broadcast::Sender<ChangeEvent>>>;

/// Client for the hosted REST, auth and realtime APIs.
pub struct SupabaseGateway {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    store: Arc<dyn LocalStore>,
    clock: Arc<dyn Clock>,
    /// Cached session; the mutex also serializes token refreshes.
    session: Mutex<Option<AuthSession>>,
    auth_tx: broadcast::Sender<AuthEvent>,
    channels: ChangeChannels,
    realtime: Option<RealtimeClient>,
}

impl SupabaseGateway {
    /// Create a gateway client. The realtime connection is only opened
    /// when `config.realtime_enabled` is set.
    pub fn new(config: &Config, store: Arc<dyn LocalStore>, clock: Arc<dyn Clock>) -> Self {
        let (auth_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let channels: ChangeChannels = Arc::new(DashMap::new());
        let realtime = config
            .realtime_enabled
            .then(|| RealtimeClient::spawn(config.realtime_url(), channels.clone()));
        let session = local_store::load_json::<AuthSession>(store.as_ref(), AUTH_SESSION_KEY);

        if let (Some(rt), Some(s)) = (&realtime, &session) {
            rt.set_access_token(s.access_token.clone());
        }

        Self {
            http: reqwest::Client::new(),
            base_url: config.gateway_url.clone(),
            api_key: config.api_key.clone(),
            store,
            clock,
            session: Mutex::new(session),
            auth_tx,
            channels,
            realtime,
        }
    }

    /// Stop the realtime connection, if any.
    pub fn shutdown(&self) {
        if let Some(rt) = &self.realtime {
            rt.shutdown();
        }
    }

    // ─── Session handling ────────────────────────────────────────────────────

    fn persist_session(&self, session: Option<&AuthSession>) {
        let result = match session {
            Some(s) => local_store::save_json(self.store.as_ref(), AUTH_SESSION_KEY, s),
            None => self.store.remove(AUTH_SESSION_KEY),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to persist auth session locally");
        }
        if let (Some(rt), Some(s)) = (&self.realtime, session) {
            rt.set_access_token(s.access_token.clone());
        }
    }

    async fn adopt_session(&self, session: Option<AuthSession>) {
        self.persist_session(session.as_ref());
        *self.session.lock().await = session;
    }

    fn emit(&self, event: AuthEvent) {
        tracing::debug!(event = event.name(), "Auth state change");
        let _ = self.auth_tx.send(event);
    }

    /// Bearer token for REST calls: the user's access token, else the anon key.
    async fn bearer(&self) -> Result<String> {
        Ok(self
            .get_session()
            .await?
            .map(|s| s.access_token)
            .unwrap_or_else(|| self.api_key.clone()))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthSession> {
        let url = format!("{}/auth/v1/token?grant_type=refresh_token", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("apikey", &self.api_key)
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await?;
        let body: TokenResponse = check_response_json(response).await?;
        Ok(body.into_session(self.clock.now_utc()))
    }

    // ─── REST helpers ────────────────────────────────────────────────────────

    async fn rest(&self, method: Method, table: &str) -> Result<RequestBuilder> {
        let url = format!("{}/rest/v1/{}", self.base_url, table);
        let token = self.bearer().await?;
        Ok(self
            .http
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(token))
    }

    /// SELECT rows with filters.
    async fn select(&self, table: &str, query: &[(&str, String)]) -> Result<Vec<Value>> {
        let response = self.rest(Method::GET, table).await?.query(query).send().await?;
        check_response_json(response).await
    }

    /// INSERT one row and return the stored representation.
    async fn insert<T: Serialize + ?Sized>(&self, table: &str, payload: &T) -> Result<Value> {
        let response = self
            .rest(Method::POST, table)
            .await?
            .header("Prefer", "return=representation")
            .json(payload)
            .send()
            .await?;
        single_row(table, check_response_json(response).await?)
    }

    /// UPDATE one row by ID and return the stored representation.
    async fn update<T: Serialize + ?Sized>(&self, table: &str, id: &str, payload: &T) -> Result<Value> {
        let response = self
            .rest(Method::PATCH, table)
            .await?
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", "return=representation")
            .json(payload)
            .send()
            .await?;
        single_row(table, check_response_json(response).await?)
    }

    async fn delete(&self, table: &str, id: &str) -> Result<()> {
        let response = self
            .rest(Method::DELETE, table)
            .await?
            .query(&[("id", format!("eq.{}", id))])
            .send()
            .await?;
        check_response(response).await
    }
}

#[async_trait]
impl Gateway for SupabaseGateway {
    async fn get_session(&self) -> Result<Option<AuthSession>> {
        let mut guard = self.session.lock().await;
        let Some(current) = guard.clone() else {
            return Ok(None);
        };
        if !current.expires_within(self.clock.now_utc(), TOKEN_REFRESH_MARGIN_SECS) {
            return Ok(Some(current));
        }

        tracing::info!(user_id = %current.user.id, "Access token expiring, refreshing");
        match self.refresh(&current.refresh_token).await {
            Ok(refreshed) => {
                self.persist_session(Some(&refreshed));
                *guard = Some(refreshed.clone());
                drop(guard);
                self.emit(AuthEvent::TokenRefreshed(refreshed.clone()));
                Ok(Some(refreshed))
            }
            Err(e) if e.is_network_error() => Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh rejected, clearing session");
                self.persist_session(None);
                *guard = None;
                drop(guard);
                self.emit(AuthEvent::TokenRefreshFailed);
                Ok(None)
            }
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession> {
        let url = format!("{}/auth/v1/token?grant_type=password", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("apikey", &self.api_key)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;
        let body: TokenResponse = check_response_json(response).await?;
        let session = body.into_session(self.clock.now_utc());

        tracing::info!(user_id = %session.user.id, "Signed in");
        self.adopt_session(Some(session.clone())).await;
        self.emit(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str, name: &str) -> Result<SignUpOutcome> {
        let url = format!("{}/auth/v1/signup", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("apikey", &self.api_key)
            .json(&serde_json::json!({
                "email": email,
                "password": password,
                "data": { "name": name },
            }))
            .send()
            .await?;
        let body: Value = check_response_json(response).await?;

        // With email confirmation enabled the API returns the bare user.
        if body.get("access_token").is_some() {
            let token: TokenResponse = serde_json::from_value(body)
                .map_err(|e| AppError::database(format!("Malformed sign-up response: {}", e)))?;
            let session = token.into_session(self.clock.now_utc());
            tracing::info!(user_id = %session.user.id, "Account created with active session");
            self.adopt_session(Some(session.clone())).await;
            self.emit(AuthEvent::SignedIn(session.clone()));
            return Ok(SignUpOutcome {
                identity: session.user.clone(),
                session: Some(session),
            });
        }

        let user_value = body.get("user").cloned().unwrap_or(body);
        let user: UserResponse = serde_json::from_value(user_value)
            .map_err(|e| AppError::database(format!("Malformed sign-up response: {}", e)))?;
        let identity = user.into_identity();
        tracing::info!(user_id = %identity.id, "Account created, confirmation pending");
        Ok(SignUpOutcome {
            identity,
            session: None,
        })
    }

    async fn sign_out(&self) -> Result<()> {
        let token = self.session.lock().await.as_ref().map(|s| s.access_token.clone());
        // Local state is cleared even if the server call fails.
        self.adopt_session(None).await;

        if let Some(token) = token {
            let url = format!("{}/auth/v1/logout", self.base_url);
            let response = self
                .http
                .post(&url)
                .header("apikey", &self.api_key)
                .bearer_auth(token)
                .send()
                .await;
            let result = match response {
                Ok(r) => check_response(r).await,
                Err(e) => Err(e.into()),
            };
            self.emit(AuthEvent::SignedOut);
            // An already-invalid token means we are signed out anyway.
            return match result {
                Err(e) if e.is_auth_error() => Ok(()),
                other => other,
            };
        }

        tracing::debug!("Sign-out without a session, nothing to revoke");
        Ok(())
    }

    fn auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.auth_tx.subscribe()
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        let rows = self
            .select(
                tables::PROFILES,
                &[("select", "*".to_string()), ("id", format!("eq.{}", user_id))],
            )
            .await?;
        rows.into_iter()
            .next()
            .map(rows::decode::<ProfileRow, Profile>)
            .transpose()
    }

    async fn create_profile(&self, profile: &NewProfile) -> Result<Profile> {
        let payload = ProfileInsert {
            id: &profile.id,
            name: &profile.name,
            email: &profile.email,
            streak_count: 0,
            created_at: format_utc_rfc3339(profile.created_at),
        };
        let row = self.insert(tables::PROFILES, &payload).await?;
        rows::decode::<ProfileRow, Profile>(row)
    }

    async fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> Result<Profile> {
        let payload = ProfilePatch {
            name: update.name.as_deref(),
            streak_count: update.streak_count,
            updated_at: format_utc_rfc3339(update.updated_at),
        };
        let row = self.update(tables::PROFILES, user_id, &payload).await?;
        rows::decode::<ProfileRow, Profile>(row)
    }

    async fn create_workout_session(&self, session: &NewWorkoutSession) -> Result<WorkoutSession> {
        let payload = WorkoutSessionInsert {
            user_id: &session.owner_id,
            start_time: format_utc_rfc3339(session.start_time),
            end_time: None,
            duration: session.duration_minutes,
            notes: &session.notes,
        };
        let row = self.insert(tables::WORKOUT_SESSIONS, &payload).await?;
        rows::decode::<WorkoutSessionRow, WorkoutSession>(row)
    }

    async fn list_workout_sessions(&self, owner_id: &str) -> Result<Vec<WorkoutSession>> {
        // Sessions and exercises are fetched separately so the query does
        // not depend on the backend inferring the foreign-key relation.
        let session_rows = self
            .select(
                tables::WORKOUT_SESSIONS,
                &[
                    (
                        "select",
                        "id,user_id,start_time,end_time,duration,notes,created_at,updated_at"
                            .to_string(),
                    ),
                    ("user_id", format!("eq.{}", owner_id)),
                    ("order", "start_time.desc".to_string()),
                ],
            )
            .await?;
        let mut sessions: Vec<WorkoutSession> =
            rows::decode_all::<WorkoutSessionRow, _>(session_rows, "workout_session");
        if sessions.is_empty() {
            return Ok(sessions);
        }

        let ids: Vec<&str> = sessions.iter().map(|s| s.id.as_str()).collect();
        let exercise_rows = self
            .select(
                tables::EXERCISES,
                &[
                    (
                        "select",
                        "id,workout_session_id,name,sets,reps,weight,notes".to_string(),
                    ),
                    ("workout_session_id", format!("in.({})", ids.join(","))),
                ],
            )
            .await?;
        let exercises: Vec<Exercise> = rows::decode_all::<ExerciseRow, _>(exercise_rows, "exercise");
        attach_exercises(&mut sessions, exercises);
        Ok(sessions)
    }

    async fn update_workout_session(
        &self,
        session_id: &str,
        update: &WorkoutSessionUpdate,
    ) -> Result<WorkoutSession> {
        let payload = WorkoutSessionPatch {
            end_time: update.end_time.map(format_utc_rfc3339),
            duration: update.duration_minutes,
            notes: update.notes.as_deref(),
        };
        let row = self
            .update(tables::WORKOUT_SESSIONS, session_id, &payload)
            .await?;
        rows::decode::<WorkoutSessionRow, WorkoutSession>(row)
    }

    async fn create_exercise(&self, exercise: &NewExercise) -> Result<Exercise> {
        let payload = ExerciseWrite {
            workout_session_id: Some(&exercise.workout_session_id),
            draft: &exercise.draft,
        };
        let row = self.insert(tables::EXERCISES, &payload).await?;
        rows::decode::<ExerciseRow, Exercise>(row)
    }

    async fn update_exercise(&self, exercise_id: &str, draft: &ExerciseDraft) -> Result<Exercise> {
        let payload = ExerciseWrite {
            workout_session_id: None,
            draft,
        };
        let row = self.update(tables::EXERCISES, exercise_id, &payload).await?;
        rows::decode::<ExerciseRow, Exercise>(row)
    }

    async fn delete_exercise(&self, exercise_id: &str) -> Result<()> {
        self.delete(tables::EXERCISES, exercise_id).await
    }

    async fn create_weight_entry(&self, entry: &NewWeightEntry) -> Result<WeightEntry> {
        let payload = WeightWrite {
            user_id: Some(&entry.owner_id),
            draft: &entry.draft,
        };
        let row = self.insert(tables::WEIGHT_PROGRESS, &payload).await?;
        rows::decode::<WeightRow, WeightEntry>(row)
    }

    async fn list_weight_entries(&self, owner_id: &str) -> Result<Vec<WeightEntry>> {
        let rows = self
            .select(
                tables::WEIGHT_PROGRESS,
                &[
                    ("select", "*".to_string()),
                    ("user_id", format!("eq.{}", owner_id)),
                    ("order", "date.desc".to_string()),
                ],
            )
            .await?;
        Ok(rows::decode_all::<WeightRow, _>(rows, "weight_progress"))
    }

    async fn update_weight_entry(&self, entry_id: &str, draft: &WeightDraft) -> Result<WeightEntry> {
        let payload = WeightWrite {
            user_id: None,
            draft,
        };
        let row = self.update(tables::WEIGHT_PROGRESS, entry_id, &payload).await?;
        rows::decode::<WeightRow, WeightEntry>(row)
    }

    async fn delete_weight_entry(&self, entry_id: &str) -> Result<()> {
        self.delete(tables::WEIGHT_PROGRESS, entry_id).await
    }

    async fn create_timer_entry(&self, entry: &NewTimerEntry) -> Result<TimerEntry> {
        let payload = serde_json::json!({
            "user_id": entry.owner_id,
            "note": entry.note,
            "time": entry.time_seconds,
        });
        let row = self.insert(tables::TIMER_LOGS, &payload).await?;
        rows::decode::<TimerLogRow, TimerEntry>(row)
    }

    fn subscribe(&self, table: Table) -> broadcast::Receiver<ChangeEvent> {
        let rx = self
            .channels
            .entry(table)
            .or_insert_with(|| broadcast::channel(EVENT_CHANNEL_CAPACITY).0)
            .subscribe();
        match &self.realtime {
            Some(rt) => rt.join(table),
            None => tracing::debug!(table = table.name(), "Realtime disabled, no push events"),
        }
        rx
    }
}

impl Drop for SupabaseGateway {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Group exercises under their sessions, preserving exercise order.
fn attach_exercises(sessions: &mut [WorkoutSession], exercises: Vec<Exercise>) {
    let mut by_session: std::collections::HashMap<String, Vec<Exercise>> =
        std::collections::HashMap::new();
    for exercise in exercises {
        by_session
            .entry(exercise.workout_session_id.clone())
            .or_default()
            .push(exercise);
    }
    for session in sessions {
        session.exercises = by_session.remove(&session.id).unwrap_or_default();
    }
}

fn single_row(table: &str, mut rows: Vec<Value>) -> Result<Value> {
    if rows.is_empty() {
        return Err(AppError::NotFound(format!("No {} row returned", table)));
    }
    Ok(rows.swap_remove(0))
}

// ─── Wire payloads ───────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ProfileInsert<'a> {
    id: &'a str,
    name: &'a str,
    email: &'a str,
    streak_count: u32,
    created_at: String,
}

#[derive(Serialize)]
struct ProfilePatch<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    streak_count: Option<u32>,
    updated_at: String,
}

#[derive(Serialize)]
struct WorkoutSessionInsert<'a> {
    user_id: &'a str,
    start_time: String,
    end_time: Option<String>,
    duration: u32,
    notes: &'a str,
}

#[derive(Serialize)]
struct WorkoutSessionPatch<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    end_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<&'a str>,
}

struct ExerciseWrite<'a> {
    workout_session_id: Option<&'a str>,
    draft: &'a ExerciseDraft,
}

impl Serialize for ExerciseWrite<'_> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(None)?;
        if let Some(id) = self.workout_session_id {
            map.serialize_entry("workout_session_id", id)?;
        }
        map.serialize_entry("name", &self.draft.name)?;
        map.serialize_entry("sets", &self.draft.sets)?;
        map.serialize_entry("reps", &self.draft.reps)?;
        map.serialize_entry("weight", &self.draft.weight)?;
        map.serialize_entry("notes", &self.draft.notes)?;
        map.end()
    }
}

struct WeightWrite<'a> {
    user_id: Option<&'a str>,
    draft: &'a WeightDraft,
}

impl Serialize for WeightWrite<'_> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(None)?;
        if let Some(id) = self.user_id {
            map.serialize_entry("user_id", id)?;
        }
        map.serialize_entry("weight", &self.draft.weight)?;
        map.serialize_entry("date", &self.draft.date.format("%Y-%m-%d").to_string())?;
        map.serialize_entry("notes", &self.draft.notes)?;
        map.end()
    }
}

/// Token grant response from the auth API.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: UserResponse,
}

impl TokenResponse {
    fn into_session(self, now: DateTime<Utc>) -> AuthSession {
        let expires_at = self
            .expires_at
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .or_else(|| self.expires_in.map(|secs| now + chrono::Duration::seconds(secs)));
        AuthSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user.into_identity(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: Option<Value>,
}

impl UserResponse {
    fn into_identity(self) -> Identity {
        let name = self
            .user_metadata
            .as_ref()
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
            .map(String::from);
        Identity {
            id: self.id,
            email: self.email.unwrap_or_default(),
            name,
        }
    }
}

/// Error body shapes of the REST and auth APIs.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    details: Option<String>,
    hint: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
    msg: Option<String>,
}

/// Map a non-success response to an [`AppError`].
fn error_from_status(status: StatusCode, body: &str) -> AppError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .error_description
        .clone()
        .or(parsed.msg.clone())
        .or(parsed.message.clone())
        .or(parsed.error.clone())
        .unwrap_or_else(|| format!("HTTP {}", status));
    let details = parsed.details.or(parsed.hint);

    match status.as_u16() {
        401 | 403 => AppError::Auth(message),
        404 => AppError::NotFound(message),
        // The auth API reports bad credentials as 400 invalid_grant.
        400 if parsed.error.as_deref() == Some("invalid_grant") => AppError::Auth(message),
        400 | 409 | 422 => AppError::Database { message, details },
        s if s >= 500 => AppError::Network(format!("HTTP {}: {}", status, message)),
        _ => AppError::Database { message, details },
    }
}

/// Check response status and return error if not successful.
async fn check_response(response: reqwest::Response) -> Result<()> {
    if response.status().is_success() {
        return Ok(());
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(error_from_status(status, &body))
}

/// Check response and parse JSON body.
async fn check_response_json<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(error_from_status(status, &body));
    }
    response
        .json()
        .await
        .map_err(|e| AppError::database(format!("JSON parse error: {}", e)))
}
