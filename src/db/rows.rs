// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Wire-row decode boundary.
//!
//! Rows coming back from the backend (REST responses and push payloads)
//! are loosely typed: keys may be snake_case or camelCase, IDs may be
//! numbers or strings, optional columns may be absent. Every row passes
//! through one of these structs and a `TryFrom` into the strict entities
//! before any business logic sees it. Push payloads are decoded lazily
//! via `ChangeEvent::decode_row`. The entities' own field names are
//! accepted as aliases since the offline gateway pushes entities as-is.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::AppError;
use crate::models::{Exercise, Profile, TimerEntry, WeightEntry, WorkoutSession};
use crate::time_utils::parse_utc_rfc3339;

/// Accept either a JSON string or number as an ID.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number ID, got {}",
            other
        ))),
    }
}

fn invalid(entity: &str, id: &str, reason: impl std::fmt::Display) -> AppError {
    AppError::Validation(format!("{} row {}: {}", entity, id, reason))
}

fn timestamp(entity: &str, id: &str, raw: Option<&str>) -> Result<Option<DateTime<Utc>>, AppError> {
    raw.map(|s| parse_utc_rfc3339(s).ok_or_else(|| invalid(entity, id, format!("bad timestamp {:?}", s))))
        .transpose()
}

/// Calendar date column; also accepts a full timestamp.
fn calendar_date(entity: &str, id: &str, raw: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_utc_rfc3339(raw).map(|dt| dt.date_naive()))
        .ok_or_else(|| invalid(entity, id, format!("bad date {:?}", raw)))
}

fn non_negative(entity: &str, id: &str, field: &str, value: i64) -> Result<u32, AppError> {
    u32::try_from(value).map_err(|_| invalid(entity, id, format!("{} out of range: {}", field, value)))
}

/// Decode a JSON value into a strict entity via its row type.
pub fn decode<R, T>(value: Value) -> Result<T, AppError>
where
    R: for<'de> Deserialize<'de>,
    T: TryFrom<R, Error = AppError>,
{
    let row: R = serde_json::from_value(value)
        .map_err(|e| AppError::Validation(format!("malformed row: {}", e)))?;
    T::try_from(row)
}

/// Decode a list of rows, skipping (and logging) rows that fail.
pub fn decode_all<R, T>(values: Vec<Value>, entity: &'static str) -> Vec<T>
where
    R: for<'de> Deserialize<'de>,
    T: TryFrom<R, Error = AppError>,
{
    values
        .into_iter()
        .filter_map(|value| match decode::<R, T>(value) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!(entity, error = %e, "Skipping undecodable row");
                None
            }
        })
        .collect()
}

// ─── Profiles ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ProfileRow {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, alias = "streakCount")]
    pub streak_count: Option<i64>,
    #[serde(default, alias = "createdAt")]
    pub created_at: Option<String>,
    #[serde(default, alias = "updatedAt")]
    pub updated_at: Option<String>,
}

impl TryFrom<ProfileRow> for Profile {
    type Error = AppError;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        let created_at = timestamp("profile", &row.id, row.created_at.as_deref())?
            .ok_or_else(|| invalid("profile", &row.id, "missing created_at"))?;
        Ok(Profile {
            streak_count: non_negative("profile", &row.id, "streak_count", row.streak_count.unwrap_or(0))?,
            updated_at: timestamp("profile", &row.id, row.updated_at.as_deref())?,
            name: row.name.unwrap_or_default(),
            email: row.email.unwrap_or_default(),
            created_at,
            id: row.id,
        })
    }
}

// ─── Workout sessions ────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct WorkoutSessionRow {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(alias = "userId", alias = "owner_id")]
    pub user_id: String,
    #[serde(alias = "startTime")]
    pub start_time: String,
    #[serde(default, alias = "endTime")]
    pub end_time: Option<String>,
    #[serde(default, alias = "duration_minutes")]
    pub duration: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default, alias = "createdAt")]
    pub created_at: Option<String>,
    #[serde(default, alias = "updatedAt")]
    pub updated_at: Option<String>,
}

impl TryFrom<WorkoutSessionRow> for WorkoutSession {
    type Error = AppError;

    fn try_from(row: WorkoutSessionRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let start_time = timestamp("workout_session", &id, Some(&row.start_time))?
            .ok_or_else(|| invalid("workout_session", &id, "missing start_time"))?;
        let duration = row.duration.unwrap_or(0.0);
        if !duration.is_finite() || duration < 0.0 {
            return Err(invalid("workout_session", &id, format!("bad duration {}", duration)));
        }
        Ok(WorkoutSession {
            owner_id: row.user_id,
            start_time,
            end_time: timestamp("workout_session", &id, row.end_time.as_deref())?,
            duration_minutes: duration.floor() as u32,
            notes: row.notes.unwrap_or_default(),
            exercises: Vec::new(),
            created_at: timestamp("workout_session", &id, row.created_at.as_deref())?,
            updated_at: timestamp("workout_session", &id, row.updated_at.as_deref())?,
            id,
        })
    }
}

// ─── Exercises ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ExerciseRow {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(alias = "workoutSessionId", deserialize_with = "string_or_number")]
    pub workout_session_id: String,
    pub name: String,
    pub sets: i64,
    pub reps: i64,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl TryFrom<ExerciseRow> for Exercise {
    type Error = AppError;

    fn try_from(row: ExerciseRow) -> Result<Self, Self::Error> {
        let id = row.id;
        if row.name.trim().is_empty() {
            return Err(invalid("exercise", &id, "empty name"));
        }
        if row.sets < 1 || row.reps < 1 {
            return Err(invalid("exercise", &id, "sets and reps must be at least 1"));
        }
        if row.weight.is_some_and(|w| !w.is_finite() || w < 0.0) {
            return Err(invalid("exercise", &id, "negative weight"));
        }
        Ok(Exercise {
            workout_session_id: row.workout_session_id,
            name: row.name,
            sets: non_negative("exercise", &id, "sets", row.sets)?,
            reps: non_negative("exercise", &id, "reps", row.reps)?,
            weight: row.weight,
            notes: row.notes,
            id,
        })
    }
}

// ─── Weight progress ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct WeightRow {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(alias = "userId", alias = "owner_id")]
    pub user_id: String,
    pub weight: f64,
    pub date: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default, alias = "createdAt")]
    pub created_at: Option<String>,
}

impl TryFrom<WeightRow> for WeightEntry {
    type Error = AppError;

    fn try_from(row: WeightRow) -> Result<Self, Self::Error> {
        let id = row.id;
        if !row.weight.is_finite() || row.weight <= 0.0 {
            return Err(invalid("weight_progress", &id, format!("non-positive weight {}", row.weight)));
        }
        Ok(WeightEntry {
            owner_id: row.user_id,
            weight: row.weight,
            date: calendar_date("weight_progress", &id, &row.date)?,
            notes: row.notes,
            created_at: timestamp("weight_progress", &id, row.created_at.as_deref())?,
            id,
        })
    }
}

// ─── Timer logs ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TimerLogRow {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(alias = "userId", alias = "owner_id")]
    pub user_id: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(alias = "time_seconds")]
    pub time: i64,
    #[serde(default, alias = "createdAt")]
    pub created_at: Option<String>,
}

impl TryFrom<TimerLogRow> for TimerEntry {
    type Error = AppError;

    fn try_from(row: TimerLogRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let time_seconds = u64::try_from(row.time)
            .map_err(|_| invalid("timer_log", &id, format!("negative time {}", row.time)))?;
        Ok(TimerEntry {
            owner_id: row.user_id,
            note: row.note.unwrap_or_default(),
            time_seconds,
            created_at: timestamp("timer_log", &id, row.created_at.as_deref())?,
            id,
        })
    }
}
