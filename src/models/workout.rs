// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Workout session and exercise models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::{Validate, ValidationError};

use crate::error::Result;

/// Sentinel ID of a device-local (never uploaded) active workout.
pub const LOCAL_WORKOUT_ID: &str = "local";

/// A logged workout. Active while `end_time` is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct WorkoutSession {
    pub id: String,
    pub owner_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Whole minutes, written when the session is stopped
    pub duration_minutes: u32,
    pub notes: String,
    pub exercises: Vec<Exercise>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl WorkoutSession {
    pub fn is_active(&self) -> bool {
        self.end_time.is_none()
    }
}

/// Insert payload for a new workout session.
#[derive(Debug, Clone)]
pub struct NewWorkoutSession {
    pub owner_id: String,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: u32,
    pub notes: String,
}

/// Partial update of a workout session; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct WorkoutSessionUpdate {
    pub end_time: Option<DateTime<Utc>>,
    pub duration_minutes: Option<u32>,
    pub notes: Option<String>,
}

/// One exercise performed within a workout session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Exercise {
    pub id: String,
    pub workout_session_id: String,
    pub name: String,
    pub sets: u32,
    pub reps: u32,
    pub weight: Option<f64>,
    pub notes: Option<String>,
}

/// User-entered exercise fields, validated before any gateway call.
#[derive(Debug, Clone, PartialEq, Validate)]
pub struct ExerciseDraft {
    #[validate(custom(function = "validate_not_blank"))]
    pub name: String,
    #[validate(range(min = 1, message = "must be at least 1"))]
    pub sets: u32,
    #[validate(range(min = 1, message = "must be at least 1"))]
    pub reps: u32,
    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub weight: Option<f64>,
    pub notes: Option<String>,
}

impl Default for ExerciseDraft {
    fn default() -> Self {
        Self {
            name: String::new(),
            sets: 1,
            reps: 10,
            weight: Some(0.0),
            notes: None,
        }
    }
}

impl ExerciseDraft {
    /// Validate and normalize (trimmed name, blank notes dropped).
    pub fn checked(mut self) -> Result<Self> {
        self.validate().map_err(super::validation_error)?;
        self.name = self.name.trim().to_string();
        self.notes = self
            .notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        Ok(self)
    }
}

impl From<&Exercise> for ExerciseDraft {
    fn from(exercise: &Exercise) -> Self {
        Self {
            name: exercise.name.clone(),
            sets: exercise.sets,
            reps: exercise.reps,
            weight: exercise.weight,
            notes: exercise.notes.clone(),
        }
    }
}

/// Insert payload for a new exercise.
#[derive(Debug, Clone)]
pub struct NewExercise {
    pub workout_session_id: String,
    pub draft: ExerciseDraft,
}

/// Device-local active workout, used when nobody is signed in and as a
/// mirror of a remote active session across reloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalActiveWorkout {
    pub id: String,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub notes: String,
}

impl LocalActiveWorkout {
    /// True for the unauthenticated fallback record.
    pub fn is_local_only(&self) -> bool {
        self.id == LOCAL_WORKOUT_ID
    }
}

fn validate_not_blank(value: &str) -> std::result::Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("must not be empty".into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    #[test]
    fn test_draft_defaults() {
        let draft = ExerciseDraft::default();
        assert_eq!((draft.sets, draft.reps, draft.weight), (1, 10, Some(0.0)));
    }

    #[test]
    fn test_blank_name_rejected() {
        let draft = ExerciseDraft {
            name: "   ".to_string(),
            ..ExerciseDraft::default()
        };
        match draft.checked() {
            Err(AppError::Validation(msg)) => assert!(msg.contains("name"), "{}", msg),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_sets_and_negative_weight_rejected() {
        let draft = ExerciseDraft {
            name: "Squat".to_string(),
            sets: 0,
            weight: Some(-5.0),
            ..ExerciseDraft::default()
        };
        let err = draft.checked().unwrap_err().to_string();
        assert!(err.contains("sets"));
        assert!(err.contains("weight"));
    }

    #[test]
    fn test_checked_normalizes() {
        let draft = ExerciseDraft {
            name: "  Bench Press ".to_string(),
            notes: Some("   ".to_string()),
            ..ExerciseDraft::default()
        }
        .checked()
        .unwrap();
        assert_eq!(draft.name, "Bench Press");
        assert_eq!(draft.notes, None);
    }

    #[test]
    fn test_local_record_uses_camel_case() {
        let json = r#"{"id":"local","startTime":"2024-05-01T10:00:00Z"}"#;
        let record: LocalActiveWorkout = serde_json::from_str(json).unwrap();
        assert!(record.is_local_only());
        assert_eq!(record.notes, "");
    }
}
