// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strict domain entities.
//!
//! Nothing in here knows about wire formats; rows coming back from the
//! gateway are decoded into these types by `db::rows`.

pub mod auth;
pub mod profile;
pub mod stats;
pub mod timer;
pub mod weight;
pub mod workout;

pub use auth::{AuthEvent, AuthSession, Identity, SignUpOutcome};
pub use profile::{NewProfile, Profile, ProfileUpdate};
pub use stats::{DerivedStats, MonthlyProgress};
pub use timer::{NewTimerEntry, TimerEntry, TimerMode};
pub use weight::{NewWeightEntry, WeightDraft, WeightEntry};
pub use workout::{
    Exercise, ExerciseDraft, LocalActiveWorkout, NewExercise, NewWorkoutSession, WorkoutSession,
    WorkoutSessionUpdate, LOCAL_WORKOUT_ID,
};

use validator::ValidationErrors;

use crate::error::AppError;

/// Convert `validator` failures into a single human-readable validation error.
pub(crate) fn validation_error(errors: ValidationErrors) -> AppError {
    let mut fields: Vec<String> = errors
        .field_errors()
        .iter()
        .map(|(field, errs)| {
            let reasons: Vec<String> = errs
                .iter()
                .map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string())
                })
                .collect();
            format!("{}: {}", field, reasons.join(", "))
        })
        .collect();
    fields.sort();
    AppError::Validation(fields.join("; "))
}
