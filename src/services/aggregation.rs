// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Fitness statistics derived from workout and weight snapshots.
//!
//! Every function here is pure: inputs are borrowed, sorting happens on a
//! copy, and the same snapshot always yields the same result.

use chrono::NaiveDate;

use crate::models::{DerivedStats, MonthlyProgress, WeightEntry, WorkoutSession};
use crate::time_utils::{calendar_days_between, month_abbrev, month_key, months_back};

/// Number of trailing months reported in `monthly_progress`.
pub const MONTHLY_WINDOW: u32 = 6;

/// Compute all derived statistics for one owner.
pub fn compute_stats(
    sessions: &[WorkoutSession],
    weights: &[WeightEntry],
    today: NaiveDate,
) -> DerivedStats {
    DerivedStats {
        total_workouts: sessions.len() as u32,
        current_streak: current_streak(sessions, today),
        longest_streak: longest_streak(sessions),
        average_duration: average_duration(sessions),
        total_time: total_time(sessions),
        weight_change: weight_change(weights),
        monthly_progress: monthly_progress(sessions, weights, today),
    }
}

fn session_days_sorted(sessions: &[WorkoutSession]) -> Vec<NaiveDate> {
    let mut days: Vec<NaiveDate> = sessions
        .iter()
        .map(|s| s.start_time.date_naive())
        .collect();
    days.sort_unstable();
    days
}

/// Consecutive days with at least one workout, counting back from `today`.
///
/// Sessions are walked newest first. A session whose calendar-day gap from
/// today equals the streak so far extends the streak; a gap beyond the
/// next expected day ends the walk. Repeat sessions on an already counted
/// day are skipped.
pub fn current_streak(sessions: &[WorkoutSession], today: NaiveDate) -> u32 {
    let mut streak: u32 = 0;
    for day in session_days_sorted(sessions).into_iter().rev() {
        let gap = calendar_days_between(day, today);
        if gap == i64::from(streak) {
            streak += 1;
        } else if gap > i64::from(streak) + 1 {
            break;
        }
    }
    streak
}

/// Longest run of consecutive workout days in the history.
///
/// Several sessions on the same day neither extend nor break a run.
pub fn longest_streak(sessions: &[WorkoutSession]) -> u32 {
    let days = session_days_sorted(sessions);
    let Some(first) = days.first() else {
        return 0;
    };

    let mut longest: u32 = 1;
    let mut run: u32 = 1;
    let mut previous = *first;
    for day in days.into_iter().skip(1) {
        match calendar_days_between(previous, day) {
            0 => {}
            1 => run += 1,
            _ => run = 1,
        }
        longest = longest.max(run);
        previous = day;
    }
    longest
}

/// Sum of session durations in minutes.
pub fn total_time(sessions: &[WorkoutSession]) -> u64 {
    sessions.iter().map(|s| u64::from(s.duration_minutes)).sum()
}

/// Mean session duration in minutes, 0 for an empty history.
pub fn average_duration(sessions: &[WorkoutSession]) -> f64 {
    if sessions.is_empty() {
        return 0.0;
    }
    total_time(sessions) as f64 / sessions.len() as f64
}

fn weights_newest_first(weights: &[WeightEntry]) -> Vec<&WeightEntry> {
    let mut sorted: Vec<&WeightEntry> = weights.iter().collect();
    // Stable sort keeps input order for duplicate dates.
    sorted.sort_by(|a, b| b.date.cmp(&a.date));
    sorted
}

/// Newest weight minus oldest weight; 0 with fewer than two entries.
pub fn weight_change(weights: &[WeightEntry]) -> f64 {
    let sorted = weights_newest_first(weights);
    match (sorted.first(), sorted.last()) {
        (Some(newest), Some(oldest)) if sorted.len() >= 2 => newest.weight - oldest.weight,
        _ => 0.0,
    }
}

/// Trailing six calendar months ending at the month of `today`, oldest first.
pub fn monthly_progress(
    sessions: &[WorkoutSession],
    weights: &[WeightEntry],
    today: NaiveDate,
) -> Vec<MonthlyProgress> {
    let current = month_key(today);
    let weights = weights_newest_first(weights);

    (0..MONTHLY_WINDOW)
        .rev()
        .map(|back| {
            let key = months_back(current, back);
            let workout_count = sessions
                .iter()
                .filter(|s| month_key(s.start_time.date_naive()) == key)
                .count() as u32;
            let last_known_weight = weights
                .iter()
                .find(|w| month_key(w.date) == key)
                .map(|w| w.weight)
                .unwrap_or(0.0);
            MonthlyProgress {
                month: month_abbrev(key.1).to_string(),
                workout_count,
                last_known_weight,
            }
        })
        .collect()
}
