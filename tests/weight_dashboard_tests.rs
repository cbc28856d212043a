// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Weight history and dashboard aggregation tests.

use chrono::{Duration, NaiveDate};
use fitsync::db::Gateway;
use fitsync::error::AppError;
use fitsync::models::{NewWeightEntry, NewWorkoutSession, WeightDraft, WeightEntry, WorkoutSession};
use fitsync::services::dashboard::RECENT_WORKOUTS;

mod common;

use common::{create_test_app, start_time, TestApp, EMAIL, PASSWORD};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
}

fn weigh_in(weight: f64, date: NaiveDate) -> WeightDraft {
    WeightDraft {
        weight,
        date,
        notes: None,
    }
}

/// Seed one finished session per day for the last `days` days, ending today.
fn seed_daily_sessions(app: &TestApp, owner_id: &str, days: i64) {
    for back in 0..days {
        let start = start_time() - Duration::days(back);
        app.gateway.put_workout_session(WorkoutSession {
            id: format!("s{}", back),
            owner_id: owner_id.to_string(),
            start_time: start,
            end_time: Some(start + Duration::minutes(45)),
            duration_minutes: 45,
            notes: String::new(),
            exercises: Vec::new(),
            created_at: Some(start),
            updated_at: Some(start),
        });
    }
}

#[tokio::test]
async fn test_weight_history_newest_first() {
    let app = create_test_app();
    app.sign_in().await;

    for (weight, date) in [(83.0, day(1)), (80.0, day(14)), (81.5, day(7))] {
        app.ctx.weight.add(weigh_in(weight, date)).await.unwrap();
    }

    let weights: Vec<f64> = app.ctx.weight.entries().iter().map(|w| w.weight).collect();
    assert_eq!(weights, vec![80.0, 81.5, 83.0]);
}

#[tokio::test]
async fn test_weight_update_and_delete() {
    let app = create_test_app();
    app.sign_in().await;
    let entry = app.ctx.weight.add(weigh_in(83.0, day(1))).await.unwrap();

    let updated = app
        .ctx
        .weight
        .update(&entry.id, weigh_in(82.4, day(2)))
        .await
        .unwrap();
    assert_eq!(updated.weight, 82.4);
    assert_eq!(app.ctx.weight.entries()[0].date, day(2));

    app.ctx.weight.delete(&entry.id).await.unwrap();
    assert!(app.ctx.weight.entries().is_empty());
}

#[tokio::test]
async fn test_non_positive_weight_rejected() {
    let app = create_test_app();
    app.sign_in().await;

    let err = app.ctx.weight.add(weigh_in(0.0, day(1))).await.unwrap_err();

    assert!(matches!(err, AppError::Validation(_)));
    assert!(app.ctx.weight.entries().is_empty());
}

#[tokio::test]
async fn test_weight_requires_sign_in() {
    let app = create_test_app();
    let err = app.ctx.weight.add(weigh_in(80.0, day(1))).await.unwrap_err();
    assert!(err.is_auth_error());
}

#[tokio::test]
async fn test_dashboard_weight_change_and_latest() {
    let app = create_test_app();
    app.sign_in().await;
    for (weight, date) in [(83.0, day(1)), (81.5, day(7)), (80.0, day(14))] {
        app.ctx.weight.add(weigh_in(weight, date)).await.unwrap();
    }

    let dashboard = app.ctx.dashboard.load().await;

    assert_eq!(dashboard.stats.weight_change, -3.0);
    assert_eq!(dashboard.latest_weight.map(|w| w.weight), Some(80.0));
    // May is the last of six months, holding the newest May reading.
    let may = dashboard.stats.monthly_progress.last().unwrap();
    assert_eq!(may.month, "May");
    assert_eq!(may.last_known_weight, 80.0);
}

#[tokio::test]
async fn test_dashboard_streaks_and_recent_workouts() {
    let app = create_test_app();
    let identity = app.sign_in().await;
    seed_daily_sessions(&app, &identity.id, 7);

    let dashboard = app.ctx.dashboard.load().await;

    assert_eq!(dashboard.stats.total_workouts, 7);
    assert_eq!(dashboard.stats.current_streak, 7);
    assert_eq!(dashboard.stats.longest_streak, 7);
    assert_eq!(dashboard.stats.total_time, 7 * 45);
    assert_eq!(dashboard.stats.average_duration, 45.0);
    assert_eq!(dashboard.recent_workouts.len(), RECENT_WORKOUTS);
    assert_eq!(dashboard.recent_workouts[0].id, "s0");
}

#[tokio::test]
async fn test_dashboard_read_failure_shows_empty_state() {
    let app = create_test_app();
    let identity = app.sign_in().await;
    seed_daily_sessions(&app, &identity.id, 3);
    app.gateway.fail_next("list_weight_entries", 1);

    let dashboard = app.ctx.dashboard.load().await;

    assert_eq!(dashboard, Default::default());
    assert_eq!(app.ctx.dashboard.snapshot(), dashboard);
}

#[tokio::test]
async fn test_dashboard_signed_out_is_empty() {
    let app = create_test_app();
    let dashboard = app.ctx.dashboard.load().await;
    assert_eq!(dashboard.stats.total_workouts, 0);
    assert!(dashboard.recent_workouts.is_empty());
    assert!(dashboard.latest_weight.is_none());
}

#[tokio::test]
async fn test_dashboard_listener_recomputes_on_push() {
    let app = create_test_app();
    let identity = app.sign_in().await;
    app.ctx.dashboard.load().await;
    let reads_before = app.gateway.read_count("list_workout_sessions");
    let _listener = app.ctx.dashboard.spawn_listener();
    let mut rx = app.ctx.dashboard.subscribe();

    app.gateway
        .create_workout_session(&NewWorkoutSession {
            owner_id: identity.id.clone(),
            start_time: start_time(),
            duration_minutes: 0,
            notes: String::new(),
        })
        .await
        .unwrap();

    let dashboard = common::wait_until(&mut rx, |d| d.stats.total_workouts == 1).await;
    assert_eq!(dashboard.stats.current_streak, 1);
    assert!(app.gateway.read_count("list_workout_sessions") > reads_before);
}

#[tokio::test]
async fn test_context_start_and_shutdown() {
    let app = create_test_app();
    let identity = app.sign_in().await;
    seed_daily_sessions(&app, &identity.id, 2);

    app.ctx.start().await;

    assert!(app.ctx.auth.current_identity().is_some());
    assert_eq!(app.ctx.dashboard.snapshot().stats.total_workouts, 2);
    assert_eq!(app.ctx.workout.snapshot().state, Default::default());

    app.ctx.shutdown();
}

#[tokio::test]
async fn test_weight_listener_follows_pushed_rows() {
    let app = create_test_app();
    let identity = app.sign_in().await;
    let _listener = app.ctx.weight.spawn_listener();
    let mut rx = app.ctx.weight.subscribe();

    // Written by another client.
    app.gateway
        .create_weight_entry(&NewWeightEntry {
            owner_id: identity.id.clone(),
            draft: weigh_in(79.5, day(10)),
        })
        .await
        .unwrap();

    let entries = common::wait_until(&mut rx, |e| e.len() == 1).await;
    assert_eq!(entries[0].weight, 79.5);
}

#[tokio::test]
async fn test_weight_listener_ignores_other_owners() {
    let app = create_test_app();
    app.sign_in().await;
    let _listener = app.ctx.weight.spawn_listener();
    let reads_before = app.gateway.read_count("list_weight_entries");

    app.gateway
        .create_weight_entry(&NewWeightEntry {
            owner_id: "someone-else".to_string(),
            draft: weigh_in(60.0, day(10)),
        })
        .await
        .unwrap();
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }

    assert_eq!(app.gateway.read_count("list_weight_entries"), reads_before);
    assert!(app.ctx.weight.entries().is_empty());
}

#[tokio::test]
async fn test_weight_list_clears_on_sign_out() {
    let app = create_test_app();
    app.sign_in().await;
    app.ctx.weight.add(weigh_in(83.0, day(1))).await.unwrap();
    let _listener = app.ctx.weight.spawn_listener();
    let mut rx = app.ctx.weight.subscribe();

    app.ctx.auth.sign_out().await.unwrap();

    common::wait_until(&mut rx, |e| e.is_empty()).await;
}

#[tokio::test]
async fn test_weight_list_loads_on_sign_in() {
    let app = create_test_app();
    let identity = app.gateway.register(EMAIL, PASSWORD, Some("Ana"));
    app.gateway.put_weight_entry(WeightEntry {
        id: "w-old".to_string(),
        owner_id: identity.id.clone(),
        weight: 84.1,
        date: day(2),
        notes: Some("before the holidays".to_string()),
        created_at: None,
    });
    let _listener = app.ctx.weight.spawn_listener();
    let mut rx = app.ctx.weight.subscribe();

    app.ctx.auth.sign_in(EMAIL, PASSWORD).await.unwrap();

    let entries = common::wait_until(&mut rx, |e| !e.is_empty()).await;
    assert_eq!(entries[0].id, "w-old");
}

#[tokio::test]
async fn test_sign_in_after_start_loads_every_view() {
    let app = create_test_app();
    let identity = app.gateway.register(EMAIL, PASSWORD, Some("Ana"));
    seed_daily_sessions(&app, &identity.id, 2);
    app.gateway.put_weight_entry(WeightEntry {
        id: "w1".to_string(),
        owner_id: identity.id.clone(),
        weight: 82.0,
        date: day(14),
        notes: None,
        created_at: None,
    });
    app.ctx.start().await;
    let mut weights = app.ctx.weight.subscribe();
    let mut dashboard = app.ctx.dashboard.subscribe();

    app.ctx.auth.sign_in(EMAIL, PASSWORD).await.unwrap();

    common::wait_until(&mut weights, |e| e.len() == 1).await;
    let loaded = common::wait_until(&mut dashboard, |d| d.stats.total_workouts == 2).await;
    assert_eq!(loaded.latest_weight.map(|w| w.id), Some("w1".to_string()));
    assert!(app.ctx.auth.current_identity().is_some());

    app.ctx.shutdown();
}
