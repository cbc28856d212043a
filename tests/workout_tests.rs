// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Active workout lifecycle and reconciliation tests.

use std::time::Duration;

use fitsync::db::Gateway;
use fitsync::error::AppError;
use fitsync::models::{
    ExerciseDraft, LocalActiveWorkout, NewExercise, WorkoutSession, WorkoutSessionUpdate,
    LOCAL_WORKOUT_ID,
};
use fitsync::services::local_store::{self, ACTIVE_WORKOUT_KEY};
use fitsync::services::WorkoutState;

mod common;

use common::{create_test_app, start_time, TestApp};

fn stored_record(app: &TestApp) -> Option<LocalActiveWorkout> {
    local_store::load_json(app.store.as_ref(), ACTIVE_WORKOUT_KEY)
}

fn squat() -> ExerciseDraft {
    ExerciseDraft {
        name: "Squat".to_string(),
        sets: 3,
        reps: 5,
        weight: Some(100.0),
        notes: None,
    }
}

#[tokio::test]
async fn test_unauthenticated_start_is_local_and_survives_sign_in() {
    let app = create_test_app();

    let state = app.ctx.workout.start().await.unwrap();
    assert!(matches!(state, WorkoutState::ActiveLocal(_)));
    let record = stored_record(&app).expect("local record stored");
    assert_eq!(record.id, LOCAL_WORKOUT_ID);
    assert_eq!(record.start_time, start_time());

    app.sign_in().await;
    app.ctx.workout.load().await;

    // Never uploaded: the local workout stays local.
    match app.ctx.workout.snapshot().state {
        WorkoutState::ActiveLocal(r) => assert_eq!(r.id, LOCAL_WORKOUT_ID),
        other => panic!("expected local workout, got {:?}", other),
    }
}

#[tokio::test]
async fn test_local_workout_resumes_after_restart() {
    let app = create_test_app();
    app.ctx.workout.start().await.unwrap();
    app.clock.advance(Duration::from_secs(90));

    // Fresh manager state; same device storage.
    let restarted = fitsync::services::WorkoutManager::new(
        app.gateway.clone(),
        app.store.clone(),
        app.clock.clone(),
        app.ctx.auth.subscribe(),
    );
    restarted.load().await;

    let snapshot = restarted.snapshot();
    assert!(matches!(snapshot.state, WorkoutState::ActiveLocal(_)));
    assert_eq!(snapshot.elapsed_seconds, 90);
}

#[tokio::test]
async fn test_start_twice_rejected() {
    let app = create_test_app();
    app.ctx.workout.start().await.unwrap();

    let err = app.ctx.workout.start().await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_authenticated_start_stop_writes_whole_minutes() {
    let app = create_test_app();
    app.sign_in().await;

    let session = match app.ctx.workout.start().await.unwrap() {
        WorkoutState::ActiveRemote(session) => session,
        other => panic!("expected remote session, got {:?}", other),
    };
    assert_eq!(stored_record(&app).map(|r| r.id), Some(session.id.clone()));

    app.clock.advance(Duration::from_secs(30 * 60 + 20));
    app.ctx.workout.stop().await.unwrap();

    let closed = app.gateway.workout_session(&session.id).unwrap();
    assert_eq!(closed.duration_minutes, 30);
    assert_eq!(
        closed.end_time,
        Some(start_time() + chrono::Duration::seconds(30 * 60 + 20))
    );
    assert!(stored_record(&app).is_none());
    assert_eq!(app.ctx.workout.snapshot().state, WorkoutState::Idle);
}

#[tokio::test]
async fn test_failed_stop_keeps_session_active() {
    let app = create_test_app();
    app.sign_in().await;
    app.ctx.workout.start().await.unwrap();
    app.gateway.fail_next("update_workout_session", 1);

    assert!(app.ctx.workout.stop().await.is_err());
    assert!(matches!(
        app.ctx.workout.snapshot().state,
        WorkoutState::ActiveRemote(_)
    ));

    app.ctx.workout.stop().await.unwrap();
    assert_eq!(app.ctx.workout.snapshot().state, WorkoutState::Idle);
}

#[tokio::test]
async fn test_open_remote_session_wins_over_local_record() {
    let app = create_test_app();
    let identity = app.sign_in().await;
    local_store::save_json(
        app.store.as_ref(),
        ACTIVE_WORKOUT_KEY,
        &LocalActiveWorkout {
            id: LOCAL_WORKOUT_ID.to_string(),
            start_time: start_time(),
            notes: String::new(),
        },
    )
    .unwrap();
    app.gateway.put_workout_session(WorkoutSession {
        id: "remote-1".to_string(),
        owner_id: identity.id.clone(),
        start_time: start_time() - chrono::Duration::minutes(10),
        end_time: None,
        duration_minutes: 0,
        notes: "from phone".to_string(),
        exercises: Vec::new(),
        created_at: None,
        updated_at: None,
    });

    app.ctx.workout.load().await;

    let snapshot = app.ctx.workout.snapshot();
    match &snapshot.state {
        WorkoutState::ActiveRemote(session) => assert_eq!(session.id, "remote-1"),
        other => panic!("expected remote session, got {:?}", other),
    }
    assert_eq!(snapshot.elapsed_seconds, 600);
    // Shadowed, not merged or deleted.
    assert!(stored_record(&app).is_some());
}

#[tokio::test]
async fn test_stale_mirror_dropped() {
    let app = create_test_app();
    app.sign_in().await;
    let session = match app.ctx.workout.start().await.unwrap() {
        WorkoutState::ActiveRemote(session) => session,
        other => panic!("expected remote session, got {:?}", other),
    };

    // Closed from another device.
    app.gateway
        .update_workout_session(
            &session.id,
            &WorkoutSessionUpdate {
                end_time: Some(start_time() + chrono::Duration::minutes(5)),
                duration_minutes: Some(5),
                notes: None,
            },
        )
        .await
        .unwrap();
    app.ctx.workout.load().await;

    assert_eq!(app.ctx.workout.snapshot().state, WorkoutState::Idle);
    assert!(stored_record(&app).is_none());
}

#[tokio::test]
async fn test_query_failure_falls_back_to_local_record() {
    let app = create_test_app();
    app.ctx.workout.start().await.unwrap();
    app.sign_in().await;
    app.gateway.fail_next("list_workout_sessions", 1);

    app.ctx.workout.load().await;

    assert!(matches!(
        app.ctx.workout.snapshot().state,
        WorkoutState::ActiveLocal(_)
    ));
}

#[tokio::test]
async fn test_exercise_crud_reloads_list() {
    let app = create_test_app();
    app.sign_in().await;
    app.ctx.workout.start().await.unwrap();

    let added = app.ctx.workout.add_exercise(squat()).await.unwrap();
    let snapshot = app.ctx.workout.snapshot();
    assert_eq!(snapshot.state.exercises().len(), 1);
    assert_eq!(snapshot.state.exercises()[0].name, "Squat");

    let edited = app
        .ctx
        .workout
        .edit_exercise(
            &added.id,
            ExerciseDraft {
                name: " Front Squat ".to_string(),
                ..squat()
            },
        )
        .await
        .unwrap();
    assert_eq!(edited.name, "Front Squat");
    assert_eq!(
        app.ctx.workout.snapshot().state.exercises()[0].name,
        "Front Squat"
    );

    app.ctx.workout.delete_exercise(&added.id).await.unwrap();
    assert!(app.ctx.workout.snapshot().state.exercises().is_empty());
}

#[tokio::test]
async fn test_invalid_exercise_never_reaches_gateway() {
    let app = create_test_app();
    app.sign_in().await;
    app.ctx.workout.start().await.unwrap();

    let err = app
        .ctx
        .workout
        .add_exercise(ExerciseDraft {
            sets: 0,
            ..squat()
        })
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Validation(_)));
    assert!(app.ctx.workout.snapshot().state.exercises().is_empty());
}

#[tokio::test]
async fn test_exercise_requires_sign_in() {
    let app = create_test_app();
    app.ctx.workout.start().await.unwrap();

    let err = app.ctx.workout.add_exercise(squat()).await.unwrap_err();

    assert!(err.is_auth_error(), "{:?}", err);
}

#[tokio::test]
async fn test_exercise_requires_active_session() {
    let app = create_test_app();
    app.sign_in().await;

    let err = app.ctx.workout.add_exercise(squat()).await.unwrap_err();

    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_notes_update_local_and_remote() {
    let app = create_test_app();
    app.ctx.workout.start().await.unwrap();
    app.ctx.workout.update_notes("warmup only").await.unwrap();
    assert_eq!(stored_record(&app).unwrap().notes, "warmup only");
    app.ctx.workout.stop().await.unwrap();

    app.sign_in().await;
    let session = match app.ctx.workout.start().await.unwrap() {
        WorkoutState::ActiveRemote(session) => session,
        other => panic!("expected remote session, got {:?}", other),
    };
    app.ctx.workout.update_notes("legs day").await.unwrap();
    assert_eq!(app.gateway.workout_session(&session.id).unwrap().notes, "legs day");
    assert_eq!(app.ctx.workout.snapshot().state.notes(), "legs day");
}

#[tokio::test]
async fn test_notes_without_workout_is_not_found() {
    let app = create_test_app();
    let err = app.ctx.workout.update_notes("x").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_tick_refreshes_elapsed_seconds() {
    let app = create_test_app();
    app.ctx.workout.start().await.unwrap();
    assert_eq!(app.ctx.workout.snapshot().elapsed_seconds, 0);

    app.clock.advance(Duration::from_millis(2_500));
    app.ctx.workout.tick();

    assert_eq!(app.ctx.workout.snapshot().elapsed_seconds, 2);
}

#[tokio::test]
async fn test_pushed_exercise_change_reconciles() {
    let app = create_test_app();
    app.sign_in().await;
    let session = match app.ctx.workout.start().await.unwrap() {
        WorkoutState::ActiveRemote(session) => session,
        other => panic!("expected remote session, got {:?}", other),
    };
    let _tasks = app.ctx.workout.spawn_background();
    let mut rx = app.ctx.workout.subscribe();

    // Written by another client; only the push event tells us.
    app.gateway
        .create_exercise(&NewExercise {
            workout_session_id: session.id.clone(),
            draft: squat(),
        })
        .await
        .unwrap();

    let snapshot = common::wait_until(&mut rx, |s| s.state.exercises().len() == 1).await;
    assert_eq!(snapshot.state.exercises()[0].reps, 5);
}

#[tokio::test]
async fn test_sign_out_reconciles_to_local_view() {
    let app = create_test_app();
    app.sign_in().await;
    app.ctx.workout.start().await.unwrap();
    let _tasks = app.ctx.workout.spawn_background();
    let mut rx = app.ctx.workout.subscribe();

    app.ctx.auth.sign_out().await.unwrap();

    // The mirror is shown as a local workout until the owner signs back in.
    let snapshot = common::wait_until(&mut rx, |s| {
        matches!(s.state, WorkoutState::ActiveLocal(_))
    })
    .await;
    assert_eq!(snapshot.state.start_time(), Some(start_time()));
}

#[tokio::test]
async fn test_start_resumes_session_opened_elsewhere() {
    let app = create_test_app();
    let identity = app.sign_in().await;
    // Opened from another device; this client has not reloaded yet.
    app.gateway.put_workout_session(WorkoutSession {
        id: "remote-open".to_string(),
        owner_id: identity.id.clone(),
        start_time: start_time() - chrono::Duration::minutes(3),
        end_time: None,
        duration_minutes: 0,
        notes: String::new(),
        exercises: Vec::new(),
        created_at: None,
        updated_at: None,
    });

    match app.ctx.workout.start().await.unwrap() {
        WorkoutState::ActiveRemote(session) => assert_eq!(session.id, "remote-open"),
        other => panic!("expected remote session, got {:?}", other),
    }

    let open: Vec<_> = app
        .gateway
        .list_workout_sessions(&identity.id)
        .await
        .unwrap()
        .into_iter()
        .filter(WorkoutSession::is_active)
        .collect();
    assert_eq!(open.len(), 1);
    assert_eq!(stored_record(&app).map(|r| r.id), Some("remote-open".to_string()));
    assert_eq!(app.ctx.workout.snapshot().elapsed_seconds, 180);
}

#[tokio::test]
async fn test_start_fails_when_open_session_check_fails() {
    let app = create_test_app();
    app.sign_in().await;
    app.gateway.fail_next("list_workout_sessions", 1);

    assert!(app.ctx.workout.start().await.is_err());
    assert_eq!(app.ctx.workout.snapshot().state, WorkoutState::Idle);
    assert!(stored_record(&app).is_none());
}
