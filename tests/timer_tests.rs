// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Local timer engine tests, driven by the fake clock.

use std::time::Duration;

use fitsync::models::TimerMode;
use fitsync::services::TimerStatus;

mod common;

use common::create_test_app;

#[tokio::test]
async fn test_stopwatch_pause_resume_saves_seventy_seconds() {
    let app = create_test_app();
    app.sign_in().await;
    let timer = &app.ctx.timer;

    timer.start();
    app.clock.advance(Duration::from_secs(65));
    timer.tick();
    timer.pause();

    // Paused time is not counted.
    app.clock.advance(Duration::from_secs(120));
    timer.tick();
    assert_eq!(timer.snapshot().elapsed, Duration::from_secs(65));

    timer.resume();
    app.clock.advance(Duration::from_secs(5));

    let entry = timer.save().await.unwrap().expect("entry written");
    assert_eq!(entry.time_seconds, 70);
    assert_eq!(entry.note, "Exercise");
    assert_eq!(app.gateway.timer_entries().len(), 1);

    let snapshot = timer.snapshot();
    assert_eq!(snapshot.status, TimerStatus::Stopped);
    assert_eq!(snapshot.elapsed, Duration::ZERO);
}

#[tokio::test]
async fn test_countdown_overrun_saves_zero() {
    let app = create_test_app();
    app.sign_in().await;
    let timer = &app.ctx.timer;

    timer.set_mode(TimerMode::Countdown);
    timer.set_countdown_seconds(60);
    timer.set_note("Plank");
    timer.start();
    app.clock.advance(Duration::from_secs(75));
    timer.tick();

    let snapshot = timer.snapshot();
    assert_eq!(snapshot.display, Duration::ZERO);
    assert!(snapshot.finished);
    assert_eq!(snapshot.status, TimerStatus::Running);

    let entry = timer.save().await.unwrap().expect("entry written");
    assert_eq!(entry.time_seconds, 0);
    assert_eq!(entry.note, "Plank");
    // The label goes back to the default after a save.
    assert_eq!(timer.snapshot().note, "Exercise");
}

#[tokio::test]
async fn test_countdown_partial_run() {
    let app = create_test_app();
    app.sign_in().await;
    let timer = &app.ctx.timer;

    timer.set_mode(TimerMode::Countdown);
    timer.set_countdown_seconds(90);
    timer.start();
    app.clock.advance(Duration::from_millis(30_400));

    let entry = timer.save().await.unwrap().expect("entry written");
    assert_eq!(entry.time_seconds, 60);
}

#[tokio::test]
async fn test_save_signed_out_is_noop() {
    let app = create_test_app();
    let timer = &app.ctx.timer;

    timer.start();
    app.clock.advance(Duration::from_secs(10));

    assert!(timer.save().await.unwrap().is_none());
    assert!(app.gateway.timer_entries().is_empty());
    assert_eq!(timer.snapshot().status, TimerStatus::Running);
}

#[tokio::test]
async fn test_save_without_elapsed_time_is_noop() {
    let app = create_test_app();
    app.sign_in().await;

    assert!(app.ctx.timer.save().await.unwrap().is_none());
    assert!(app.gateway.timer_entries().is_empty());
}

#[tokio::test]
async fn test_blank_note_defaults() {
    let app = create_test_app();
    app.sign_in().await;
    let timer = &app.ctx.timer;

    timer.set_note("   ");
    timer.start();
    app.clock.advance(Duration::from_secs(3));

    let entry = timer.save().await.unwrap().unwrap();
    assert_eq!(entry.note, "Exercise");
}

#[tokio::test]
async fn test_failed_save_keeps_reading() {
    let app = create_test_app();
    app.sign_in().await;
    let timer = &app.ctx.timer;
    app.gateway.fail_next("create_timer_entry", 1);

    timer.start();
    app.clock.advance(Duration::from_secs(12));
    assert!(timer.save().await.is_err());
    assert_eq!(timer.snapshot().elapsed, Duration::from_secs(12));

    let entry = timer.save().await.unwrap().unwrap();
    assert_eq!(entry.time_seconds, 12);
}

#[tokio::test]
async fn test_mode_switch_resets() {
    let app = create_test_app();
    let timer = &app.ctx.timer;

    timer.start();
    app.clock.advance(Duration::from_secs(30));
    timer.tick();
    timer.set_mode(TimerMode::Countdown);

    let snapshot = timer.snapshot();
    assert_eq!(snapshot.mode, TimerMode::Countdown);
    assert_eq!(snapshot.status, TimerStatus::Stopped);
    assert_eq!(snapshot.elapsed, Duration::ZERO);
}

#[tokio::test]
async fn test_negative_countdown_input_clamped() {
    let app = create_test_app();
    app.ctx.timer.set_countdown_seconds(-15);
    assert_eq!(app.ctx.timer.snapshot().countdown_seconds, 0);
}

#[tokio::test(start_paused = true)]
async fn test_ticker_task_publishes_and_stops_on_abort() {
    let app = create_test_app();
    let timer = app.ctx.timer.clone();
    let mut rx = timer.subscribe();

    let ticker = timer.spawn_ticker(Duration::from_millis(16));
    timer.start();
    app.clock.advance(Duration::from_secs(2));

    let snapshot = common::wait_until(&mut rx, |s| s.elapsed == Duration::from_secs(2)).await;
    assert_eq!(snapshot.display, Duration::from_secs(2));

    ticker.abort();
    let _ = ticker.await;
    app.clock.advance(Duration::from_secs(5));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(timer.snapshot().elapsed, Duration::from_secs(2));
}
