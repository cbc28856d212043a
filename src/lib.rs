// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! FitSync: client-side state sync for a fitness tracker
//!
//! This crate keeps the local view of a user's workouts, weight history
//! and timer in step with a hosted backend that pushes row changes.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod time_utils;

use std::sync::{Arc, Mutex};

use config::Config;
use db::Gateway;
use services::{
    AuthManager, Clock, DashboardService, LocalStore, TaskSet, TimerEngine, WeightService,
    WorkoutManager,
};

/// Explicit application context handed to the presentation layer.
///
/// Owns the gateway handle and every state manager. Background tasks are
/// started by [`AppContext::start`] and torn down by
/// [`AppContext::shutdown`] (or on drop).
pub struct AppContext {
    pub config: Config,
    pub gateway: Arc<dyn Gateway>,
    pub store: Arc<dyn LocalStore>,
    pub clock: Arc<dyn Clock>,
    pub auth: Arc<AuthManager>,
    pub workout: Arc<WorkoutManager>,
    pub timer: Arc<TimerEngine>,
    pub weight: Arc<WeightService>,
    pub dashboard: Arc<DashboardService>,
    tasks: Mutex<TaskSet>,
}

impl AppContext {
    pub fn new(
        config: Config,
        gateway: Arc<dyn Gateway>,
        store: Arc<dyn LocalStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let auth = Arc::new(AuthManager::new(gateway.clone(), clock.clone()));
        let workout = Arc::new(WorkoutManager::new(
            gateway.clone(),
            store.clone(),
            clock.clone(),
            auth.subscribe(),
        ));
        let timer = Arc::new(TimerEngine::new(
            gateway.clone(),
            clock.clone(),
            auth.subscribe(),
        ));
        let weight = Arc::new(WeightService::new(gateway.clone(), auth.subscribe()));
        let dashboard = Arc::new(DashboardService::new(
            gateway.clone(),
            clock.clone(),
            auth.subscribe(),
        ));

        Self {
            config,
            gateway,
            store,
            clock,
            auth,
            workout,
            timer,
            weight,
            dashboard,
            tasks: Mutex::new(TaskSet::new()),
        }
    }

    /// Restore the session, load every view and start background tasks.
    pub async fn start(&self) {
        let mut tasks = TaskSet::new();
        // Subscribe before the session check so no auth event is missed.
        tasks.push(self.auth.spawn_listener());
        self.auth.init().await;

        self.workout.load().await;
        self.weight.load().await;
        self.dashboard.load().await;

        tasks.extend(self.workout.spawn_background());
        tasks.push(self.dashboard.spawn_listener());
        tasks.push(self.weight.spawn_listener());
        tasks.push(self.timer.spawn_ticker(self.config.timer_tick));

        tracing::info!(tasks = tasks.len(), "Application context started");
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(tasks);
    }

    /// Stop every background task.
    pub fn shutdown(&self) {
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .abort_all();
        tracing::info!("Application context stopped");
    }
}
