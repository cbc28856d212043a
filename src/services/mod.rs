// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - state managers and business logic.

pub mod aggregation;
pub mod auth;
pub mod clock;
pub mod dashboard;
pub mod local_store;
pub mod tasks;
pub mod timer;
pub mod weight;
pub mod workout;

pub use auth::{AuthManager, AuthSnapshot};
pub use clock::{Clock, FakeClock, SystemClock};
pub use dashboard::{DashboardService, DashboardSnapshot};
pub use local_store::{FileStore, LocalStore, MemoryStore};
pub use tasks::TaskSet;
pub use timer::{TimerEngine, TimerSnapshot, TimerStatus};
pub use weight::WeightService;
pub use workout::{WorkoutManager, WorkoutSnapshot, WorkoutState};
