// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Dashboard data: derived stats, recent workouts and the latest weight.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::db::{ChangeEvent, Gateway, Table};
use crate::models::{DerivedStats, WeightEntry, WorkoutSession};
use crate::services::aggregation::compute_stats;
use crate::services::auth::{concerns_signed_in_user, AuthSnapshot};
use crate::services::clock::Clock;

/// Number of sessions listed under "recent workouts".
pub const RECENT_WORKOUTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DashboardSnapshot {
    pub stats: DerivedStats,
    /// Newest first
    pub recent_workouts: Vec<WorkoutSession>,
    pub latest_weight: Option<WeightEntry>,
}

/// Loads and recomputes the dashboard.
pub struct DashboardService {
    gateway: Arc<dyn Gateway>,
    clock: Arc<dyn Clock>,
    auth: watch::Receiver<AuthSnapshot>,
    state: watch::Sender<DashboardSnapshot>,
}

impl DashboardService {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        clock: Arc<dyn Clock>,
        auth: watch::Receiver<AuthSnapshot>,
    ) -> Self {
        let (state, _) = watch::channel(DashboardSnapshot::default());
        Self {
            gateway,
            clock,
            auth,
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<DashboardSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        self.state.borrow().clone()
    }

    /// Fetch sessions and weights and recompute everything.
    ///
    /// Any read failure is logged and the dashboard falls back to the
    /// empty state.
    pub async fn load(&self) -> DashboardSnapshot {
        let identity = self.auth.borrow().identity.clone();
        let snapshot = match identity {
            None => DashboardSnapshot::default(),
            Some(identity) => {
                let (sessions, weights) = tokio::join!(
                    self.gateway.list_workout_sessions(&identity.id),
                    self.gateway.list_weight_entries(&identity.id),
                );
                match (sessions, weights) {
                    (Ok(sessions), Ok(weights)) => {
                        let today = self.clock.now_utc().date_naive();
                        let stats = compute_stats(&sessions, &weights, today);
                        tracing::debug!(
                            user_id = %identity.id,
                            total_workouts = stats.total_workouts,
                            current_streak = stats.current_streak,
                            "Dashboard recomputed"
                        );
                        DashboardSnapshot {
                            stats,
                            recent_workouts: sessions.into_iter().take(RECENT_WORKOUTS).collect(),
                            latest_weight: weights.into_iter().next(),
                        }
                    }
                    (Err(e), _) | (_, Err(e)) => {
                        tracing::error!(
                            user_id = %identity.id,
                            error = %e,
                            detail = ?e.detail(),
                            "Failed to load dashboard data"
                        );
                        DashboardSnapshot::default()
                    }
                }
            }
        };
        self.state.send_replace(snapshot.clone());
        snapshot
    }

    /// Reload on session or weight changes and on identity changes.
    pub fn spawn_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let sessions = self.gateway.subscribe(Table::WorkoutSessions);
        let weights = self.gateway.subscribe(Table::WeightProgress);
        let auth = self.auth.clone();
        let service = Arc::clone(self);
        tokio::spawn(async move { service.follow(sessions, weights, auth).await })
    }

    async fn follow(
        &self,
        mut sessions: broadcast::Receiver<ChangeEvent>,
        mut weights: broadcast::Receiver<ChangeEvent>,
        mut auth: watch::Receiver<AuthSnapshot>,
    ) {
        loop {
            let reload = tokio::select! {
                event = sessions.recv() => match self.is_relevant(event) {
                    Some(reload) => reload,
                    None => break,
                },
                event = weights.recv() => match self.is_relevant(event) {
                    Some(reload) => reload,
                    None => break,
                },
                changed = auth.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    true
                }
            };
            if reload {
                self.load().await;
            }
        }
        tracing::debug!("Dashboard listener stopped");
    }

    /// `None` once the channel has closed.
    fn is_relevant(&self, event: Result<ChangeEvent, broadcast::error::RecvError>) -> Option<bool> {
        match event {
            Ok(event) => Some(concerns_signed_in_user(&self.auth, &event)),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Dashboard listener lagged, reloading");
                Some(true)
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}
