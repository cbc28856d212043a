// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! FitSync headless driver
//!
//! Restores the persisted session, logs the dashboard, then follows push
//! events and logs every recomputation until interrupted.

use std::sync::Arc;

use fitsync::{
    config::Config,
    db::{Gateway, MemoryGateway, SupabaseGateway},
    services::{Clock, FileStore, LocalStore, SystemClock},
    time_utils::format_hms,
    AppContext,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());

    let (config, online) = match Config::from_env() {
        Ok(config) => (config, true),
        Err(e) => {
            // Surface the diagnostic, then keep working against local state.
            tracing::error!(error = %e, "Configuration incomplete, running offline");
            (Config::offline(), false)
        }
    };

    let store: Arc<dyn LocalStore> = Arc::new(FileStore::new(&config.data_dir)?);
    tracing::info!(data_dir = %config.data_dir.display(), "Local store ready");

    let gateway: Arc<dyn Gateway> = if online {
        tracing::info!(
            url = %config.gateway_url,
            realtime = config.realtime_enabled,
            "Using hosted gateway"
        );
        Arc::new(SupabaseGateway::new(&config, store.clone(), clock.clone()))
    } else {
        Arc::new(MemoryGateway::new(clock.clone()))
    };

    let ctx = AppContext::new(config, gateway, store, clock);
    ctx.start().await;

    let auth = ctx.auth.snapshot();
    match &auth.identity {
        Some(identity) => tracing::info!(
            user_id = %identity.id,
            streak = auth.profile.as_ref().map(|p| p.streak_count),
            "Signed in"
        ),
        None => tracing::info!("Not signed in"),
    }
    let workout = ctx.workout.snapshot();
    tracing::info!(
        workout = ?workout.state,
        elapsed = %format_hms(workout.elapsed_seconds),
        "Active workout"
    );

    let mut dashboard = ctx.dashboard.subscribe();
    log_stats(&dashboard.borrow_and_update().stats);

    loop {
        tokio::select! {
            changed = dashboard.changed() => {
                if changed.is_err() {
                    break;
                }
                log_stats(&dashboard.borrow_and_update().stats);
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, shutting down");
                break;
            }
        }
    }

    ctx.shutdown();
    Ok(())
}

fn log_stats(stats: &fitsync::models::DerivedStats) {
    match serde_json::to_string(stats) {
        Ok(json) => tracing::info!(stats = %json, "Dashboard stats"),
        Err(e) => tracing::warn!(error = %e, "Failed to serialize stats"),
    }
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fitsync=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
