// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use fitsync::config::Config;
use fitsync::db::MemoryGateway;
use fitsync::models::Identity;
use fitsync::services::{FakeClock, MemoryStore};
use fitsync::AppContext;
use tokio::sync::watch;

pub const EMAIL: &str = "ana@example.com";
pub const PASSWORD: &str = "correct horse";

/// Wall-clock start of every test: 2024-05-15 09:00 UTC.
#[allow(dead_code)]
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 15, 9, 0, 0).unwrap()
}

/// Offline test harness: the context plus concrete handles to its fakes.
#[allow(dead_code)]
pub struct TestApp {
    pub ctx: AppContext,
    pub gateway: Arc<MemoryGateway>,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<FakeClock>,
}

impl TestApp {
    /// Register the standard account and sign it in.
    #[allow(dead_code)]
    pub async fn sign_in(&self) -> Identity {
        self.gateway.register(EMAIL, PASSWORD, Some("Ana"));
        self.ctx
            .auth
            .sign_in(EMAIL, PASSWORD)
            .await
            .expect("sign-in should succeed")
    }
}

/// Create a context wired to the in-memory gateway, store and fake clock.
/// Background tasks are not started.
#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    let clock = Arc::new(FakeClock::new(start_time()));
    let gateway = Arc::new(MemoryGateway::new(clock.clone()));
    let store = Arc::new(MemoryStore::new());
    let ctx = AppContext::new(
        Config::test_default(),
        gateway.clone(),
        store.clone(),
        clock.clone(),
    );
    TestApp {
        ctx,
        gateway,
        store,
        clock,
    }
}

/// Wait until the watched value satisfies `pred`, failing after 5 seconds.
#[allow(dead_code)]
pub async fn wait_until<T: Clone>(rx: &mut watch::Receiver<T>, mut pred: impl FnMut(&T) -> bool) -> T {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            {
                let value = rx.borrow_and_update();
                if pred(&value) {
                    return value.clone();
                }
            }
            rx.changed().await.expect("state sender dropped");
        }
    })
    .await;
    waited.expect("timed out waiting for state change")
}
