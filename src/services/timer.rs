// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Local stopwatch / countdown engine.
//!
//! Elapsed time is accumulated from the injected monotonic clock as
//! `base + (now - mark)`, with the mark reseeded on every sample, so
//! pausing never loses time and tick jitter never drifts. The engine does
//! not touch the network until `save()`.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::db::Gateway;
use crate::error::Result;
use crate::models::timer::DEFAULT_TIMER_NOTE;
use crate::models::{NewTimerEntry, TimerEntry, TimerMode};
use crate::services::auth::AuthSnapshot;
use crate::services::clock::Clock;
use crate::services::tasks::spawn_periodic;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerStatus {
    Stopped,
    Running,
    Paused,
}

/// Rendered timer state.
#[derive(Debug, Clone, PartialEq)]
pub struct TimerSnapshot {
    pub mode: TimerMode,
    pub status: TimerStatus,
    /// Accumulated running time
    pub elapsed: Duration,
    /// Configured countdown length in whole seconds
    pub countdown_seconds: u64,
    /// Stopwatch: elapsed. Countdown: remaining, floored at zero.
    pub display: Duration,
    /// Countdown reached zero; the accumulator keeps running
    pub finished: bool,
    pub note: String,
}

#[derive(Debug)]
struct TimerCore {
    mode: TimerMode,
    status: TimerStatus,
    base: Duration,
    mark: Option<Duration>,
    countdown_seconds: u64,
    note: String,
}

impl TimerCore {
    fn new() -> Self {
        Self {
            mode: TimerMode::Stopwatch,
            status: TimerStatus::Stopped,
            base: Duration::ZERO,
            mark: None,
            countdown_seconds: 0,
            note: DEFAULT_TIMER_NOTE.to_string(),
        }
    }

    /// Fold the time since the last mark into `base`.
    fn sample(&mut self, now: Duration) {
        if let Some(mark) = self.mark {
            self.base += now.saturating_sub(mark);
            self.mark = Some(now);
        }
    }

    fn reset(&mut self) {
        self.status = TimerStatus::Stopped;
        self.base = Duration::ZERO;
        self.mark = None;
    }

    fn countdown(&self) -> Duration {
        Duration::from_secs(self.countdown_seconds)
    }

    /// Whole seconds written by `save()`.
    fn persisted_seconds(&self) -> u64 {
        let elapsed = self.base.as_secs();
        match self.mode {
            TimerMode::Stopwatch => elapsed,
            TimerMode::Countdown => self.countdown_seconds.saturating_sub(elapsed),
        }
    }

    fn snapshot(&self) -> TimerSnapshot {
        let (display, finished) = match self.mode {
            TimerMode::Stopwatch => (self.base, false),
            TimerMode::Countdown => {
                let remaining = self.countdown().saturating_sub(self.base);
                let started = self.base > Duration::ZERO;
                (remaining, started && remaining.is_zero())
            }
        };
        TimerSnapshot {
            mode: self.mode,
            status: self.status,
            elapsed: self.base,
            countdown_seconds: self.countdown_seconds,
            display,
            finished,
            note: self.note.clone(),
        }
    }
}

/// Stopwatch / countdown timer that logs readings to the gateway.
pub struct TimerEngine {
    gateway: Arc<dyn Gateway>,
    clock: Arc<dyn Clock>,
    auth: watch::Receiver<AuthSnapshot>,
    core: Mutex<TimerCore>,
    state: watch::Sender<TimerSnapshot>,
}

impl TimerEngine {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        clock: Arc<dyn Clock>,
        auth: watch::Receiver<AuthSnapshot>,
    ) -> Self {
        let core = TimerCore::new();
        let (state, _) = watch::channel(core.snapshot());
        Self {
            gateway,
            clock,
            auth,
            core: Mutex::new(core),
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<TimerSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        self.state.borrow().clone()
    }

    fn core(&self) -> MutexGuard<'_, TimerCore> {
        self.core.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply `f` to the core and publish the resulting snapshot.
    fn update<R>(&self, f: impl FnOnce(&mut TimerCore, Duration) -> R) -> R {
        let now = self.clock.monotonic();
        let (result, snapshot) = {
            let mut core = self.core();
            let result = f(&mut core, now);
            (result, core.snapshot())
        };
        self.state.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });
        result
    }

    /// Start, or resume from pause.
    pub fn start(&self) {
        self.update(|core, now| {
            if core.status != TimerStatus::Running {
                core.status = TimerStatus::Running;
                core.mark = Some(now);
            }
        });
    }

    pub fn pause(&self) {
        self.update(|core, now| {
            if core.status == TimerStatus::Running {
                core.sample(now);
                core.mark = None;
                core.status = TimerStatus::Paused;
            }
        });
    }

    pub fn resume(&self) {
        self.start();
    }

    /// Zero the accumulator and stop.
    pub fn reset(&self) {
        self.update(|core, _| core.reset());
    }

    /// Switch between stopwatch and countdown. Always resets.
    pub fn set_mode(&self, mode: TimerMode) {
        self.update(|core, _| {
            core.mode = mode;
            core.reset();
        });
    }

    /// Configure the countdown length; negative input counts as zero.
    pub fn set_countdown_seconds(&self, seconds: i64) {
        let seconds = u64::try_from(seconds).unwrap_or(0);
        self.update(|core, _| core.countdown_seconds = seconds);
    }

    pub fn set_note(&self, note: &str) {
        self.update(|core, _| core.note = note.to_string());
    }

    /// Sample the clock; called by the ticker task.
    pub fn tick(&self) {
        self.update(|core, now| core.sample(now));
    }

    /// Spawn the periodic ticker. Abort the handle on teardown.
    pub fn spawn_ticker(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        spawn_periodic(period, move || engine.tick())
    }

    /// Log the current reading and reset.
    ///
    /// Returns `Ok(None)` without writing when nobody is signed in or no
    /// time has been accumulated. A failed write leaves the timer intact.
    pub async fn save(&self) -> Result<Option<TimerEntry>> {
        let identity = self.auth.borrow().identity.clone();
        let Some(identity) = identity else {
            tracing::debug!("Timer save skipped: not signed in");
            return Ok(None);
        };

        let pending = self.update(|core, now| {
            core.sample(now);
            if core.base.is_zero() {
                return None;
            }
            let note = match core.note.trim() {
                "" => DEFAULT_TIMER_NOTE.to_string(),
                trimmed => trimmed.to_string(),
            };
            Some(NewTimerEntry {
                owner_id: identity.id.clone(),
                note,
                time_seconds: core.persisted_seconds(),
            })
        });
        let Some(entry) = pending else {
            tracing::debug!("Timer save skipped: nothing elapsed");
            return Ok(None);
        };

        let saved = self.gateway.create_timer_entry(&entry).await?;
        tracing::info!(
            user_id = %identity.id,
            seconds = saved.time_seconds,
            note = %saved.note,
            "Saved timer entry"
        );

        self.update(|core, _| {
            core.reset();
            core.note = DEFAULT_TIMER_NOTE.to_string();
        });
        Ok(Some(saved))
    }
}
