// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session and profile state.
//!
//! Handles:
//! - Restoring the persisted session at startup
//! - Reacting to auth events pushed by the gateway
//! - Sign-in with lazy profile creation and the login streak update
//! - Profile refresh and name edits
//!
//! The current identity and profile are published on a `watch` channel;
//! the presentation layer renders from [`AuthManager::subscribe`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;

use crate::db::{ChangeEvent, Gateway};
use crate::error::{AppError, Result};
use crate::models::{AuthEvent, Identity, NewProfile, Profile, ProfileUpdate, SignUpOutcome};
use crate::services::clock::Clock;
use crate::time_utils::whole_days_between;

/// What the presentation layer renders for the signed-in user.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSnapshot {
    pub identity: Option<Identity>,
    pub profile: Option<Profile>,
    /// True until the first session check has completed
    pub loading: bool,
}

impl Default for AuthSnapshot {
    fn default() -> Self {
        Self {
            identity: None,
            profile: None,
            loading: true,
        }
    }
}

/// Next login streak given the last login stamp.
///
/// Whole 24-hour periods since the last login decide: none means the same
/// day (unchanged), one extends the streak, more resets it. A profile that
/// was never stamped starts at 1.
pub fn next_streak_count(current: u32, last_login: Option<DateTime<Utc>>, now: DateTime<Utc>) -> u32 {
    let Some(last_login) = last_login else {
        return 1;
    };
    match whole_days_between(last_login, now) {
        // Clock skew can put the stamp in the future; treat it as today.
        d if d <= 0 => current,
        1 => current.saturating_add(1),
        _ => 1,
    }
}

/// Whether a pushed row can change what the signed-in user sees.
pub(crate) fn concerns_signed_in_user(auth: &watch::Receiver<AuthSnapshot>, event: &ChangeEvent) -> bool {
    let owner = auth.borrow().identity.as_ref().map(|i| i.id.clone());
    owner.is_some_and(|owner| event.concerns_owner(&owner))
}

/// Owner of the current identity and profile.
pub struct AuthManager {
    gateway: Arc<dyn Gateway>,
    clock: Arc<dyn Clock>,
    state: watch::Sender<AuthSnapshot>,
    /// Serializes profile fetch-and-publish between intents and events
    adopting: Mutex<()>,
}

impl AuthManager {
    pub fn new(gateway: Arc<dyn Gateway>, clock: Arc<dyn Clock>) -> Self {
        let (state, _) = watch::channel(AuthSnapshot::default());
        Self {
            gateway,
            clock,
            state,
            adopting: Mutex::new(()),
        }
    }

    /// Receive every state change.
    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        self.state.borrow().clone()
    }

    pub fn current_identity(&self) -> Option<Identity> {
        self.state.borrow().identity.clone()
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────────

    /// Restore the persisted session, if any.
    ///
    /// Never leaves the snapshot loading: a failed query is treated as
    /// signed out.
    pub async fn init(&self) {
        match self.gateway.get_session().await {
            Ok(Some(session)) => {
                tracing::info!(user_id = %session.user.id, "Restored persisted session");
                self.adopt(session.user).await;
            }
            Ok(None) => {
                tracing::info!("No persisted session");
                // Drop any stale credential the gateway may still hold.
                self.best_effort_sign_out().await;
                self.clear();
            }
            Err(e) => {
                tracing::warn!(error = %e, "Session query failed, starting signed out");
                self.clear();
            }
        }
    }

    /// Spawn the task that applies gateway auth events.
    pub fn spawn_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let events = self.gateway.auth_events();
        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.run(events).await })
    }

    async fn run(&self, mut events: broadcast::Receiver<AuthEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => self.handle_auth_event(event).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Auth listener lagged, re-checking session");
                    self.on_foreground().await;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    /// Apply one auth event.
    pub async fn handle_auth_event(&self, event: AuthEvent) {
        let name = event.name();
        tracing::debug!(
            event = name,
            user_id = ?event.session().map(|s| s.user.id.as_str()),
            "Handling auth event"
        );
        match event {
            AuthEvent::SignedIn(session)
            | AuthEvent::TokenRefreshed(session)
            | AuthEvent::UserUpdated(session) => {
                self.adopt_from_event(session.user).await;
            }
            AuthEvent::TokenRefreshFailed | AuthEvent::SignedOut => {
                // A queued event can predate a newer sign-in.
                if let Ok(Some(session)) = self.gateway.get_session().await {
                    tracing::debug!(event = name, user_id = %session.user.id, "Ignoring stale sign-out event");
                    return;
                }
                let had_identity = self.state.borrow().identity.is_some();
                self.clear();
                // The gateway echoes SignedOut for our own call; with the
                // identity already cleared that echo stops here.
                if had_identity {
                    self.best_effort_sign_out().await;
                }
            }
            AuthEvent::InitialSession(session) | AuthEvent::PasswordRecovery(session) => {
                let identity = session.map(|s| s.user);
                self.state.send_modify(|s| {
                    let same_user = match (&identity, &s.profile) {
                        (Some(i), Some(p)) => i.id == p.id,
                        _ => false,
                    };
                    if !same_user {
                        s.profile = None;
                    }
                    s.identity = identity;
                    s.loading = false;
                });
            }
        }
    }

    /// Re-check the session after the client returns to the foreground.
    pub async fn on_foreground(&self) {
        match self.gateway.get_session().await {
            Ok(Some(_)) => {}
            Ok(None) => {
                if self.state.borrow().identity.is_some() {
                    tracing::info!("Session expired while backgrounded");
                }
                self.clear();
            }
            Err(e) => {
                tracing::warn!(error = %e, "Foreground session check failed");
            }
        }
    }

    // ─── Intents ─────────────────────────────────────────────────────────────

    /// Sign in, create the profile if missing and advance the login streak.
    ///
    /// Only the credential check can fail the call; profile and streak
    /// failures are logged.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity> {
        let session = self.gateway.sign_in(email, password).await?;
        let identity = session.user;
        tracing::info!(user_id = %identity.id, "Sign-in succeeded");

        if let Err(e) = self.ensure_profile(&identity).await {
            tracing::warn!(user_id = %identity.id, error = %e, "Failed to create profile");
        }
        if let Err(e) = self.update_streak_count(&identity).await {
            tracing::warn!(user_id = %identity.id, error = %e, "Failed to update streak");
        }

        self.adopt(identity.clone()).await;
        Ok(identity)
    }

    /// Create an account. A profile is created only when the gateway
    /// returns an active session right away.
    pub async fn sign_up(&self, email: &str, password: &str, name: &str) -> Result<SignUpOutcome> {
        let outcome = self.gateway.sign_up(email, password, name).await?;

        match &outcome.session {
            Some(session) => {
                let identity = &session.user;
                let display_name = match name.trim() {
                    "" => identity.default_display_name(),
                    trimmed => trimmed.to_string(),
                };
                let profile = NewProfile {
                    id: identity.id.clone(),
                    name: display_name,
                    email: identity.email.clone(),
                    created_at: self.clock.now_utc(),
                };
                if let Err(e) = self.gateway.create_profile(&profile).await {
                    tracing::warn!(user_id = %identity.id, error = %e, "Failed to create profile at sign-up");
                }
                self.adopt(identity.clone()).await;
            }
            None => {
                tracing::info!(user_id = %outcome.identity.id, "Sign-up pending email confirmation");
            }
        }
        Ok(outcome)
    }

    /// Sign out. Gateway failures are returned to the caller.
    pub async fn sign_out(&self) -> Result<()> {
        self.gateway.sign_out().await?;
        self.clear();
        Ok(())
    }

    /// Re-fetch the profile of the current identity.
    pub async fn refresh_user_profile(&self) {
        let Some(identity) = self.current_identity() else {
            return;
        };
        let profile = self.fetch_profile(&identity.id).await;
        self.state.send_modify(|s| {
            if s.identity.as_ref().is_some_and(|i| i.id == identity.id) {
                s.profile = profile;
            }
        });
    }

    /// Rename the current user's profile.
    pub async fn update_profile_name(&self, name: &str) -> Result<Profile> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("name: must not be empty".to_string()));
        }
        let identity = self
            .current_identity()
            .ok_or_else(|| AppError::Auth("Not signed in".to_string()))?;

        let update = ProfileUpdate {
            name: Some(name.to_string()),
            streak_count: None,
            updated_at: self.clock.now_utc(),
        };
        let profile = self.gateway.update_profile(&identity.id, &update).await?;
        tracing::info!(user_id = %identity.id, "Profile name updated");
        self.state.send_modify(|s| s.profile = Some(profile.clone()));
        Ok(profile)
    }

    /// Recompute and persist the login streak of `identity`.
    ///
    /// Not guarded against overlapping calls for the same identity.
    pub async fn update_streak_count(&self, identity: &Identity) -> Result<Profile> {
        let profile = self
            .gateway
            .get_profile(&identity.id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Profile {}", identity.id)))?;

        let now = self.clock.now_utc();
        let streak = next_streak_count(profile.streak_count, profile.updated_at, now);
        tracing::debug!(
            user_id = %identity.id,
            previous = profile.streak_count,
            streak,
            "Updating login streak"
        );

        let update = ProfileUpdate {
            name: None,
            streak_count: Some(streak),
            updated_at: now,
        };
        self.gateway.update_profile(&identity.id, &update).await
    }

    // ─── Internals ───────────────────────────────────────────────────────────

    async fn ensure_profile(&self, identity: &Identity) -> Result<()> {
        if self.gateway.get_profile(&identity.id).await?.is_some() {
            return Ok(());
        }
        let profile = NewProfile {
            id: identity.id.clone(),
            name: identity.default_display_name(),
            email: identity.email.clone(),
            created_at: self.clock.now_utc(),
        };
        self.gateway.create_profile(&profile).await?;
        tracing::info!(user_id = %identity.id, "Created profile");
        Ok(())
    }

    async fn fetch_profile(&self, user_id: &str) -> Option<Profile> {
        match self.gateway.get_profile(user_id).await {
            Ok(profile) => profile,
            Err(e) => {
                tracing::error!(user_id, error = %e, detail = ?e.detail(), "Failed to fetch profile");
                None
            }
        }
    }

    /// Fetch the profile of `identity` and publish both.
    async fn adopt(&self, identity: Identity) {
        let _guard = self.adopting.lock().await;
        self.publish_with_profile(identity).await;
    }

    /// Event-side adopt. The intent that caused the event has already
    /// published a fresh profile for this identity; only the identity
    /// (with its refreshed session data) is taken from the event then.
    async fn adopt_from_event(&self, identity: Identity) {
        let _guard = self.adopting.lock().await;
        let current = {
            let state = self.state.borrow();
            state.identity.as_ref().map(|i| i.id == identity.id).unwrap_or(false)
                && state.profile.is_some()
        };
        if current {
            self.state.send_if_modified(|s| {
                let changed = s.identity.as_ref() != Some(&identity) || s.loading;
                s.identity = Some(identity);
                s.loading = false;
                changed
            });
            return;
        }
        self.publish_with_profile(identity).await;
    }

    async fn publish_with_profile(&self, identity: Identity) {
        let profile = self.fetch_profile(&identity.id).await;
        self.state.send_modify(|s| {
            s.identity = Some(identity);
            s.profile = profile;
            s.loading = false;
        });
    }

    fn clear(&self) {
        self.state.send_modify(|s| {
            s.identity = None;
            s.profile = None;
            s.loading = false;
        });
    }

    async fn best_effort_sign_out(&self) {
        if let Err(e) = self.gateway.sign_out().await {
            tracing::debug!(error = %e, "Forced sign-out failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 15, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_next_streak_consecutive_day() {
        assert_eq!(next_streak_count(5, Some(now() - Duration::hours(30)), now()), 6);
    }

    #[test]
    fn test_next_streak_same_day() {
        assert_eq!(next_streak_count(5, Some(now() - Duration::hours(3)), now()), 5);
        assert_eq!(next_streak_count(5, Some(now() + Duration::minutes(2)), now()), 5);
    }

    #[test]
    fn test_next_streak_gap_resets() {
        assert_eq!(next_streak_count(5, Some(now() - Duration::days(3)), now()), 1);
        assert_eq!(next_streak_count(5, Some(now() - Duration::hours(48)), now()), 1);
    }

    #[test]
    fn test_next_streak_first_login() {
        assert_eq!(next_streak_count(0, None, now()), 1);
        assert_eq!(next_streak_count(9, None, now()), 1);
    }
}
