// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity and session types issued by the external auth provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The authenticated principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Opaque provider-issued user ID
    pub id: String,
    /// Email address used to sign in
    pub email: String,
    /// Display name supplied at sign-up (user metadata), if any
    #[serde(default)]
    pub name: Option<String>,
}

impl Identity {
    /// Display name used when creating a profile lazily.
    ///
    /// Falls back to the local part of the email, then to "User".
    pub fn default_display_name(&self) -> String {
        if let Some(name) = self.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        self.email
            .split('@')
            .next()
            .map(str::trim)
            .filter(|local| !local.is_empty())
            .unwrap_or("User")
            .to_string()
    }
}

/// A persisted provider session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    /// When the access token stops being accepted
    pub expires_at: Option<DateTime<Utc>>,
    pub user: Identity,
}

impl AuthSession {
    /// True if the access token expires within `margin_secs` of `now`.
    pub fn expires_within(&self, now: DateTime<Utc>, margin_secs: i64) -> bool {
        self.expires_at
            .is_some_and(|exp| exp <= now + chrono::Duration::seconds(margin_secs))
    }
}

/// Result of an account creation.
///
/// `session` is `None` while an email-confirmation gate is pending.
#[derive(Debug, Clone)]
pub struct SignUpOutcome {
    pub identity: Identity,
    pub session: Option<AuthSession>,
}

/// Push notification from the auth provider.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    InitialSession(Option<AuthSession>),
    SignedIn(AuthSession),
    TokenRefreshed(AuthSession),
    UserUpdated(AuthSession),
    TokenRefreshFailed,
    SignedOut,
    PasswordRecovery(Option<AuthSession>),
}

impl AuthEvent {
    /// Session carried by the event, if any.
    pub fn session(&self) -> Option<&AuthSession> {
        match self {
            AuthEvent::SignedIn(s) | AuthEvent::TokenRefreshed(s) | AuthEvent::UserUpdated(s) => {
                Some(s)
            }
            AuthEvent::InitialSession(s) | AuthEvent::PasswordRecovery(s) => s.as_ref(),
            AuthEvent::TokenRefreshFailed | AuthEvent::SignedOut => None,
        }
    }

    /// Event name as reported by the provider.
    pub fn name(&self) -> &'static str {
        match self {
            AuthEvent::InitialSession(_) => "INITIAL_SESSION",
            AuthEvent::SignedIn(_) => "SIGNED_IN",
            AuthEvent::TokenRefreshed(_) => "TOKEN_REFRESHED",
            AuthEvent::UserUpdated(_) => "USER_UPDATED",
            AuthEvent::TokenRefreshFailed => "TOKEN_REFRESH_FAILED",
            AuthEvent::SignedOut => "SIGNED_OUT",
            AuthEvent::PasswordRecovery(_) => "PASSWORD_RECOVERY",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(email: &str, name: Option<&str>) -> Identity {
        Identity {
            id: "u1".to_string(),
            email: email.to_string(),
            name: name.map(String::from),
        }
    }

    #[test]
    fn test_default_display_name_fallbacks() {
        assert_eq!(identity("a@b.c", Some("Ana")).default_display_name(), "Ana");
        assert_eq!(identity("jo@b.c", Some("  ")).default_display_name(), "jo");
        assert_eq!(identity("@b.c", None).default_display_name(), "User");
    }
}
