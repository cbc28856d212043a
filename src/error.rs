// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types shared by the gateway and the state managers.

/// Application error type.
///
/// Gateway adapters map transport and HTTP failures into these variants so
/// the state managers can decide what to surface and what to swallow.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Gateway unreachable: {0}")]
    Network(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Database error: {message}")]
    Database {
        message: String,
        details: Option<String>,
    },

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Build a database error without extra detail.
    pub fn database(message: impl Into<String>) -> Self {
        AppError::Database {
            message: message.into(),
            details: None,
        }
    }

    /// True for bad credentials or an expired/invalid session.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, AppError::Auth(_))
    }

    /// True when the gateway could not be reached at all.
    pub fn is_network_error(&self) -> bool {
        matches!(self, AppError::Network(_))
    }

    /// Secondary detail reported by the gateway, if any.
    pub fn detail(&self) -> Option<&str> {
        match self {
            AppError::Database { details, .. } => details.as_deref(),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AppError::database(format!("Malformed gateway response: {}", err))
        } else {
            AppError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(anyhow::anyhow!("JSON error: {}", err))
    }
}

/// Result type alias used across the crate.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(AppError::Auth("Invalid login credentials".to_string()).is_auth_error());
        assert!(!AppError::NotFound("profile".to_string()).is_auth_error());
        assert!(AppError::Network("connection refused".to_string()).is_network_error());
    }

    #[test]
    fn test_database_detail() {
        let err = AppError::Database {
            message: "duplicate key".to_string(),
            details: Some("Key (id)=(abc) already exists.".to_string()),
        };
        assert_eq!(err.detail(), Some("Key (id)=(abc) already exists."));
        assert_eq!(err.to_string(), "Database error: duplicate key");
        assert_eq!(AppError::database("x").detail(), None);
    }
}
