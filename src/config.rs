//! Application configuration loaded from environment variables.
//!
//! The gateway API key is the only hard requirement; everything else has a
//! sensible local default.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Hosted project endpoint used when `SUPABASE_URL` is not set.
pub const DEFAULT_GATEWAY_URL: &str = "https://llnjfrvnwuekdjudpnzv.supabase.co";

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the hosted backend (REST, auth and realtime live under it)
    pub gateway_url: String,
    /// Public (anon) API key sent with every request
    pub api_key: String,
    /// Directory holding the device-local key-value store
    pub data_dir: PathBuf,
    /// Tick period of the local timer engine
    pub timer_tick: Duration,
    /// Whether to open the push-event channel
    pub realtime_enabled: bool,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// A missing API key is reported as [`ConfigError::Missing`] so the
    /// caller can surface it as a startup diagnostic.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let api_key = env::var("SUPABASE_ANON_KEY")
            .map(|v| v.trim().to_string())
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::Missing("SUPABASE_ANON_KEY"))?;

        let gateway_url = env::var("SUPABASE_URL")
            .unwrap_or_else(|_| DEFAULT_GATEWAY_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        if !gateway_url.starts_with("http://") && !gateway_url.starts_with("https://") {
            return Err(ConfigError::Invalid {
                var: "SUPABASE_URL",
                reason: format!("expected an http(s) URL, got {:?}", gateway_url),
            });
        }

        Ok(Self::with_local_settings(gateway_url, api_key))
    }

    /// Configuration for running without a reachable backend.
    ///
    /// Local settings still come from the environment; the push channel is
    /// always off.
    pub fn offline() -> Self {
        let mut config = Self::with_local_settings(DEFAULT_GATEWAY_URL.to_string(), String::new());
        config.realtime_enabled = false;
        config
    }

    fn with_local_settings(gateway_url: String, api_key: String) -> Self {
        Self {
            gateway_url,
            api_key,
            data_dir: env::var("FITSYNC_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".fitsync")),
            timer_tick: Duration::from_millis(
                env::var("FITSYNC_TIMER_TICK_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .filter(|ms| *ms > 0)
                    .unwrap_or(16),
            ),
            realtime_enabled: env::var("FITSYNC_REALTIME")
                .map(|v| !matches!(v.trim(), "0" | "false" | "off"))
                .unwrap_or(true),
        }
    }

    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            gateway_url: "http://localhost:54321".to_string(),
            api_key: "test_anon_key".to_string(),
            data_dir: env::temp_dir().join("fitsync-test"),
            timer_tick: Duration::from_millis(16),
            realtime_enabled: false,
        }
    }

    /// Websocket endpoint for push events, derived from the gateway URL.
    pub fn realtime_url(&self) -> String {
        let ws_base = if let Some(rest) = self.gateway_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.gateway_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.gateway_url.clone()
        };
        format!(
            "{}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            ws_base, self.api_key
        )
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        env::set_var("SUPABASE_ANON_KEY", "test_key");
        env::set_var("SUPABASE_URL", "https://example.supabase.co/");
        env::set_var("FITSYNC_TIMER_TICK_MS", "not-a-number");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.api_key, "test_key");
        assert_eq!(config.gateway_url, "https://example.supabase.co");
        assert_eq!(config.timer_tick, Duration::from_millis(16));
        assert_eq!(
            config.realtime_url(),
            "wss://example.supabase.co/realtime/v1/websocket?apikey=test_key&vsn=1.0.0"
        );
    }

    #[test]
    fn test_offline_config_disables_realtime() {
        let config = Config::offline();
        assert!(config.api_key.is_empty());
        assert!(!config.realtime_enabled);
        assert_eq!(config.gateway_url, DEFAULT_GATEWAY_URL);
    }

    #[test]
    fn test_realtime_url_plain_http() {
        let config = Config::test_default();
        assert!(config
            .realtime_url()
            .starts_with("ws://localhost:54321/realtime/v1/websocket"));
    }
}
