use std::time::Duration;

use anclora_core::upload::DEFAULT_MAX_UPLOAD_BYTES;

use crate::poll::DEFAULT_POLL_INTERVAL;
use crate::push::{PushSettings, DEFAULT_CONNECT_TIMEOUT, DEFAULT_HEARTBEAT_INTERVAL};
use crate::reconnect::{ReconnectConfig, DEFAULT_RECONNECT_DELAY};
use crate::tracker::TrackerConfig;

const DEFAULT_API_URL: &str = "http://localhost:8030";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// A configuration variable held a value that could not be used.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: '{value}'")]
    Invalid { var: &'static str, value: String },
}

/// Client configuration loaded from environment variables.
///
/// All fields have defaults suitable for a local ingestion server.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base HTTP URL of the ingestion API.
    pub api_url: String,
    /// Base WebSocket URL for the push channel.
    pub ws_url: String,
    pub poll_interval: Duration,
    /// Wait before reopening a dropped push channel.
    pub reconnect_delay: Duration,
    pub heartbeat_interval: Duration,
    /// Bound on one push channel handshake.
    pub connect_timeout: Duration,
    /// Bound on one HTTP request.
    pub request_timeout: Duration,
    /// `None` tracks jobs indefinitely.
    pub tracking_timeout: Option<Duration>,
    pub max_upload_bytes: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            ws_url: derive_ws_url(DEFAULT_API_URL),
            poll_interval: DEFAULT_POLL_INTERVAL,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            tracking_timeout: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                       |
    /// |---------------------------|-------------------------------|
    /// | `ANCLORA_API_URL`         | `http://localhost:8030`       |
    /// | `ANCLORA_WS_URL`          | API URL with a `ws(s)` scheme |
    /// | `POLL_INTERVAL_MS`        | `2000`                        |
    /// | `RECONNECT_DELAY_MS`      | `3000`                        |
    /// | `HEARTBEAT_INTERVAL_SECS` | `30`                          |
    /// | `CONNECT_TIMEOUT_SECS`    | `10`                          |
    /// | `REQUEST_TIMEOUT_SECS`    | `30`                          |
    /// | `TRACKING_TIMEOUT_SECS`   | `0` (disabled)                |
    /// | `MAX_UPLOAD_BYTES`        | `52428800`                    |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable
    /// source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let api_url = lookup("ANCLORA_API_URL")
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.api_url);

        let ws_url = lookup("ANCLORA_WS_URL")
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| derive_ws_url(&api_url));

        let poll_interval = positive(&lookup, "POLL_INTERVAL_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll_interval);
        let reconnect_delay = positive(&lookup, "RECONNECT_DELAY_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.reconnect_delay);
        let heartbeat_interval = positive(&lookup, "HEARTBEAT_INTERVAL_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.heartbeat_interval);
        let connect_timeout = positive(&lookup, "CONNECT_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.connect_timeout);
        let request_timeout = positive(&lookup, "REQUEST_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout);
        let max_upload_bytes =
            positive(&lookup, "MAX_UPLOAD_BYTES")?.unwrap_or(defaults.max_upload_bytes);

        // Zero is the documented way to disable the deadline.
        let tracking_timeout = parse_u64(&lookup, "TRACKING_TIMEOUT_SECS")?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Ok(Self {
            api_url,
            ws_url,
            poll_interval,
            reconnect_delay,
            heartbeat_interval,
            connect_timeout,
            request_timeout,
            tracking_timeout,
            max_upload_bytes,
        })
    }

    pub fn push_settings(&self) -> PushSettings {
        PushSettings {
            heartbeat_interval: self.heartbeat_interval,
            connect_timeout: self.connect_timeout,
            reconnect: ReconnectConfig::fixed(self.reconnect_delay),
        }
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            tracking_timeout: self.tracking_timeout,
        }
    }
}

/// Swap an HTTP(S) base URL for its WebSocket counterpart.
pub fn derive_ws_url(api_url: &str) -> String {
    if let Some(rest) = api_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = api_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        api_url.to_string()
    }
}

fn parse_u64<F>(lookup: &F, var: &'static str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value: raw }),
    }
}

fn positive<F>(lookup: &F, var: &'static str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match parse_u64(lookup, var)? {
        Some(0) => Err(ConfigError::Invalid {
            var,
            value: "0".into(),
        }),
        other => Ok(other),
    }
}
