//! Client configuration from environment variables.

use std::time::Duration;

use url::Url;

use crate::error::ChatError;
use crate::ws::{HeartbeatConfig, ReconnectConfig, TransportConfig};

pub const DEFAULT_WS_URL: &str = "ws://localhost:8080/ws";
pub const DEFAULT_API_URL: &str = "http://localhost:8080";
pub const DEFAULT_HISTORY_PAGE: usize = 30;

/// Timing for typing indicators in both directions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingConfig {
    /// Outbound: send `typing:stop` after this long without keystrokes.
    pub idle_after: Duration,
    /// Inbound: clear the friend's typing flag after this long without a stop.
    pub decay_after: Duration,
}

impl Default for TypingConfig {
    fn default() -> Self {
        Self {
            idle_after: Duration::from_millis(2_500),
            decay_after: Duration::from_secs(4),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub ws_url: String,
    pub api_base_url: String,
    pub bearer_token: Option<String>,
    pub reconnect: ReconnectConfig,
    pub heartbeat: HeartbeatConfig,
    pub typing: TypingConfig,
    pub history_page_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            api_base_url: DEFAULT_API_URL.to_string(),
            bearer_token: None,
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            typing: TypingConfig::default(),
            history_page_size: DEFAULT_HISTORY_PAGE,
        }
    }
}

impl ClientConfig {
    /// Parse configuration from environment variables.
    ///
    /// Environment variables:
    /// - `CHILLOW_WS_URL`: realtime endpoint (default: `ws://localhost:8080/ws`)
    /// - `CHILLOW_API_URL`: REST base URL (default: `http://localhost:8080`)
    /// - `CHILLOW_TOKEN`: bearer token for both
    /// - `CHILLOW_HEARTBEAT_MS`, `CHILLOW_PONG_TIMEOUT_MS`
    /// - `CHILLOW_RECONNECT_BASE_MS`, `CHILLOW_RECONNECT_MAX_MS`
    /// - `CHILLOW_HISTORY_PAGE`: messages per history page (default: 30)
    pub fn from_env() -> Result<Self, ChatError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ChatError> {
        let defaults = Self::default();
        let millis = |key: &str, fallback: Duration| -> Result<Duration, ChatError> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_millis)
                    .map_err(|_| ChatError::InvalidConfig(format!("{key} must be milliseconds, got {raw:?}"))),
                None => Ok(fallback),
            }
        };

        let history_page_size = match lookup("CHILLOW_HISTORY_PAGE") {
            Some(raw) => raw.trim().parse::<usize>().map_err(|_| {
                ChatError::InvalidConfig(format!("CHILLOW_HISTORY_PAGE must be a number, got {raw:?}"))
            })?,
            None => defaults.history_page_size,
        };

        let config = Self {
            ws_url: lookup("CHILLOW_WS_URL").unwrap_or(defaults.ws_url),
            api_base_url: lookup("CHILLOW_API_URL").unwrap_or(defaults.api_base_url),
            bearer_token: lookup("CHILLOW_TOKEN").filter(|token| !token.trim().is_empty()),
            reconnect: ReconnectConfig {
                base_delay: millis("CHILLOW_RECONNECT_BASE_MS", defaults.reconnect.base_delay)?,
                max_delay: millis("CHILLOW_RECONNECT_MAX_MS", defaults.reconnect.max_delay)?,
            },
            heartbeat: HeartbeatConfig {
                interval: millis("CHILLOW_HEARTBEAT_MS", defaults.heartbeat.interval)?,
                pong_timeout: millis("CHILLOW_PONG_TIMEOUT_MS", defaults.heartbeat.pong_timeout)?,
            },
            typing: defaults.typing,
            history_page_size,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ChatError> {
        let ws = Url::parse(&self.ws_url)
            .map_err(|e| ChatError::InvalidConfig(format!("bad websocket url {:?}: {e}", self.ws_url)))?;
        if !matches!(ws.scheme(), "ws" | "wss") {
            return Err(ChatError::InvalidConfig(format!(
                "websocket url must use ws:// or wss://, got {:?}",
                self.ws_url
            )));
        }
        let api = Url::parse(&self.api_base_url).map_err(|e| {
            ChatError::InvalidConfig(format!("bad api url {:?}: {e}", self.api_base_url))
        })?;
        if !matches!(api.scheme(), "http" | "https") {
            return Err(ChatError::InvalidConfig(format!(
                "api url must use http:// or https://, got {:?}",
                self.api_base_url
            )));
        }
        if self.heartbeat.interval.is_zero() {
            return Err(ChatError::InvalidConfig("heartbeat interval must be positive".into()));
        }
        if self.heartbeat.pong_timeout <= self.heartbeat.interval {
            return Err(ChatError::InvalidConfig(
                "pong timeout must be longer than the heartbeat interval".into(),
            ));
        }
        if self.reconnect.base_delay > self.reconnect.max_delay {
            return Err(ChatError::InvalidConfig(
                "reconnect base delay exceeds the maximum".into(),
            ));
        }
        if self.history_page_size == 0 {
            return Err(ChatError::InvalidConfig("history page size must be positive".into()));
        }
        Ok(())
    }

    /// Transport settings derived from this configuration.
    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            bearer_token: self.bearer_token.clone(),
            reconnect: self.reconnect.clone(),
            heartbeat: self.heartbeat.clone(),
            ..TransportConfig::new(self.ws_url.clone())
        }
    }
}
