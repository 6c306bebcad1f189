//! Client configuration.

use std::time::Duration;

use relay_settings::ClientSettings;

/// Connection and reconnect policy for a [`ConnectionSupervisor`](crate::ConnectionSupervisor).
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Server WebSocket URL.
    pub url: String,
    /// Consecutive failed connections tolerated before giving up.
    pub max_reconnect_attempts: u32,
    /// Fixed delay before each reconnect attempt.
    pub reconnect_delay: Duration,
}

impl ClientConfig {
    /// Config for `url` with the default reconnect policy.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8080/api/ws".into(),
            max_reconnect_attempts: 5,
            reconnect_delay: Duration::from_millis(3000),
        }
    }
}

impl From<&ClientSettings> for ClientConfig {
    fn from(s: &ClientSettings) -> Self {
        Self {
            url: s.url.clone(),
            max_reconnect_attempts: s.reconnect_attempts,
            reconnect_delay: Duration::from_millis(s.reconnect_delay_ms),
        }
    }
}
