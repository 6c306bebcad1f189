//! Settings types.

use serde::{Deserialize, Serialize};

/// Root settings document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Hub settings.
    pub server: ServerSettings,
    /// Client supervisor settings.
    pub client: ClientSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

impl RelaySettings {
    /// Reject values that parse but cannot work.
    pub fn validate(&self) -> crate::Result<()> {
        if !self.server.ws_path.starts_with('/') {
            return Err(crate::SettingsError::InvalidValue(format!(
                "server.wsPath must start with '/': {}",
                self.server.ws_path
            )));
        }
        if self.server.history_capacity == 0 {
            return Err(crate::SettingsError::InvalidValue(
                "server.historyCapacity must be at least 1".into(),
            ));
        }
        if self.server.send_queue_capacity == 0 {
            return Err(crate::SettingsError::InvalidValue(
                "server.sendQueueCapacity must be at least 1".into(),
            ));
        }
        if self.server.heartbeat_interval_secs == 0 {
            return Err(crate::SettingsError::InvalidValue(
                "server.heartbeatIntervalSecs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Hub network and runtime settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// WebSocket upgrade path.
    pub ws_path: String,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Per-connection outbound queue length.
    pub send_queue_capacity: usize,
    /// Number of recent envelopes kept for diagnostics.
    pub history_capacity: usize,
    /// Seconds between server pings.
    pub heartbeat_interval_secs: u64,
    /// Seconds of silence before a client is dropped.
    pub heartbeat_timeout_secs: u64,
    /// Largest accepted inbound frame in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            ws_path: "/api/ws".to_string(),
            max_connections: 1024,
            send_queue_capacity: 256,
            history_capacity: 1000,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 1024 * 1024,
        }
    }
}

/// Client supervisor settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// Server WebSocket URL.
    pub url: String,
    /// Consecutive reconnect attempts before giving up.
    pub reconnect_attempts: u32,
    /// Fixed delay between reconnect attempts in milliseconds.
    pub reconnect_delay_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8080/api/ws".to_string(),
            reconnect_attempts: 5,
            reconnect_delay_ms: 3000,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive (overridden by `RUST_LOG`).
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_camel_case() {
        let v = serde_json::to_value(RelaySettings::default()).unwrap();
        assert_eq!(v["server"]["wsPath"], "/api/ws");
        assert_eq!(v["server"]["historyCapacity"], 1000);
        assert_eq!(v["client"]["reconnectDelayMs"], 3000);
    }

    #[test]
    fn partial_document_fills_defaults() {
        let s: RelaySettings = serde_json::from_str(r#"{"server":{"port":9000}}"#).unwrap();
        assert_eq!(s.server.port, 9000);
        assert_eq!(s.server.ws_path, "/api/ws");
        assert_eq!(s.client.reconnect_attempts, 5);
    }

    #[test]
    fn validate_defaults() {
        assert!(RelaySettings::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_relative_path() {
        let mut s = RelaySettings::default();
        s.server.ws_path = "ws".into();
        assert!(s.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_capacities() {
        let mut s = RelaySettings::default();
        s.server.history_capacity = 0;
        assert!(s.validate().is_err());

        let mut s = RelaySettings::default();
        s.server.send_queue_capacity = 0;
        assert!(s.validate().is_err());
    }
}
