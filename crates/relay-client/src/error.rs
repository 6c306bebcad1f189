//! Client error types.

use thiserror::Error;

/// Errors raised while establishing a connection.
///
/// Once connected, failures are reported as socket events and drive the
/// reconnect policy instead of surfacing here.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The WebSocket handshake failed.
    #[error("websocket: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    /// The connector refused to open a socket.
    #[error("connect to {url} failed: {reason}")]
    Connect {
        /// Target URL.
        url: String,
        /// Why it failed.
        reason: String,
    },
}
