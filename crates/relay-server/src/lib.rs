//! # relay-server
//!
//! Axum HTTP + `WebSocket` broadcast hub.
//!
//! - [`Hub`]: connection registry, per-connection subscription sets, and
//!   subscription-filtered (optionally identity-filtered) fan-out
//! - [`MessageHistory`]: bounded FIFO of recent envelopes for diagnostics
//! - `WebSocket` sessions with server pings and a liveness timeout
//! - HTTP endpoints: health, recent envelopes, Prometheus metrics
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod history;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::ServerError;
pub use history::MessageHistory;
pub use server::RelayServer;
pub use websocket::connection::ClientConnection;
pub use websocket::hub::Hub;
