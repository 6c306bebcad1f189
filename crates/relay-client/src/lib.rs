//! # relay-client
//!
//! Client side of the realtime relay.
//!
//! - [`ConnectionSupervisor`]: one socket, fixed-delay reconnect with a
//!   bounded attempt budget, identity handshake, topic re-subscription
//! - [`Dispatcher`]: per-type and wildcard handler registry
//! - [`SubscriptionManager`] / [`TopicMembership`]: idempotent topic joins
//! - [`Connector`]: transport seam, with [`WsConnector`] over `tokio-tungstenite`
//! - [`RealtimeClient`]: the above bundled for callers

#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod supervisor;
pub mod topics;
pub mod transport;

pub use client::RealtimeClient;
pub use config::ClientConfig;
pub use dispatcher::{Dispatcher, Handler, HandlerGuard};
pub use error::ClientError;
pub use supervisor::{ConnectionState, ConnectionSupervisor};
pub use topics::{SubscriptionManager, TopicMembership};
pub use transport::{Connector, Outbound, Socket, SocketEvent, WsConnector};
