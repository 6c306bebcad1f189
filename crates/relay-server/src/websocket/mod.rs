//! WebSocket connection management, heartbeat, inbound handling, and broadcasting.

pub mod connection;
pub mod handler;
pub mod heartbeat;
pub mod hub;
pub mod session;
