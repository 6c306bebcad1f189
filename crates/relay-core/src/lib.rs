//! # relay-core
//!
//! Shared vocabulary for the realtime relay.
//!
//! - [`Envelope`] / [`Event`]: the only message unit on the wire
//! - [`EventType`]: open-ended string key with legacy alias resolution
//! - [`Payload`]: per-type view of `data`, validated at the deserialization boundary
//! - [`protocol`]: classification of inbound frames into hub commands
//! - Branded IDs, error types, and `tracing` subscriber bootstrap

#![deny(unsafe_code)]

pub mod envelope;
pub mod errors;
pub mod event_type;
pub mod ids;
pub mod logging;
pub mod payload;
pub mod protocol;

pub use envelope::{now_ms, Envelope, Event};
pub use errors::ProtocolError;
pub use event_type::{EventType, WILDCARD};
pub use ids::{ConnectionId, MessageId};
pub use payload::{EntityAction, EntityChange, Notification, Payload};
pub use protocol::{parse_command, Command, ControlMessage, Inbound};
