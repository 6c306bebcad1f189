//! Inbound frame classification for the hub.
//!
//! Two shapes arrive from clients:
//! - control messages, keyed by `action`:
//!   `{ "action": "subscribe"|"unsubscribe"|"identify", "event"?, "userId"? }`
//! - envelopes, keyed by `type`, as sent by the client supervisor
//!   (`subscribe{topicId}`, `authenticate{userId}`, `ping`, ...)
//!
//! Both collapse into a single [`Command`] for the hub to apply.

use serde::Deserialize;
use serde_json::Value;

use crate::envelope::Envelope;
use crate::errors::ProtocolError;
use crate::event_type::EventType;
use crate::payload::Payload;

/// Control-plane message, distinguished by its `action` field.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ControlMessage {
    /// Add `event` to the connection's subscription set.
    Subscribe {
        /// Event type to receive.
        event: EventType,
    },
    /// Remove `event` from the connection's subscription set.
    Unsubscribe {
        /// Event type to stop receiving.
        event: EventType,
    },
    /// Attach a user identity to the connection.
    #[serde(rename_all = "camelCase")]
    Identify {
        /// Client-asserted user.
        user_id: String,
    },
}

/// A parsed inbound frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    /// `action`-keyed control message.
    Control(ControlMessage),
    /// `type`-keyed envelope.
    Envelope(Envelope),
}

/// What the hub should do with an inbound frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Start streaming an event type to this connection.
    Subscribe(EventType),
    /// Stop streaming an event type to this connection.
    Unsubscribe(EventType),
    /// Set the connection's user without acknowledgement.
    Identify(String),
    /// Set the connection's user and reply `authenticated`.
    Authenticate(String),
    /// Reply `pong`.
    Ping,
    /// Any other envelope type; ignored by the hub.
    Other(EventType),
}

impl Inbound {
    /// Parse a raw text frame.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(raw)?;
        let Some(obj) = value.as_object() else {
            return Err(ProtocolError::UnrecognizedShape("expected a JSON object"));
        };
        if obj.contains_key("action") {
            Ok(Self::Control(serde_json::from_value(value)?))
        } else if obj.contains_key("type") {
            Ok(Self::Envelope(serde_json::from_value(value)?))
        } else {
            Err(ProtocolError::UnrecognizedShape(
                "missing `action` or `type` field",
            ))
        }
    }

    /// Reduce to a hub command, validating envelope payloads.
    pub fn into_command(self) -> Result<Command, ProtocolError> {
        match self {
            Self::Control(ControlMessage::Subscribe { event }) => Ok(Command::Subscribe(event)),
            Self::Control(ControlMessage::Unsubscribe { event }) => {
                Ok(Command::Unsubscribe(event))
            }
            Self::Control(ControlMessage::Identify { user_id }) => Ok(Command::Identify(user_id)),
            Self::Envelope(envelope) => Ok(match envelope.payload()? {
                Payload::Subscribe { topic_id } => Command::Subscribe(EventType::from(topic_id)),
                Payload::Unsubscribe { topic_id } => {
                    Command::Unsubscribe(EventType::from(topic_id))
                }
                Payload::Authenticate { user_id } => Command::Authenticate(user_id),
                Payload::Ping => Command::Ping,
                _ => Command::Other(envelope.event_type),
            }),
        }
    }
}

/// Parse a raw frame straight to a hub command.
pub fn parse_command(raw: &str) -> Result<Command, ProtocolError> {
    Inbound::parse(raw)?.into_command()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn control_subscribe() {
        let cmd = parse_command(r#"{"action":"subscribe","event":"item:created"}"#).unwrap();
        assert_eq!(cmd, Command::Subscribe(EventType::new("item:created")));
    }

    #[test]
    fn control_subscribe_resolves_alias() {
        let cmd = parse_command(r#"{"action":"subscribe","event":"item_created"}"#).unwrap();
        assert_eq!(cmd, Command::Subscribe(EventType::new("item:created")));
    }

    #[test]
    fn control_unsubscribe() {
        let cmd = parse_command(r#"{"action":"unsubscribe","event":"payment:updated"}"#).unwrap();
        assert_eq!(cmd, Command::Unsubscribe(EventType::new("payment:updated")));
    }

    #[test]
    fn control_identify() {
        let cmd = parse_command(r#"{"action":"identify","userId":"u42"}"#).unwrap();
        assert_eq!(cmd, Command::Identify("u42".into()));
    }

    #[test]
    fn control_missing_field_is_error() {
        assert_matches!(
            parse_command(r#"{"action":"subscribe"}"#),
            Err(ProtocolError::Json(_))
        );
        assert_matches!(
            parse_command(r#"{"action":"explode"}"#),
            Err(ProtocolError::Json(_))
        );
    }

    #[test]
    fn envelope_subscribe() {
        let cmd =
            parse_command(r#"{"type":"subscribe","data":{"topicId":"declaration:created"}}"#)
                .unwrap();
        assert_eq!(cmd, Command::Subscribe(EventType::new("declaration:created")));
    }

    #[test]
    fn envelope_authenticate_legacy_spelling() {
        let cmd = parse_command(r#"{"type":"AUTHENTICATE","data":{"userId":"u1"},"timestamp":1}"#)
            .unwrap();
        assert_eq!(cmd, Command::Authenticate("u1".into()));
    }

    #[test]
    fn envelope_ping() {
        assert_eq!(parse_command(r#"{"type":"ping"}"#).unwrap(), Command::Ping);
    }

    #[test]
    fn envelope_other_types_pass_through() {
        let cmd = parse_command(r#"{"type":"item:created","data":{"id":1}}"#).unwrap();
        assert_eq!(cmd, Command::Other(EventType::new("item:created")));
    }

    #[test]
    fn envelope_invalid_payload() {
        assert_matches!(
            parse_command(r#"{"type":"authenticate","data":{}}"#),
            Err(ProtocolError::InvalidPayload { .. })
        );
    }

    #[test]
    fn malformed_frames() {
        assert_matches!(parse_command("{{{"), Err(ProtocolError::Json(_)));
        assert_matches!(parse_command("[1,2]"), Err(ProtocolError::UnrecognizedShape(_)));
        assert_matches!(parse_command(r#"{"hello":1}"#), Err(ProtocolError::UnrecognizedShape(_)));
    }
}
