//! Wire envelope and the producer-side event it is stamped from.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::ProtocolError;
use crate::event_type::{known, EventType};
use crate::ids::MessageId;
use crate::payload::Payload;

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// An event as handed to the hub by a producer, before it is timestamped.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    /// Routing key.
    pub event_type: EventType,
    /// Opaque body.
    pub data: Value,
    /// Originating or target user, carried through to the envelope.
    pub user_id: Option<String>,
    /// Producer-assigned ID; the hub assigns one when absent.
    pub message_id: Option<String>,
}

impl Event {
    /// Create an event with the given type and body.
    pub fn new(event_type: impl Into<EventType>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            user_id: None,
            message_id: None,
        }
    }

    /// Attach a user ID.
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Attach a message ID.
    #[must_use]
    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    /// `<entity>:<action>` CRUD event.
    pub fn entity(entity: &str, action: &str, data: Value) -> Self {
        Self::new(format!("{entity}:{action}"), data)
    }

    /// Client → server identity handshake.
    pub fn authenticate(user_id: &str) -> Self {
        Self::new(known::AUTHENTICATE, json!({ "userId": user_id }))
    }

    /// Server → client handshake acknowledgement.
    pub fn authenticated(user_id: &str) -> Self {
        Self::new(known::AUTHENTICATED, json!({ "userId": user_id }))
    }

    /// Client → server topic subscription.
    pub fn subscribe(topic_id: &str) -> Self {
        Self::new(known::SUBSCRIBE, json!({ "topicId": topic_id }))
    }

    /// Client → server topic unsubscription.
    pub fn unsubscribe(topic_id: &str) -> Self {
        Self::new(known::UNSUBSCRIBE, json!({ "topicId": topic_id }))
    }

    /// Keepalive reply.
    pub fn pong() -> Self {
        Self::new(known::PONG, Value::Null)
    }

    /// Error report sent back to a client.
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self::new(
            known::ERROR,
            json!({ "code": code, "message": message.into() }),
        )
    }

    /// First frame on a fresh server connection.
    pub fn connection_established(client_id: &str) -> Self {
        Self::new(
            known::CONNECTION_ESTABLISHED,
            json!({ "clientId": client_id }),
        )
    }

    /// Freeze into an envelope carrying `timestamp`.
    pub fn stamp(self, timestamp: i64) -> Envelope {
        Envelope {
            event_type: self.event_type,
            data: self.data,
            timestamp,
            user_id: self.user_id,
            message_id: self.message_id,
        }
    }

    /// Stamp with the current time.
    pub fn stamp_now(self) -> Envelope {
        self.stamp(now_ms())
    }

    /// Stamp with the current time, assigning a fresh message ID if unset.
    pub fn stamp_for_broadcast(mut self) -> Envelope {
        if self.message_id.is_none() {
            self.message_id = Some(MessageId::new().to_string());
        }
        self.stamp_now()
    }
}

/// The only message unit on the wire.
///
/// `{ type, data, timestamp, userId?, messageId? }`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Routing key (canonicalized on deserialization).
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Opaque body.
    #[serde(default)]
    pub data: Value,
    /// Milliseconds since the Unix epoch, assigned when stamped.
    #[serde(default)]
    pub timestamp: i64,
    /// Associated user, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Message ID, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

impl Envelope {
    /// Parse a text frame.
    pub fn from_json(raw: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Serialize for a text frame.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Typed view of `data` for this envelope's type.
    pub fn payload(&self) -> Result<Payload, ProtocolError> {
        Payload::decode(&self.event_type, &self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamp_carries_all_fields() {
        let env = Event::new("item:created", json!({"id": 7}))
            .with_user_id("u1")
            .with_message_id("m1")
            .stamp(1_700_000_000_000);
        assert_eq!(env.event_type.as_str(), "item:created");
        assert_eq!(env.data["id"], 7);
        assert_eq!(env.timestamp, 1_700_000_000_000);
        assert_eq!(env.user_id.as_deref(), Some("u1"));
        assert_eq!(env.message_id.as_deref(), Some("m1"));
    }

    #[test]
    fn serializes_wire_shape() {
        let env = Event::new("item:created", json!({"id": 7})).stamp(42);
        let v: Value = serde_json::from_str(&env.to_json().unwrap()).unwrap();
        assert_eq!(v["type"], "item:created");
        assert_eq!(v["data"]["id"], 7);
        assert_eq!(v["timestamp"], 42);
        assert!(v.get("userId").is_none());
        assert!(v.get("messageId").is_none());
    }

    #[test]
    fn optional_fields_use_camel_case() {
        let env = Event::new("x", Value::Null)
            .with_user_id("u")
            .with_message_id("m")
            .stamp(1);
        let v: Value = serde_json::to_value(&env).unwrap();
        assert_eq!(v["userId"], "u");
        assert_eq!(v["messageId"], "m");
    }

    #[test]
    fn parse_minimal_envelope() {
        let env = Envelope::from_json(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(env.event_type.as_str(), "ping");
        assert!(env.data.is_null());
        assert_eq!(env.timestamp, 0);
    }

    #[test]
    fn parse_canonicalizes_type() {
        let env = Envelope::from_json(r#"{"type":"declaration_updated","data":{"id":1},"timestamp":5}"#)
            .unwrap();
        assert_eq!(env.event_type.as_str(), "declaration:updated");
    }

    #[test]
    fn parse_rejects_missing_type() {
        assert!(Envelope::from_json(r#"{"data":{}}"#).is_err());
        assert!(Envelope::from_json("not json").is_err());
    }

    #[test]
    fn broadcast_stamp_assigns_message_id() {
        let before = now_ms();
        let env = Event::new("x", Value::Null).stamp_for_broadcast();
        assert!(env.message_id.unwrap().starts_with("msg_"));
        assert!(env.timestamp >= before);
    }

    #[test]
    fn broadcast_stamp_keeps_producer_message_id() {
        let env = Event::new("x", Value::Null)
            .with_message_id("mine")
            .stamp_for_broadcast();
        assert_eq!(env.message_id.as_deref(), Some("mine"));
    }

    #[test]
    fn control_constructors() {
        assert_eq!(Event::authenticate("u1").data["userId"], "u1");
        assert_eq!(Event::subscribe("item:created").data["topicId"], "item:created");
        assert_eq!(Event::unsubscribe("t").event_type.as_str(), "unsubscribe");
        assert_eq!(Event::error("E", "boom").data["code"], "E");
        assert_eq!(
            Event::connection_established("c1").event_type.as_str(),
            "connection:established"
        );
        assert_eq!(Event::entity("payment", "deleted", json!({})).event_type.as_str(), "payment:deleted");
    }
}
