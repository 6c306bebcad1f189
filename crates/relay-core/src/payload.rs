//! Typed views over `Envelope::data`.
//!
//! Known types are validated here; anything unregistered decodes to
//! [`Payload::Opaque`] so new producers never break older consumers.

use serde::Deserialize;
use serde_json::Value;

use crate::errors::ProtocolError;
use crate::event_type::{known, EventType};

/// What happened to a business entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityAction {
    /// `<entity>:created`
    Created,
    /// `<entity>:updated`
    Updated,
    /// `<entity>:deleted`
    Deleted,
}

impl EntityAction {
    fn parse(action: &str) -> Option<Self> {
        match action {
            "created" => Some(Self::Created),
            "updated" => Some(Self::Updated),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }
}

/// Body of a CRUD event.
#[derive(Clone, Debug, PartialEq)]
pub struct EntityChange {
    /// Entity name (`declaration`, `item`, `payment`, ...).
    pub entity: String,
    /// Mutation kind.
    pub action: EntityAction,
    /// The `id` field of the body, if present.
    pub id: Option<Value>,
    /// The full body.
    pub body: Value,
}

/// Body of a `notification` event.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Notification {
    /// Optional headline.
    #[serde(default)]
    pub title: Option<String>,
    /// Text shown to the user.
    pub message: String,
    /// Severity hint (`info`, `warning`, ...).
    #[serde(default)]
    pub level: Option<String>,
}

/// Decoded `data` for an envelope.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// `<entity>:created|updated|deleted`
    Entity(EntityChange),
    /// `authenticate{userId}`
    Authenticate {
        /// Asserted user.
        user_id: String,
    },
    /// `authenticated{userId?}`
    Authenticated {
        /// Acknowledged user, if echoed.
        user_id: Option<String>,
    },
    /// `subscribe{topicId}`
    Subscribe {
        /// Requested topic.
        topic_id: String,
    },
    /// `unsubscribe{topicId}`
    Unsubscribe {
        /// Topic to drop.
        topic_id: String,
    },
    /// `notification{title?, message, level?}`
    Notification(Notification),
    /// `error{message, code?}`
    Error {
        /// Human-readable description.
        message: String,
        /// Machine-readable code.
        code: Option<String>,
    },
    /// `ping`
    Ping,
    /// `pong`
    Pong,
    /// Any type without a registered shape.
    Opaque(Value),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserBody {
    user_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OptionalUserBody {
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TopicBody {
    topic_id: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    code: Option<String>,
}

impl Payload {
    /// Validate `data` against the shape registered for `event_type`.
    pub fn decode(event_type: &EventType, data: &Value) -> Result<Self, ProtocolError> {
        let ty = event_type.as_str();
        match ty {
            known::AUTHENTICATE => {
                let body: UserBody = body(ty, data)?;
                Ok(Self::Authenticate {
                    user_id: body.user_id,
                })
            }
            known::AUTHENTICATED => {
                if data.is_null() {
                    return Ok(Self::Authenticated { user_id: None });
                }
                let body: OptionalUserBody = body(ty, data)?;
                Ok(Self::Authenticated {
                    user_id: body.user_id,
                })
            }
            known::SUBSCRIBE => {
                let body: TopicBody = body(ty, data)?;
                Ok(Self::Subscribe {
                    topic_id: body.topic_id,
                })
            }
            known::UNSUBSCRIBE => {
                let body: TopicBody = body(ty, data)?;
                Ok(Self::Unsubscribe {
                    topic_id: body.topic_id,
                })
            }
            known::NOTIFICATION => Ok(Self::Notification(body(ty, data)?)),
            known::ERROR => {
                let body: ErrorBody = body(ty, data)?;
                Ok(Self::Error {
                    message: body.message,
                    code: body.code,
                })
            }
            known::PING => Ok(Self::Ping),
            known::PONG => Ok(Self::Pong),
            _ => match event_type.entity_action() {
                Some((entity, action)) => {
                    if !data.is_object() {
                        return Err(ProtocolError::invalid_payload(ty, "expected an object body"));
                    }
                    let action = EntityAction::parse(action)
                        .ok_or_else(|| ProtocolError::invalid_payload(ty, "unknown action"))?;
                    Ok(Self::Entity(EntityChange {
                        entity: entity.to_owned(),
                        action,
                        id: data.get("id").cloned(),
                        body: data.clone(),
                    }))
                }
                None => Ok(Self::Opaque(data.clone())),
            },
        }
    }
}

fn body<T: for<'de> Deserialize<'de>>(event_type: &str, data: &Value) -> Result<T, ProtocolError> {
    T::deserialize(data).map_err(|e| ProtocolError::invalid_payload(event_type, e.to_string()))
}
