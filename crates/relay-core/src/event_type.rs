//! Event type keys.
//!
//! `type` on the wire is an open string: producers may introduce new types
//! without any change here. Legacy spellings are folded into their canonical
//! form once, when an [`EventType`] is built from a raw string, so routing and
//! dispatch only ever compare canonical keys.
//!
//! Canonical forms:
//! - CRUD events: `<entity>:created|updated|deleted`
//! - control events: lower-case (`authenticate`, `authenticated`, `ping`, ...)

use std::fmt;

use serde::{Deserialize, Serialize};

/// Handler key that matches every event type.
pub const WILDCARD: &str = "*";

/// Canonical names of the control-plane types the relay itself understands.
pub mod known {
    /// Client → server identity handshake.
    pub const AUTHENTICATE: &str = "authenticate";
    /// Server → client handshake acknowledgement.
    pub const AUTHENTICATED: &str = "authenticated";
    /// Client → server topic subscription.
    pub const SUBSCRIBE: &str = "subscribe";
    /// Client → server topic unsubscription.
    pub const UNSUBSCRIBE: &str = "unsubscribe";
    /// Keepalive request.
    pub const PING: &str = "ping";
    /// Keepalive reply.
    pub const PONG: &str = "pong";
    /// Error report.
    pub const ERROR: &str = "error";
    /// User-facing notification.
    pub const NOTIFICATION: &str = "notification";
    /// First frame the server sends on a new connection.
    pub const CONNECTION_ESTABLISHED: &str = "connection:established";
}

/// Upper-case spellings emitted by older clients.
const CONTROL_ALIASES: &[(&str, &str)] = &[
    ("AUTHENTICATE", known::AUTHENTICATE),
    ("AUTHENTICATED", known::AUTHENTICATED),
    ("SUBSCRIBE", known::SUBSCRIBE),
    ("UNSUBSCRIBE", known::UNSUBSCRIBE),
    ("PING", known::PING),
    ("PONG", known::PONG),
    ("ERROR", known::ERROR),
    ("NOTIFICATION", known::NOTIFICATION),
];

/// Actions that make up the CRUD event family.
pub const CRUD_ACTIONS: &[&str] = &["created", "updated", "deleted"];

/// An event type key, always held in canonical form.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct EventType(String);

impl EventType {
    /// Build an event type, resolving legacy aliases.
    pub fn new(raw: impl Into<String>) -> Self {
        Self::from(raw.into())
    }

    /// The wildcard handler key.
    pub fn wildcard() -> Self {
        Self(WILDCARD.to_owned())
    }

    /// Borrow the canonical string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the `*` sentinel.
    pub fn is_wildcard(&self) -> bool {
        self.0 == WILDCARD
    }

    /// Split a CRUD type into `(entity, action)`.
    ///
    /// Returns `None` unless the type is `<entity>:<action>` with a CRUD action.
    pub fn entity_action(&self) -> Option<(&str, &str)> {
        let (entity, action) = self.0.rsplit_once(':')?;
        (!entity.is_empty() && CRUD_ACTIONS.contains(&action)).then_some((entity, action))
    }
}

impl From<String> for EventType {
    fn from(raw: String) -> Self {
        Self(resolve_alias(&raw).unwrap_or(raw))
    }
}

impl From<&str> for EventType {
    fn from(raw: &str) -> Self {
        Self(resolve_alias(raw).unwrap_or_else(|| raw.to_owned()))
    }
}

impl From<EventType> for String {
    fn from(t: EventType) -> Self {
        t.0
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EventType {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Return the canonical spelling of `raw`, or `None` if it is already canonical
/// (or simply unknown).
pub fn resolve_alias(raw: &str) -> Option<String> {
    if let Some((_, canonical)) = CONTROL_ALIASES.iter().find(|(alias, _)| *alias == raw) {
        return Some((*canonical).to_owned());
    }
    if raw.contains(':') {
        return None;
    }
    crud_alias(raw)
}

/// `item_created` / `ITEM_CREATED` / `itemCreated` → `item:created`.
fn crud_alias(raw: &str) -> Option<String> {
    if let Some((entity, action)) = raw.rsplit_once('_') {
        let action = action.to_ascii_lowercase();
        if !entity.is_empty() && CRUD_ACTIONS.contains(&action.as_str()) {
            return Some(format!("{}:{action}", entity.to_ascii_lowercase()));
        }
        return None;
    }
    CRUD_ACTIONS.iter().find_map(|action| {
        let mut suffix = String::with_capacity(action.len());
        let mut chars = action.chars();
        if let Some(first) = chars.next() {
            suffix.push(first.to_ascii_uppercase());
            suffix.extend(chars);
        }
        let entity = raw.strip_suffix(suffix.as_str())?;
        (!entity.is_empty()).then(|| format!("{entity}:{action}"))
    })
}
