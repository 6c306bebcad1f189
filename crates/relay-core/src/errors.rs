//! Protocol error types.

use thiserror::Error;

/// Errors raised while decoding frames at the wire boundary.
///
/// None of these are fatal to a connection: callers log them and keep the
/// socket open.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame was not valid JSON, or did not match the expected shape.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Valid JSON, but neither a control message nor an envelope.
    #[error("unrecognized message shape: {0}")]
    UnrecognizedShape(&'static str),

    /// A known event type carried a malformed `data` body.
    #[error("invalid payload for `{event_type}`: {reason}")]
    InvalidPayload {
        /// Canonical event type.
        event_type: String,
        /// What was wrong with the body.
        reason: String,
    },
}

impl ProtocolError {
    /// Machine-readable code sent back to clients in `error` envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Json(_) => "INVALID_JSON",
            Self::UnrecognizedShape(_) => "UNRECOGNIZED_SHAPE",
            Self::InvalidPayload { .. } => "INVALID_PAYLOAD",
        }
    }

    pub(crate) fn invalid_payload(event_type: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            event_type: event_type.to_owned(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_error_display_and_code() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad").unwrap_err();
        let err: ProtocolError = json_err.into();
        assert!(err.to_string().starts_with("invalid JSON"));
        assert_eq!(err.code(), "INVALID_JSON");
    }

    #[test]
    fn invalid_payload_display() {
        let err = ProtocolError::invalid_payload("authenticate", "missing userId");
        assert_eq!(
            err.to_string(),
            "invalid payload for `authenticate`: missing userId"
        );
        assert_eq!(err.code(), "INVALID_PAYLOAD");
    }

    #[test]
    fn unrecognized_shape_code() {
        let err = ProtocolError::UnrecognizedShape("expected a JSON object");
        assert_eq!(err.code(), "UNRECOGNIZED_SHAPE");
    }
}
