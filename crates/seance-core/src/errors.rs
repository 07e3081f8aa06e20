//! Protocol error types.

use thiserror::Error;

/// Errors raised while decoding or validating wire traffic.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame was not a valid envelope.
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(#[source] serde_json::Error),

    /// The envelope payload did not match the shape its kind requires.
    #[error("invalid `{kind}` payload: {source}")]
    InvalidPayload {
        /// Event kind whose payload failed to decode.
        kind: String,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },

    /// A payload could not be encoded.
    #[error("failed to encode payload: {0}")]
    Encode(#[source] serde_json::Error),

    /// Participant name was present but blank.
    #[error("participant name must not be blank")]
    EmptyName,

    /// Message was empty after trimming.
    #[error("Message cannot be empty")]
    EmptyMessage,

    /// Message exceeded the character limit after trimming.
    #[error("Message exceeds maximum length of {max} characters")]
    MessageTooLong {
        /// Observed length in characters.
        len: usize,
        /// Configured maximum.
        max: usize,
    },
}

impl ProtocolError {
    /// Machine-readable code carried in `error` envelopes.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidEnvelope(_) | Self::InvalidPayload { .. } | Self::Encode(_) => {
                "INVALID_ENVELOPE"
            }
            Self::EmptyName => "INVALID_IDENTITY",
            Self::EmptyMessage => "EMPTY_MESSAGE",
            Self::MessageTooLong { .. } => "MESSAGE_TOO_LONG",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes() {
        assert_eq!(ProtocolError::EmptyName.code(), "INVALID_IDENTITY");
        assert_eq!(ProtocolError::EmptyMessage.code(), "EMPTY_MESSAGE");
        let long = ProtocolError::MessageTooLong { len: 501, max: 500 };
        assert_eq!(long.code(), "MESSAGE_TOO_LONG");
        let bad = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(ProtocolError::InvalidEnvelope(bad).code(), "INVALID_ENVELOPE");
    }

    #[test]
    fn too_long_display_names_limit() {
        let err = ProtocolError::MessageTooLong { len: 900, max: 500 };
        assert_eq!(
            err.to_string(),
            "Message exceeds maximum length of 500 characters"
        );
    }
}
