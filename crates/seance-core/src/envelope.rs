//! The `{event, data, timestamp}` wire wrapper.
//!
//! Every frame exchanged over a session socket (after the handshake) is an
//! [`Envelope`]. The `data` map is kept untyped on the envelope itself so that
//! unknown kinds survive decoding; [`Envelope::payload_as`] turns it into one of
//! the typed payload structs below.

use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::constants::MAX_MESSAGE_CHARS;
use crate::errors::ProtocolError;
use crate::identity::Identity;

// ─────────────────────────────────────────────────────────────────────────────
// Event kinds
// ─────────────────────────────────────────────────────────────────────────────

/// Discriminator carried in `Envelope::event`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Client → server: a question for the spirit.
    SendMessage,
    /// A participant joined the session.
    UserJoined,
    /// A participant left (or was pruned from) the session.
    UserLeft,
    /// Echo of an accepted question to every participant.
    MessageReceived,
    /// Generation has started.
    SpiritThinking,
    /// The generated answer with reveal timings.
    SpiritResponse,
    /// Unicast error.
    Error,
    /// Any kind this build does not know.
    Other(String),
}

impl EventKind {
    /// Wire name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::SendMessage => "send_message",
            Self::UserJoined => "user_joined",
            Self::UserLeft => "user_left",
            Self::MessageReceived => "message_received",
            Self::SpiritThinking => "spirit_thinking",
            Self::SpiritResponse => "spirit_response",
            Self::Error => "error",
            Self::Other(name) => name,
        }
    }
}

impl From<&str> for EventKind {
    fn from(name: &str) -> Self {
        match name {
            "send_message" => Self::SendMessage,
            "user_joined" => Self::UserJoined,
            "user_left" => Self::UserLeft,
            "message_received" => Self::MessageReceived,
            "spirit_thinking" => Self::SpiritThinking,
            "spirit_response" => Self::SpiritResponse,
            "error" => Self::Error,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Typed payloads
// ─────────────────────────────────────────────────────────────────────────────

/// `send_message` payload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessagePayload {
    /// Name the client claims; the server prefers the handshake identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    /// Raw question text.
    #[serde(default)]
    pub message: String,
}

/// `message_received` payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageReceivedPayload {
    /// Asker display name.
    pub user_name: String,
    /// Trimmed question.
    pub message: String,
    /// When the server accepted it.
    pub timestamp: String,
}

/// `spirit_response` payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpiritResponsePayload {
    /// Response text.
    pub message: String,
    /// Whitespace-delimited word count of `message`.
    pub word_count: usize,
    /// Per-character reveal delays in milliseconds.
    pub letter_timings: Vec<u64>,
    /// When generation finished.
    pub timestamp: String,
}

/// `error` payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Human-readable description.
    pub message: String,
    /// Machine-readable code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Envelope
// ─────────────────────────────────────────────────────────────────────────────

/// One wire frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Event kind name.
    pub event: String,
    /// Kind-specific payload.
    #[serde(default)]
    pub data: Map<String, Value>,
    /// ISO-8601 timestamp; optional on input, always set on server output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Current time in the envelope timestamp format.
#[must_use]
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn into_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            let _ = map.insert("value".into(), other);
            map
        }
    }
}

impl Envelope {
    fn from_parts(kind: &EventKind, data: Value) -> Self {
        Self {
            event: kind.as_str().to_owned(),
            data: into_object(data),
            timestamp: Some(now_timestamp()),
        }
    }

    /// Parsed event kind.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        EventKind::from(self.event.as_str())
    }

    /// Decode the payload into a typed struct.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        serde_json::from_value(Value::Object(self.data.clone())).map_err(|source| {
            ProtocolError::InvalidPayload {
                kind: self.event.clone(),
                source,
            }
        })
    }

    /// Decode a text frame.
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::InvalidEnvelope)
    }

    /// Encode as a text frame.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    // ── Server → client ──────────────────────────────────────────────────

    /// `user_joined`.
    #[must_use]
    pub fn user_joined(identity: &Identity) -> Self {
        Self::from_parts(&EventKind::UserJoined, json!(identity))
    }

    /// `user_left`.
    #[must_use]
    pub fn user_left(identity: &Identity) -> Self {
        Self::from_parts(&EventKind::UserLeft, json!(identity))
    }

    /// `message_received` echo of an accepted question.
    #[must_use]
    pub fn message_received(user_name: &str, message: &str) -> Self {
        let timestamp = now_timestamp();
        Self::from_parts(
            &EventKind::MessageReceived,
            json!(MessageReceivedPayload {
                user_name: user_name.to_owned(),
                message: message.to_owned(),
                timestamp,
            }),
        )
    }

    /// `spirit_thinking` (empty payload).
    #[must_use]
    pub fn spirit_thinking() -> Self {
        Self::from_parts(&EventKind::SpiritThinking, json!({}))
    }

    /// `spirit_response`.
    #[must_use]
    pub fn spirit_response(message: &str, word_count: usize, letter_timings: &[u64]) -> Self {
        Self::from_parts(
            &EventKind::SpiritResponse,
            json!(SpiritResponsePayload {
                message: message.to_owned(),
                word_count,
                letter_timings: letter_timings.to_vec(),
                timestamp: now_timestamp(),
            }),
        )
    }

    /// `error` with an optional code.
    #[must_use]
    pub fn error(message: impl Into<String>, code: Option<&str>) -> Self {
        Self::from_parts(
            &EventKind::Error,
            json!(ErrorPayload {
                message: message.into(),
                code: code.map(str::to_owned),
            }),
        )
    }

    /// `error` built from a protocol error.
    #[must_use]
    pub fn from_protocol_error(err: &ProtocolError) -> Self {
        Self::error(err.to_string(), Some(err.code()))
    }

    // ── Client → server ──────────────────────────────────────────────────

    /// `send_message`.
    #[must_use]
    pub fn send_message(user_name: &str, message: &str) -> Self {
        Self::from_parts(
            &EventKind::SendMessage,
            json!(SendMessagePayload {
                user_name: Some(user_name.to_owned()),
                message: message.to_owned(),
            }),
        )
    }
}

/// Trim a question and enforce the 1..=500 character bound.
pub fn validate_message(raw: &str) -> Result<&str, ProtocolError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ProtocolError::EmptyMessage);
    }
    let len = trimmed.chars().count();
    if len > MAX_MESSAGE_CHARS {
        return Err(ProtocolError::MessageTooLong {
            len,
            max: MAX_MESSAGE_CHARS,
        });
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::UserId;
    use assert_matches::assert_matches;

    #[test]
    fn kind_mapping() {
        for kind in [
            EventKind::SendMessage,
            EventKind::UserJoined,
            EventKind::UserLeft,
            EventKind::MessageReceived,
            EventKind::SpiritThinking,
            EventKind::SpiritResponse,
            EventKind::Error,
        ] {
            assert_eq!(EventKind::from(kind.as_str()), kind);
        }
        assert_eq!(
            EventKind::from("levitate"),
            EventKind::Other("levitate".into())
        );
    }

    #[test]
    fn decode_without_timestamp() {
        let env = Envelope::from_json(r#"{"event":"send_message","data":{"message":"hi"}}"#)
            .unwrap();
        assert_eq!(env.kind(), EventKind::SendMessage);
        assert!(env.timestamp.is_none());
        let payload: SendMessagePayload = env.payload_as().unwrap();
        assert_eq!(payload.message, "hi");
        assert!(payload.user_name.is_none());
    }

    #[test]
    fn decode_missing_data_is_empty_map() {
        let env = Envelope::from_json(r#"{"event":"spirit_thinking"}"#).unwrap();
        assert!(env.data.is_empty());
    }

    #[test]
    fn undecodable_frame() {
        assert_matches!(
            Envelope::from_json("not json"),
            Err(ProtocolError::InvalidEnvelope(_))
        );
    }

    #[test]
    fn payload_shape_mismatch() {
        let env = Envelope::from_json(r#"{"event":"spirit_response","data":{"message":1}}"#)
            .unwrap();
        let err = env.payload_as::<SpiritResponsePayload>().unwrap_err();
        assert_matches!(err, ProtocolError::InvalidPayload { ref kind, .. } if kind == "spirit_response");
    }

    #[test]
    fn server_envelopes_are_stamped() {
        let identity = Identity::new(UserId::from("u1"), "Ada").unwrap();
        for env in [
            Envelope::user_joined(&identity),
            Envelope::user_left(&identity),
            Envelope::message_received("Ada", "hello"),
            Envelope::spirit_thinking(),
            Envelope::spirit_response("Yes.", 1, &[200, 150, 150, 300]),
            Envelope::error("nope", Some("EMPTY_MESSAGE")),
        ] {
            assert!(env.timestamp.is_some(), "{} missing timestamp", env.event);
        }
    }

    #[test]
    fn user_joined_carries_identity() {
        let identity = Identity::new(UserId::from("u1"), "Ada").unwrap();
        let env = Envelope::user_joined(&identity);
        let back: Identity = env.payload_as().unwrap();
        assert_eq!(back, identity);
    }

    #[test]
    fn spirit_response_wire_shape() {
        let env = Envelope::spirit_response("Hi", 1, &[250, 150]);
        let value: Value = serde_json::from_str(&env.to_json().unwrap()).unwrap();
        assert_eq!(value["event"], "spirit_response");
        assert_eq!(value["data"]["message"], "Hi");
        assert_eq!(value["data"]["word_count"], 1);
        assert_eq!(value["data"]["letter_timings"], json!([250, 150]));
        assert!(value["data"]["timestamp"].is_string());
    }

    #[test]
    fn error_without_code_omits_field() {
        let env = Envelope::error("boom", None);
        assert!(!env.data.contains_key("code"));
    }

    #[test]
    fn protocol_error_envelope() {
        let env = Envelope::from_protocol_error(&ProtocolError::EmptyMessage);
        let payload: ErrorPayload = env.payload_as().unwrap();
        assert_eq!(payload.message, "Message cannot be empty");
        assert_eq!(payload.code.as_deref(), Some("EMPTY_MESSAGE"));
    }

    #[test]
    fn non_object_data_is_wrapped() {
        let env = Envelope::from_parts(&EventKind::Error, json!(42));
        assert_eq!(env.data.get("value"), Some(&json!(42)));
        let env = Envelope::from_parts(&EventKind::SpiritThinking, Value::Null);
        assert!(env.data.is_empty());
    }

    #[test]
    fn validate_message_bounds() {
        assert_eq!(validate_message("  hello  ").unwrap(), "hello");
        assert_matches!(validate_message("   "), Err(ProtocolError::EmptyMessage));
        assert_matches!(validate_message(""), Err(ProtocolError::EmptyMessage));

        let exact = "a".repeat(MAX_MESSAGE_CHARS);
        assert!(validate_message(&exact).is_ok());

        let over = "a".repeat(MAX_MESSAGE_CHARS + 1);
        assert_matches!(
            validate_message(&over),
            Err(ProtocolError::MessageTooLong { len: 501, max: 500 })
        );
    }

    #[test]
    fn validate_counts_chars_not_bytes() {
        let ghosts = "👻".repeat(MAX_MESSAGE_CHARS);
        assert!(validate_message(&ghosts).is_ok());
    }
}
