//! Upstream wire protocol
//!
//! Every payload is classified once at ingress as either structured JSON or
//! plain text, and that classification travels with the frame afterwards.

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::Error;

/// A single WebSocket data payload.
///
/// Serializes untagged: text becomes a JSON string, structured frames are
/// embedded as their decoded value. Numbers keep their exact wire text.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Frame {
    /// Payload that did not parse as JSON
    Text(String),
    /// Payload that parsed as JSON
    Json(Value),
}

impl Frame {
    /// Create a text frame
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Create a structured frame
    pub fn json(value: Value) -> Self {
        Self::Json(value)
    }

    /// Best-effort decode of a received payload.
    ///
    /// Never fails: anything that is not valid JSON is kept as text.
    pub fn decode(payload: &str) -> Self {
        match serde_json::from_str::<Value>(payload) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Text(payload.to_string()),
        }
    }

    /// Decode a binary payload. Invalid UTF-8 is replaced rather than rejected.
    pub fn decode_bytes(payload: &[u8]) -> Self {
        Self::decode(&String::from_utf8_lossy(payload))
    }

    /// Wire form: JSON is re-encoded, text is sent verbatim
    pub fn to_wire(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Json(value) => value.to_string(),
        }
    }

    /// The value this frame occupies inside an echo envelope
    pub fn to_value(&self) -> Value {
        match self {
            Self::Text(text) => Value::String(text.clone()),
            Self::Json(value) => value.clone(),
        }
    }

    pub fn is_json(&self) -> bool {
        matches!(self, Self::Json(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Json(_) => "json",
        }
    }
}

impl From<Value> for Frame {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => Self::Text(text),
            other => Self::Json(other),
        }
    }
}

// Untagged derives buffer numbers and lose their raw form
impl<'de> Deserialize<'de> for Frame {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from)
    }
}

impl std::fmt::Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_wire())
    }
}

/// Frame sent by the upstream echo server
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EchoResponse {
    /// First frame on every connection
    Welcome {
        message: String,
        path: String,
        timestamp: f64,
    },

    /// Reply to one inbound frame
    Echo {
        original: Frame,
        processed_at: f64,
        server: String,
    },
}

impl EchoResponse {
    pub fn welcome(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::Welcome {
            message: message.into(),
            path: path.into(),
            timestamp: unix_timestamp(),
        }
    }

    pub fn echo(original: Frame, server: impl Into<String>) -> Self {
        Self::Echo {
            original,
            processed_at: unix_timestamp(),
            server: server.into(),
        }
    }

    /// Parse a frame received from the upstream.
    ///
    /// Goes through [`Value`] rather than a tagged derive so that numbers
    /// inside `original` survive unchanged.
    pub fn parse(payload: &str) -> crate::Result<Self> {
        let mut value: Value = serde_json::from_str(payload)?;
        let kind = value.get("type").and_then(Value::as_str).map(str::to_string);

        match kind.as_deref() {
            Some("welcome") => Ok(Self::Welcome {
                message: string_field(&value, "message")?,
                path: string_field(&value, "path")?,
                timestamp: number_field(&value, "timestamp")?,
            }),
            Some("echo") => {
                let original = value
                    .get_mut("original")
                    .map(Value::take)
                    .ok_or_else(|| missing("original"))?;
                Ok(Self::Echo {
                    original: Frame::from(original),
                    processed_at: number_field(&value, "processed_at")?,
                    server: string_field(&value, "server")?,
                })
            }
            Some(other) => Err(Error::Protocol(format!("unknown frame type '{}'", other))),
            None => Err(missing("type")),
        }
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn is_welcome(&self) -> bool {
        matches!(self, Self::Welcome { .. })
    }
}

fn missing(field: &str) -> Error {
    Error::Protocol(format!("missing field '{}'", field))
}

fn string_field(value: &Value, field: &str) -> crate::Result<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| missing(field))
}

fn number_field(value: &Value, field: &str) -> crate::Result<f64> {
    value.get(field).and_then(Value::as_f64).ok_or_else(|| missing(field))
}

/// Seconds since the Unix epoch, with sub-second precision
pub fn unix_timestamp() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_json_object() {
        let frame = Frame::decode(r#"{"type":"ping","timestamp":1700000000}"#);
        assert_eq!(frame, Frame::Json(json!({"type": "ping", "timestamp": 1700000000})));
        assert!(frame.is_json());
    }

    #[test]
    fn test_decode_falls_back_to_text() {
        let frame = Frame::decode("Hello BWS WebSocket Proxy!");
        assert_eq!(frame, Frame::text("Hello BWS WebSocket Proxy!"));
        assert_eq!(frame.kind(), "text");

        // Truncated JSON is text too
        let frame = Frame::decode(r#"{"type":"#);
        assert_eq!(frame, Frame::text(r#"{"type":"#));
    }

    #[test]
    fn test_decode_bytes_lossy() {
        let frame = Frame::decode_bytes(&[0x68, 0x69, 0xff]);
        assert_eq!(frame, Frame::text("hi\u{fffd}"));
    }

    #[test]
    fn test_welcome_wire_format() {
        let welcome = EchoResponse::welcome("hello", "/ws");
        let value: Value = serde_json::from_str(&welcome.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "welcome");
        assert_eq!(value["message"], "hello");
        assert_eq!(value["path"], "/ws");
        assert!(value["timestamp"].is_f64());
    }

    #[test]
    fn test_echo_embeds_json_as_object() {
        let echo = EchoResponse::echo(Frame::decode(r#"{"a":1}"#), "tag");
        let value: Value = serde_json::from_str(&echo.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "echo");
        assert_eq!(value["original"], json!({"a": 1}));
        assert_eq!(value["server"], "tag");
        assert!(value["processed_at"].is_number());
    }

    #[test]
    fn test_echo_embeds_text_as_string() {
        let echo = EchoResponse::echo(Frame::text("plain"), "tag");
        let value: Value = serde_json::from_str(&echo.to_json().unwrap()).unwrap();
        assert_eq!(value["original"], json!("plain"));
    }

    #[test]
    fn test_parse_echo() {
        let payload = r#"{"type":"echo","original":{"type":"test"},"processed_at":1.5,"server":"s"}"#;
        match EchoResponse::parse(payload).unwrap() {
            EchoResponse::Echo { original, server, .. } => {
                assert_eq!(original.to_value(), json!({"type": "test"}));
                assert_eq!(server, "s");
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_parse_welcome() {
        let payload = r#"{"type":"welcome","message":"hi","path":"/ws","timestamp":1700000000.25}"#;
        assert_eq!(
            EchoResponse::parse(payload).unwrap(),
            EchoResponse::Welcome {
                message: "hi".to_string(),
                path: "/ws".to_string(),
                timestamp: 1700000000.25,
            }
        );
    }

    #[test]
    fn test_big_integer_survives_echo() {
        let wire = r#"{"n":123456789012345678901234567890}"#;
        let echo = EchoResponse::echo(Frame::decode(wire), "tag");

        match EchoResponse::parse(&echo.to_json().unwrap()).unwrap() {
            EchoResponse::Echo { original, .. } => assert_eq!(original.to_wire(), wire),
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_parse_text_original() {
        let payload = r#"{"type":"echo","original":"plain","processed_at":1,"server":"s"}"#;
        match EchoResponse::parse(payload).unwrap() {
            EchoResponse::Echo { original, .. } => assert_eq!(original, Frame::text("plain")),
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_parse_rejects_missing_fields() {
        assert!(EchoResponse::parse(r#"{"type":"echo","processed_at":1,"server":"s"}"#).is_err());
        assert!(EchoResponse::parse(r#"{"type":"welcome","message":"hi"}"#).is_err());
        assert!(EchoResponse::parse(r#"{"message":"hi"}"#).is_err());
    }

    #[test]
    fn test_parse_rejects_unknown_type() {
        assert!(EchoResponse::parse(r#"{"type":"chat","message":"x"}"#).is_err());
        assert!(EchoResponse::parse("not json").is_err());
    }
}
