//! WebSocket Message Types
//!
//! Defines the frames exchanged between match clients and the server.
//!
//! Client frames are parsed leniently: anything that decodes as JSON is
//! accepted, `matchId` is coerced the way a JavaScript client would expect,
//! and frames with an unknown `type` or a non-integer `matchId` are ignored
//! so newer clients keep working against this server.

use serde::Serialize;
use serde_json::Value;

/// Identifier of a match topic
pub type TopicId = i64;

/// Static message sent back when an inbound frame is not valid JSON
pub const INVALID_JSON: &str = "Invalid JSON";

/// Frames sent from client to server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Start receiving commentary for a match
    Subscribe { match_id: TopicId },
    /// Stop receiving commentary for a match
    Unsubscribe { match_id: TopicId },
    /// Anything else; deliberately a no-op
    Ignored,
}

/// Raw frame could not be decoded as JSON
#[derive(Debug, thiserror::Error)]
#[error("{}", INVALID_JSON)]
pub struct MalformedFrame(#[from] pub serde_json::Error);

impl ClientMessage {
    /// Parse a raw text frame
    pub fn parse(text: &str) -> Result<Self, MalformedFrame> {
        let value: Value = serde_json::from_str(text)?;

        let kind = value.get("type").and_then(Value::as_str);
        let match_id = value.get("matchId").and_then(coerce_topic_id);

        Ok(match (kind, match_id) {
            (Some("subscribe"), Some(match_id)) => ClientMessage::Subscribe { match_id },
            (Some("unsubscribe"), Some(match_id)) => ClientMessage::Unsubscribe { match_id },
            _ => ClientMessage::Ignored,
        })
    }
}

/// Coerce a `matchId` field to an integer topic id.
///
/// Follows JavaScript `Number()` followed by an integer check: `null`,
/// `false`, `""` and `[]` become 0, `true` becomes 1, strings are trimmed
/// and read as decimal, hex, octal or binary literals, and a one-element
/// array takes its element's value. Objects, fractions and anything out of
/// `i64` range yield `None`.
fn coerce_topic_id(value: &Value) -> Option<TopicId> {
    match value {
        Value::Null => Some(0),
        Value::Bool(b) => Some(TopicId::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(i),
            None => integral(n.as_f64()?),
        },
        Value::String(s) => parse_topic_str(s),
        Value::Array(items) => match items.as_slice() {
            [] => Some(0),
            // Arrays stringify their element, and "true"/"[object Object]"
            // are not numbers
            [Value::Bool(_)] | [Value::Object(_)] => None,
            [item] => coerce_topic_id(item),
            _ => None,
        },
        Value::Object(_) => None,
    }
}

fn parse_topic_str(s: &str) -> Option<TopicId> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Some(0);
    }
    if let Ok(i) = trimmed.parse::<TopicId>() {
        return Some(i);
    }

    let radix = match trimmed.get(..2) {
        Some("0x" | "0X") => 16,
        Some("0o" | "0O") => 8,
        Some("0b" | "0B") => 2,
        _ => return trimmed.parse::<f64>().ok().and_then(integral),
    };
    let digits = &trimmed[2..];
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    TopicId::from_str_radix(digits, radix).ok()
}

/// Whole floats inside `i64`; `i64::MAX as f64` is 2^63, so the upper
/// bound is exclusive
fn integral(f: f64) -> Option<TopicId> {
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as TopicId)
    } else {
        None
    }
}

/// Frames sent from server to client
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection established
    Welcome,
    /// Subscription confirmed
    Subscribed {
        #[serde(rename = "matchId")]
        match_id: TopicId,
    },
    /// Unsubscription confirmed
    Unsubscribed {
        #[serde(rename = "matchId")]
        match_id: TopicId,
    },
    /// Error message
    Error { message: String },
    /// A new match was created (sent to everyone)
    MatchCreated { data: Value },
    /// New commentary for a match (sent to that match's subscribers)
    Commentary { data: Value },
}

impl ServerMessage {
    /// Serialize to the JSON text sent on the wire
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
