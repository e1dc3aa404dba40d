//! Signaling wire contract.
//!
//! Frames are JSON objects of the form `{"event": "<name>", "data": {...}}`.
//! Field names follow the room server (`userId`, `username`, `isMuted`, ...);
//! the shorter logical names (`id`, `name`, `senderId`, `body`, `self`) are
//! accepted as aliases on inbound frames.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::HuddleError;

/// Upper bound on an outbound chat body, in characters.
pub const MAX_CHAT_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    JoinRoom { room_id: String },
    ChatMessage { message: String },
    #[serde(rename_all = "camelCase")]
    MuteToggle { is_muted: bool },
    #[serde(rename_all = "camelCase")]
    VideoToggle { is_video_off: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PeerDescriptor {
    #[serde(rename = "userId", alias = "id")]
    pub id: String,
    #[serde(rename = "username", alias = "name", default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InboundChat {
    #[serde(rename = "userId", alias = "senderId")]
    pub sender_id: String,
    #[serde(rename = "username", alias = "senderName", default)]
    pub sender_name: String,
    #[serde(rename = "message", alias = "body")]
    pub body: String,
    #[serde(default = "Utc::now", deserialize_with = "lenient_timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// Chat timestamps are informational. RFC 3339 strings and epoch
/// milliseconds are understood; anything else is stamped on receipt.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    let parsed = match &raw {
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        serde_json::Value::Number(n) => n.as_i64().and_then(DateTime::<Utc>::from_timestamp_millis),
        _ => None,
    };
    Ok(parsed.unwrap_or_else(|| {
        tracing::debug!("unreadable chat timestamp {raw}, using receipt time");
        Utc::now()
    }))
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    JoinedRoom {
        room_id: String,
        #[serde(default)]
        participants: Vec<PeerDescriptor>,
        #[serde(rename = "userInfo", alias = "self")]
        self_info: PeerDescriptor,
    },
    UserJoined(PeerDescriptor),
    UserLeft(PeerDescriptor),
    ChatMessage(InboundChat),
    #[serde(rename_all = "camelCase")]
    UserMuteToggle {
        #[serde(alias = "id")]
        user_id: String,
        is_muted: bool,
    },
    #[serde(rename_all = "camelCase")]
    UserVideoToggle {
        #[serde(alias = "id")]
        user_id: String,
        is_video_off: bool,
    },
    Error { message: String },
    // Media negotiation belongs to the external routing layer.
    Offer(serde_json::Value),
    Answer(serde_json::Value),
    IceCandidate(serde_json::Value),
}

impl ClientMessage {
    pub fn to_frame(&self) -> Result<String, HuddleError> {
        serde_json::to_string(self).map_err(|e| HuddleError::Protocol(e.to_string()))
    }
}

impl ServerMessage {
    pub fn from_frame(frame: &str) -> Result<Self, HuddleError> {
        serde_json::from_str(frame).map_err(|e| HuddleError::Protocol(e.to_string()))
    }
}

/// Trim a chat body and check it against the outbound limits.
pub fn validate_chat_body(body: &str) -> Result<String, HuddleError> {
    let body = body.trim();
    if body.is_empty() {
        return Err(HuddleError::ChatRejected("message is empty".into()));
    }
    let len = body.chars().count();
    if len > MAX_CHAT_CHARS {
        return Err(HuddleError::ChatRejected(format!(
            "message is {len} characters, limit is {MAX_CHAT_CHARS}"
        )));
    }
    Ok(body.to_string())
}
