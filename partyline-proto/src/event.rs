//! Inbound event union and outbound message kinds.
//!
//! The transport hands the session engine raw `{type, data}` JSON objects.
//! [`InboundEvent::decode`] classifies them by the `type` string; anything
//! it does not recognize becomes [`InboundEvent::Unknown`], which the
//! engine treats as a documented no-op rather than an error.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::RawMessage;

/// A typing-presence change for one nickname.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPresence {
    /// The nickname whose typing state changed.
    pub nickname: String,
    /// Whether that user is currently typing.
    pub is_typing: bool,
}

/// Replay request for messages newer than a given timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayRequest {
    /// The room whose history is requested.
    pub room_id: String,
    /// Only messages strictly newer than this (milliseconds) are wanted.
    pub timestamp: u64,
}

/// Keepalive ping payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatPing {
    /// When the ping was sent (milliseconds since epoch).
    pub timestamp: u64,
    /// Who sent it.
    pub nickname: String,
}

/// Error raised when a recognized event carries a malformed payload.
#[derive(Debug, thiserror::Error)]
#[error("malformed payload for '{kind}' event: {source}")]
pub struct EventError {
    /// The wire `type` string of the offending event.
    pub kind: String,
    /// The underlying deserialization failure.
    #[source]
    pub source: serde_json::Error,
}

/// A classified inbound event from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// A live chat message (wire types `chatMessage` and `sendMessage`).
    ChatMessage(RawMessage),
    /// A typing-presence change (`typingPresence` / `setTypingPresence`).
    TypingPresence(TypingPresence),
    /// A batch of historical messages, in server order (`historicalMessages`).
    HistoricalMessages(Vec<RawMessage>),
    /// A room membership snapshot (`userList`). Payload is not consumed.
    UserList,
    /// A keepalive echo (`heartbeat`). Acknowledged with no state change.
    Heartbeat,
    /// Any event type this engine does not recognize. Ignored without error.
    Unknown(String),
}

impl InboundEvent {
    /// Classifies a raw `{type, data}` event.
    ///
    /// Unrecognized `type` strings yield [`InboundEvent::Unknown`].
    ///
    /// # Errors
    ///
    /// Returns [`EventError`] only when a *recognized* event type carries a
    /// payload that fails to deserialize.
    pub fn decode(kind: &str, data: Value) -> Result<Self, EventError> {
        match kind {
            // The server echoes client sends back under the send type, so
            // both spellings are live chat messages.
            "chatMessage" | "sendMessage" => serde_json::from_value(data)
                .map(Self::ChatMessage)
                .map_err(|source| EventError {
                    kind: kind.to_string(),
                    source,
                }),
            "typingPresence" | "setTypingPresence" => serde_json::from_value(data)
                .map(Self::TypingPresence)
                .map_err(|source| EventError {
                    kind: kind.to_string(),
                    source,
                }),
            "historicalMessages" => serde_json::from_value(data)
                .map(Self::HistoricalMessages)
                .map_err(|source| EventError {
                    kind: kind.to_string(),
                    source,
                }),
            "userList" => Ok(Self::UserList),
            "heartbeat" => Ok(Self::Heartbeat),
            other => Ok(Self::Unknown(other.to_string())),
        }
    }
}

/// Outbound message kinds the engine transmits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundKind {
    /// Send a chat message to the room.
    SendMessage,
    /// Announce a typing-presence change.
    SetTypingPresence,
    /// Request replay of messages newer than a timestamp.
    GetMessages,
    /// Keepalive ping.
    Heartbeat,
}

impl OutboundKind {
    /// The wire `type` string for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SendMessage => "sendMessage",
            Self::SetTypingPresence => "setTypingPresence",
            Self::GetMessages => "getMessages",
            Self::Heartbeat => "heartbeat",
        }
    }
}

impl std::fmt::Display for OutboundKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
