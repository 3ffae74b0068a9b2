//! Chat message types for the `Partyline` protocol.
//!
//! Messages arrive from the transport in a lenient wire shape
//! ([`RawMessage`]) where the timestamp may be absent. The session engine
//! normalizes them into [`ChatMessage`] before admission, defaulting a
//! missing timestamp to the local arrival time.

use serde::{Deserialize, Serialize};

/// Author name recorded on fingerprints for system-generated messages.
pub const SYSTEM_AUTHOR: &str = "system";

/// Millisecond-precision UTC timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a timestamp for the current instant.
    #[must_use]
    pub fn now() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// Creates a timestamp from milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// A chat message exactly as it appears on the wire.
///
/// The server does not guarantee a timestamp on every message kind, and
/// system notices may omit the author fields entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    /// The message text.
    pub body: String,
    /// Author nickname; absent for system messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_nickname: Option<String>,
    /// Author icon reference (data URI or similar); optional.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_icon: Option<String>,
    /// Creation time in milliseconds since epoch, if the sender supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    /// Server-or-locally-assigned identifier. Coarse: not unique for every
    /// message kind, which is why admission uses a fingerprint instead.
    #[serde(default)]
    pub perm_id: String,
    /// Whether this is a system-generated notice (join/leave).
    #[serde(default)]
    pub is_system_message: bool,
}

impl RawMessage {
    /// Normalizes this wire message into a [`ChatMessage`], defaulting a
    /// missing timestamp to `arrival`.
    #[must_use]
    pub fn normalize(self, arrival: Timestamp) -> ChatMessage {
        ChatMessage {
            body: self.body,
            user_nickname: self.user_nickname,
            user_icon: self.user_icon,
            timestamp: self.timestamp.map_or(arrival, Timestamp::from_millis),
            perm_id: self.perm_id,
            is_system_message: self.is_system_message,
        }
    }
}

/// A normalized chat message, ready for admission into the conversation.
///
/// Immutable once admitted; the visible conversation is an append-only
/// sequence ordered by admission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// The message text.
    pub body: String,
    /// Author nickname; `None` for system messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_nickname: Option<String>,
    /// Author icon reference; optional.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_icon: Option<String>,
    /// Creation time in milliseconds since epoch.
    pub timestamp: Timestamp,
    /// Unique-ish identifier assigned by the sender or the server.
    #[serde(default)]
    pub perm_id: String,
    /// Whether this is a system-generated notice.
    #[serde(default)]
    pub is_system_message: bool,
}

impl ChatMessage {
    /// Builds a locally-synthesized system notice (e.g. a join message).
    ///
    /// System notices are admitted to the local conversation but never
    /// transmitted.
    #[must_use]
    pub fn system(body: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            body: body.into(),
            user_nickname: None,
            user_icon: None,
            timestamp,
            perm_id: SYSTEM_AUTHOR.to_string(),
            is_system_message: true,
        }
    }

    /// Returns the author name used for fingerprinting: the nickname, or
    /// [`SYSTEM_AUTHOR`] when absent.
    #[must_use]
    pub fn author(&self) -> &str {
        self.user_nickname.as_deref().unwrap_or(SYSTEM_AUTHOR)
    }
}
