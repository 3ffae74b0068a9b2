//! Message admission with duplicate suppression.
//!
//! The transport retransmits, the server plays self-authored messages
//! back, and replay batches overlap with live traffic — so every message
//! passes through one admission gate keyed by a coarse fingerprint.
//! Duplicates are logged and dropped, never surfaced as errors.

use std::collections::HashSet;

use partyline_proto::message::ChatMessage;

/// How many leading body characters participate in the fingerprint.
///
/// Coarse by design: it tolerates the absence of a server-assigned id for
/// some message kinds while still catching the common duplicate causes.
const FINGERPRINT_BODY_CHARS: usize = 10;

/// Derived key used to recognize duplicate messages.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Computes the fingerprint of a message: author (or `system`),
    /// timestamp, and the first [`FINGERPRINT_BODY_CHARS`] characters of
    /// the body.
    #[must_use]
    pub fn of(message: &ChatMessage) -> Self {
        let prefix: String = message.body.chars().take(FINGERPRINT_BODY_CHARS).collect();
        Self(format!(
            "{}-{}-{}",
            message.author(),
            message.timestamp.as_millis(),
            prefix
        ))
    }
}

/// Outcome of offering a message for admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// First sighting; append to the visible conversation.
    Accepted,
    /// Fingerprint already admitted this session; drop silently.
    Duplicate,
}

/// Owns the admitted-fingerprint set for one session's lifetime.
///
/// No eviction: the set is bounded in practice by conversation length and
/// is reset only when a session is (re)constructed for a room — not on
/// reconnect.
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: HashSet<Fingerprint>,
}

impl Deduplicator {
    /// Creates an empty deduplicator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits a candidate message, recording its fingerprint.
    pub fn admit(&mut self, message: &ChatMessage) -> Admission {
        let fingerprint = Fingerprint::of(message);
        if self.seen.insert(fingerprint) {
            Admission::Accepted
        } else {
            tracing::debug!(
                author = message.author(),
                timestamp = %message.timestamp,
                "duplicate message dropped"
            );
            Admission::Duplicate
        }
    }

    /// Number of distinct fingerprints admitted so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether nothing has been admitted yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
