//! Typing-presence tracking.
//!
//! [`TypingRoster`] holds the set of nicknames currently typing in the
//! room as known to this tab; it is driven purely by inbound presence
//! events and is independent of connection state. [`LocalTyping`] is the
//! edge-trigger for this tab's own announcements: true only on the
//! empty-to-non-empty input transition, false on the reverse transition,
//! so presence-event volume stays far below one-per-keystroke.

/// The set of nicknames currently signalling "typing".
#[derive(Debug, Default)]
pub struct TypingRoster {
    typing: Vec<String>,
}

impl TypingRoster {
    /// Creates an empty roster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies an arrival/departure event. Returns whether the roster
    /// changed (idempotent for repeated announcements).
    pub fn apply(&mut self, nickname: &str, is_typing: bool) -> bool {
        let present = self.typing.iter().any(|n| n == nickname);
        match (is_typing, present) {
            (true, false) => {
                self.typing.push(nickname.to_string());
                true
            }
            (false, true) => {
                self.typing.retain(|n| n != nickname);
                true
            }
            _ => false,
        }
    }

    /// The nicknames currently typing, in arrival order.
    #[must_use]
    pub fn nicknames(&self) -> Vec<String> {
        self.typing.clone()
    }

    /// Clears the roster (session teardown).
    pub fn clear(&mut self) {
        self.typing.clear();
    }
}

/// What, if anything, to announce after an input change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingEdge {
    /// Announce typing started.
    AnnounceTyping,
    /// Announce typing stopped.
    AnnounceStopped,
    /// No transition; a keystroke within an ongoing typing run. The idle
    /// timer should still be re-armed.
    Keystroke,
    /// Input unchanged in kind and still empty; nothing to do.
    Idle,
}

/// Edge-triggered local typing state for this tab.
#[derive(Debug, Default)]
pub struct LocalTyping {
    typing: bool,
}

impl LocalTyping {
    /// Creates the tracker in the not-typing state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether this tab currently claims to be typing.
    #[must_use]
    pub const fn is_typing(&self) -> bool {
        self.typing
    }

    /// Reacts to the input field changing to `text`.
    pub fn on_input(&mut self, text: &str) -> TypingEdge {
        let non_empty = !text.trim().is_empty();
        match (self.typing, non_empty) {
            (false, true) => {
                self.typing = true;
                TypingEdge::AnnounceTyping
            }
            (true, false) => {
                self.typing = false;
                TypingEdge::AnnounceStopped
            }
            (true, true) => TypingEdge::Keystroke,
            (false, false) => TypingEdge::Idle,
        }
    }

    /// Forces the not-typing state (idle timeout or message sent).
    /// Returns whether an announcement is owed.
    pub fn stop(&mut self) -> bool {
        std::mem::replace(&mut self.typing, false)
    }
}
