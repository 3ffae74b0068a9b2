//! `Partyline` — session lifecycle and message-consistency engine.
//!
//! Sits between an unreliable bidirectional message channel and the
//! on-screen conversation state: connection establishment, reconnection,
//! message deduplication, cross-tab convergence, typing-presence tracking,
//! and keepalive. The UI layer drives a [`session::SessionController`] with
//! commands and consumes its ordered event stream; everything else is
//! internal plumbing.

pub mod crosstab;
pub mod lobby;
pub mod session;
pub mod transport;
pub mod visibility;
