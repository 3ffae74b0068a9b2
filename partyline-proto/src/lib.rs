//! `Partyline` wire protocol types.
//!
//! The transport collaborator delivers events as loosely-typed
//! `{type, data}` JSON objects. This crate turns them into the strongly
//! typed [`event::InboundEvent`] union, and defines the message shapes
//! the session engine admits into the visible conversation.

pub mod event;
pub mod message;
