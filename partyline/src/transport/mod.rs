//! Transport layer abstraction for `Partyline`.
//!
//! Defines the [`RoomClient`] / [`RoomChannel`] traits the session engine
//! drives. The real network client lives outside this crate; the
//! [`loopback`] module provides an in-process implementation backed by a
//! room hub for tests.
//!
//! # Teardown contract
//!
//! The transport exposes no close or disconnect primitive. Releasing the
//! channel handle (dropping it) is the only defined teardown, and a handle
//! must never be reused after the transport reports it closed.

pub mod loopback;

use serde::Serialize;

use partyline_proto::event::{InboundEvent, OutboundKind};

/// Errors that can occur during transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The channel to the server has been closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// The operation timed out before completing.
    #[error("transport operation timed out")]
    Timeout,

    /// Constructing the client itself failed. Non-recoverable for this mount.
    #[error("client construction failed: {0}")]
    ClientConstruction(String),

    /// An outbound payload could not be serialized.
    #[error("payload serialization failed: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Raw signals delivered by a channel, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The connection is established and accepts writes.
    Ready,
    /// The connection was closed by the server or the network.
    Closed,
    /// A classified inbound protocol event.
    Inbound(InboundEvent),
    /// A transport-level error with a human-readable description.
    Error(String),
}

/// One live connection to the chat server.
///
/// A channel is owned exclusively by one session attempt (one generation).
/// After [`ChannelEvent::Closed`] is observed the handle must be dropped;
/// opening a fresh channel via [`RoomClient::connect`] is the only way to
/// recover.
pub trait RoomChannel: Send + Sync + 'static {
    /// Wait for the next channel event.
    ///
    /// Returns `None` when the underlying event stream is gone, which the
    /// engine treats the same as [`ChannelEvent::Closed`].
    fn next_event(&mut self) -> impl std::future::Future<Output = Option<ChannelEvent>> + Send;

    /// Create a new room, returning its identifier.
    ///
    /// Asynchronous and may stall indefinitely on a broken connection; the
    /// caller is responsible for racing it against a timeout.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the channel is no longer usable.
    fn create_room(
        &self,
        nickname: &str,
        icon: Option<&str>,
    ) -> impl std::future::Future<Output = Result<String, TransportError>> + Send;

    /// Join a room under a nickname. Fire-and-forget: success is observed
    /// only through subsequent inbound traffic.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the channel is no longer usable.
    fn join_room(
        &self,
        nickname: &str,
        room_id: &str,
        icon: Option<&str>,
    ) -> Result<(), TransportError>;

    /// Send a typed payload to the server. Fire-and-forget.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if serialization fails or the channel is
    /// no longer usable.
    fn send<P: Serialize + Sync>(
        &self,
        kind: OutboundKind,
        payload: &P,
    ) -> Result<(), TransportError>;
}

/// Factory for channels. One client may open many channels over a session's
/// lifetime (one per connection attempt); previous channels are discarded,
/// never reused.
pub trait RoomClient: Send + Sync + 'static {
    /// The channel type this client produces.
    type Channel: RoomChannel;

    /// Open a fresh channel.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ClientConstruction`] when the client itself
    /// cannot be built; the session surfaces this as a fatal error.
    fn connect(&self) -> Result<Self::Channel, TransportError>;
}
