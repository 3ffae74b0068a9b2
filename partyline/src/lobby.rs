//! Room creation, performed before a session is mounted.
//!
//! Creating a room uses a short-lived channel of its own: connect, wait
//! for readiness, let the connection settle briefly, then issue the
//! create call. The channel is dropped afterwards; joining the new room
//! is a separate session with a fresh channel. Both the readiness wait
//! and the create call are raced against timeouts because the transport
//! can stall indefinitely on a broken connection.

use std::time::Duration;

use crate::crosstab::{SharedStorage, store_recovery};
use crate::transport::{ChannelEvent, RoomChannel, RoomClient, TransportError};

/// Timeouts for the room-creation flow.
#[derive(Debug, Clone)]
pub struct LobbyConfig {
    /// How long to wait for the fresh channel to become ready.
    pub connect_timeout: Duration,
    /// Pause between readiness and the create call. The transport accepts
    /// the call slightly before it can reliably service it.
    pub settle_delay: Duration,
    /// How long to wait for the create call to return a room id.
    pub create_timeout: Duration,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            settle_delay: Duration::from_millis(500),
            create_timeout: Duration::from_secs(15),
        }
    }
}

/// Failures of the room-creation flow.
#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    /// The transport reported an error.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The channel never became ready.
    #[error("connection was not ready within {0:?}")]
    ReadyTimeout(Duration),

    /// The channel closed before becoming ready.
    #[error("connection closed before it became ready")]
    ClosedBeforeReady,

    /// A transport error arrived before readiness.
    #[error("connection failed before it became ready: {0}")]
    FailedBeforeReady(String),

    /// The create call did not complete in time.
    #[error("room creation timed out after {0:?}")]
    CreateTimeout(Duration),
}

/// Creates a new room and records the recovery keys for it.
///
/// Returns the new room's identifier. The channel used here is dropped on
/// return; callers join the room with a fresh session.
///
/// # Errors
///
/// Returns [`LobbyError`] when the connection cannot be established, never
/// becomes ready, or the create call fails or times out.
pub async fn create_room<C, S>(
    client: &C,
    storage: &S,
    nickname: &str,
    icon: Option<&str>,
    config: &LobbyConfig,
) -> Result<String, LobbyError>
where
    C: RoomClient,
    S: SharedStorage,
{
    let mut channel = client.connect()?;

    let readiness = async {
        loop {
            match channel.next_event().await {
                Some(ChannelEvent::Ready) => return Ok(()),
                Some(ChannelEvent::Closed) | None => return Err(LobbyError::ClosedBeforeReady),
                Some(ChannelEvent::Error(message)) => {
                    return Err(LobbyError::FailedBeforeReady(message));
                }
                // Traffic before readiness is irrelevant to creation.
                Some(ChannelEvent::Inbound(_)) => {}
            }
        }
    };
    tokio::time::timeout(config.connect_timeout, readiness)
        .await
        .map_err(|_| LobbyError::ReadyTimeout(config.connect_timeout))??;

    tokio::time::sleep(config.settle_delay).await;

    let room_id = tokio::time::timeout(config.create_timeout, channel.create_room(nickname, icon))
        .await
        .map_err(|_| LobbyError::CreateTimeout(config.create_timeout))??;

    tracing::info!(%room_id, nickname, "room created");
    store_recovery(storage, &room_id, nickname, icon);
    Ok(room_id)
}
