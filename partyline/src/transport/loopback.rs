//! In-process transport backed by a shared room hub.
//!
//! [`LoopbackHub`] plays the role of the chat server: it echoes sent
//! messages to every channel joined to the room (including the sender,
//! which is how the real server confirms sends), fans out typing presence,
//! answers replay requests from per-room history, and echoes heartbeats.
//!
//! Tests use the hub's control surface to simulate the failure modes the
//! session engine must survive: severed connections, delayed readiness,
//! and duplicate event delivery via [`LoopbackHub::inject_room`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use partyline_proto::event::{HeartbeatPing, InboundEvent, OutboundKind, ReplayRequest, TypingPresence};
use partyline_proto::message::RawMessage;

use super::{ChannelEvent, RoomChannel, RoomClient, TransportError};

/// One registered channel on the hub.
struct ChannelSlot {
    tx: mpsc::UnboundedSender<ChannelEvent>,
    client: u64,
    room: Option<String>,
}

#[derive(Default)]
struct HubInner {
    next_channel: u64,
    next_client: u64,
    channels: HashMap<u64, ChannelSlot>,
    /// Per-room message history, in arrival order, for replay requests.
    history: HashMap<String, Vec<RawMessage>>,
    /// Per-room keepalive pings, in arrival order.
    heartbeats: HashMap<String, Vec<HeartbeatPing>>,
}

struct HubState {
    inner: Mutex<HubInner>,
    ready_delay: Mutex<Duration>,
    create_delay: Mutex<Duration>,
}

/// Shared in-process chat server for tests.
#[derive(Clone)]
pub struct LoopbackHub {
    state: Arc<HubState>,
}

impl Default for LoopbackHub {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackHub {
    /// Creates a hub with immediate readiness and instant room creation.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(HubState {
                inner: Mutex::new(HubInner::default()),
                ready_delay: Mutex::new(Duration::ZERO),
                create_delay: Mutex::new(Duration::ZERO),
            }),
        }
    }

    /// Delays the `Ready` signal on every subsequently opened channel.
    pub fn set_ready_delay(&self, delay: Duration) {
        *self.state.ready_delay.lock() = delay;
    }

    /// Delays every subsequent `create_room` response.
    pub fn set_create_delay(&self, delay: Duration) {
        *self.state.create_delay.lock() = delay;
    }

    /// Returns a client handle; channels it opens are tagged with a client
    /// id so tests can sever one participant's connections selectively.
    #[must_use]
    pub fn client(&self) -> LoopbackClient {
        let mut inner = self.state.inner.lock();
        inner.next_client += 1;
        LoopbackClient {
            state: Arc::clone(&self.state),
            id: inner.next_client,
        }
    }

    /// Delivers an event to every channel joined to `room_id`, bypassing
    /// the normal send path. Calling this twice with the same payload is
    /// how tests simulate transport retransmission.
    pub fn inject_room(&self, room_id: &str, event: InboundEvent) {
        let inner = self.state.inner.lock();
        for slot in inner.channels.values() {
            if slot.room.as_deref() == Some(room_id) {
                let _ = slot.tx.send(ChannelEvent::Inbound(event.clone()));
            }
        }
    }

    /// Returns the stored history for a room.
    #[must_use]
    pub fn history(&self, room_id: &str) -> Vec<RawMessage> {
        self.state
            .inner
            .lock()
            .history
            .get(room_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns every keepalive ping received for a room, in order.
    #[must_use]
    pub fn heartbeats(&self, room_id: &str) -> Vec<HeartbeatPing> {
        self.state
            .inner
            .lock()
            .heartbeats
            .get(room_id)
            .cloned()
            .unwrap_or_default()
    }
}

/// Client handle bound to one hub participant.
#[derive(Clone)]
pub struct LoopbackClient {
    state: Arc<HubState>,
    id: u64,
}

impl LoopbackClient {
    /// Severs every channel this client has open: each receives `Closed`
    /// and is unregistered, so later operations on it fail.
    pub fn sever(&self) {
        let mut inner = self.state.inner.lock();
        let ids: Vec<u64> = inner
            .channels
            .iter()
            .filter(|(_, slot)| slot.client == self.id)
            .map(|(id, _)| *id)
            .collect();
        for id in ids {
            if let Some(slot) = inner.channels.remove(&id) {
                let _ = slot.tx.send(ChannelEvent::Closed);
            }
        }
    }
}

impl RoomClient for LoopbackClient {
    type Channel = LoopbackChannel;

    fn connect(&self) -> Result<Self::Channel, TransportError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut inner = self.state.inner.lock();
            inner.next_channel += 1;
            let id = inner.next_channel;
            inner.channels.insert(
                id,
                ChannelSlot {
                    tx: tx.clone(),
                    client: self.id,
                    room: None,
                },
            );
            id
        };

        let ready_delay = *self.state.ready_delay.lock();
        if ready_delay.is_zero() {
            let _ = tx.send(ChannelEvent::Ready);
        } else {
            tokio::spawn(async move {
                tokio::time::sleep(ready_delay).await;
                let _ = tx.send(ChannelEvent::Ready);
            });
        }

        Ok(LoopbackChannel {
            state: Arc::clone(&self.state),
            id,
            rx,
        })
    }
}

/// One live channel onto the hub.
pub struct LoopbackChannel {
    state: Arc<HubState>,
    id: u64,
    rx: mpsc::UnboundedReceiver<ChannelEvent>,
}

impl LoopbackChannel {
    fn broadcast_to_room(inner: &HubInner, room_id: &str, event: &InboundEvent) {
        for slot in inner.channels.values() {
            if slot.room.as_deref() == Some(room_id) {
                let _ = slot.tx.send(ChannelEvent::Inbound(event.clone()));
            }
        }
    }
}

impl RoomChannel for LoopbackChannel {
    async fn next_event(&mut self) -> Option<ChannelEvent> {
        self.rx.recv().await
    }

    async fn create_room(
        &self,
        _nickname: &str,
        _icon: Option<&str>,
    ) -> Result<String, TransportError> {
        let create_delay = *self.state.create_delay.lock();
        if !create_delay.is_zero() {
            tokio::time::sleep(create_delay).await;
        }

        let mut inner = self.state.inner.lock();
        if !inner.channels.contains_key(&self.id) {
            return Err(TransportError::ConnectionClosed);
        }
        let room_id = Uuid::now_v7().to_string();
        inner.history.insert(room_id.clone(), Vec::new());
        Ok(room_id)
    }

    fn join_room(
        &self,
        _nickname: &str,
        room_id: &str,
        _icon: Option<&str>,
    ) -> Result<(), TransportError> {
        let mut inner = self.state.inner.lock();
        inner.history.entry(room_id.to_string()).or_default();
        let slot = inner
            .channels
            .get_mut(&self.id)
            .ok_or(TransportError::ConnectionClosed)?;
        slot.room = Some(room_id.to_string());
        Ok(())
    }

    fn send<P: Serialize + Sync>(
        &self,
        kind: OutboundKind,
        payload: &P,
    ) -> Result<(), TransportError> {
        let value = serde_json::to_value(payload)?;
        let mut inner = self.state.inner.lock();
        let slot = inner
            .channels
            .get(&self.id)
            .ok_or(TransportError::ConnectionClosed)?;
        let room = slot.room.clone();
        let tx = slot.tx.clone();

        match kind {
            OutboundKind::SendMessage => {
                let (Some(room_id), Ok(message)) =
                    (room, serde_json::from_value::<RawMessage>(value))
                else {
                    return Ok(()); // server drops malformed or roomless sends
                };
                inner
                    .history
                    .entry(room_id.clone())
                    .or_default()
                    .push(message.clone());
                Self::broadcast_to_room(&inner, &room_id, &InboundEvent::ChatMessage(message));
            }
            OutboundKind::SetTypingPresence => {
                let (Some(room_id), Ok(presence)) =
                    (room, serde_json::from_value::<TypingPresence>(value))
                else {
                    return Ok(());
                };
                Self::broadcast_to_room(&inner, &room_id, &InboundEvent::TypingPresence(presence));
            }
            OutboundKind::GetMessages => {
                let Ok(request) = serde_json::from_value::<ReplayRequest>(value) else {
                    return Ok(());
                };
                let batch: Vec<RawMessage> = inner
                    .history
                    .get(&request.room_id)
                    .map(|messages| {
                        messages
                            .iter()
                            .filter(|m| m.timestamp.unwrap_or(0) > request.timestamp)
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default();
                let _ = tx.send(ChannelEvent::Inbound(InboundEvent::HistoricalMessages(batch)));
            }
            OutboundKind::Heartbeat => {
                let Ok(ping) = serde_json::from_value::<HeartbeatPing>(value) else {
                    return Ok(());
                };
                if let Some(room_id) = room {
                    inner.heartbeats.entry(room_id).or_default().push(ping);
                }
                let _ = tx.send(ChannelEvent::Inbound(InboundEvent::Heartbeat));
            }
        }
        Ok(())
    }
}

impl Drop for LoopbackChannel {
    fn drop(&mut self) {
        // Releasing the handle is the only teardown the transport defines.
        self.state.inner.lock().channels.remove(&self.id);
    }
}
