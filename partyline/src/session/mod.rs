//! Session lifecycle controller.
//!
//! [`SessionController`] owns the transport channel for one tab's
//! membership in one room and drives the connection state machine:
//!
//! ```text
//! Idle → Connecting → Ready → Joining → Joined
//!                                         │
//!           Connecting ← Reconnecting ← Closed
//! ```
//!
//! `Closed` is also reachable directly from `Connecting`/`Joining` on
//! failure. The controller is the sole writer of session state; the UI
//! layer sends [`SessionCommand`]s and consumes the ordered
//! [`SessionEvent`] stream.
//!
//! # Concurrency
//!
//! Everything runs on one cooperative event loop: transport events, UI
//! commands, storage (cross-tab) notifications, visibility transitions,
//! and the four timers are selected over in a single task, so each
//! handler runs to completion before the next and no parallel mutation of
//! session state is possible. Channel handles are tagged with a
//! generation; a timer scheduled for a superseded generation is discarded
//! when it fires.

pub mod dedup;
pub mod heartbeat;
pub mod typing;

use std::pin::Pin;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::Sleep;
use uuid::Uuid;

use partyline_proto::event::{
    HeartbeatPing, InboundEvent, OutboundKind, ReplayRequest, TypingPresence,
};
use partyline_proto::message::{ChatMessage, RawMessage, Timestamp};

use crate::crosstab::{MarkerSync, SharedStorage, StorageEvent, store_recovery};
use crate::transport::{ChannelEvent, RoomChannel, RoomClient};
use crate::visibility::VisibilityGate;

use dedup::{Admission, Deduplicator};
use heartbeat::HeartbeatScheduler;
use typing::{LocalTyping, TypingEdge, TypingRoster};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed, no connection attempt yet.
    Idle,
    /// A fresh channel has been opened; waiting for readiness.
    Connecting,
    /// The transport reported readiness; room join is scheduled.
    Ready,
    /// The join call has been issued.
    Joining,
    /// Fully established; sends and presence are live.
    Joined,
    /// The connection was lost or the attempt failed.
    Closed,
    /// A retry is scheduled after a connection loss.
    Reconnecting,
}

impl SessionState {
    /// Whether no connection attempt is currently in flight.
    #[must_use]
    pub const fn is_disconnected(self) -> bool {
        matches!(self, Self::Idle | Self::Closed | Self::Reconnecting)
    }
}

/// The (room, nickname, icon) triple a session is mounted for.
#[derive(Debug, Clone)]
pub struct SessionParams {
    /// The room to join.
    pub room_id: String,
    /// The nickname to join under.
    pub nickname: String,
    /// Optional user icon reference.
    pub icon: Option<String>,
}

/// Timing and buffering knobs for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Grace period between transport readiness and the join call. The
    /// transport accepts writes slightly before it can reliably deliver
    /// them, so this delay is required behavior, not an optimization.
    pub join_grace: Duration,
    /// Delay before the single reconnect attempt after a connection loss.
    pub reconnect_delay: Duration,
    /// Keepalive cadence while joined.
    pub heartbeat_period: Duration,
    /// How long after the last keystroke typing is auto-announced false.
    pub typing_idle: Duration,
    /// Capacity of the session event channel.
    pub event_buffer: usize,
}

/// Default join grace period after readiness.
const DEFAULT_JOIN_GRACE: Duration = Duration::from_secs(1);

/// Default delay before the reconnect attempt.
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Default keepalive cadence.
const DEFAULT_HEARTBEAT_PERIOD: Duration = Duration::from_secs(30);

/// Default typing idle timeout.
const DEFAULT_TYPING_IDLE: Duration = Duration::from_secs(3);

/// Default event channel capacity.
const DEFAULT_EVENT_BUFFER: usize = 64;

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            join_grace: DEFAULT_JOIN_GRACE,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            heartbeat_period: DEFAULT_HEARTBEAT_PERIOD,
            typing_idle: DEFAULT_TYPING_IDLE,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

/// Commands sent from the UI layer to the session loop.
#[derive(Debug)]
pub enum SessionCommand {
    /// Send a chat message. No observable effect unless joined.
    SendMessage {
        /// The message text.
        body: String,
    },
    /// The input field changed; drives edge-triggered typing presence.
    InputChanged {
        /// The full current input text.
        text: String,
    },
    /// Explicitly announce typing presence (only transmitted while joined).
    SetTyping(bool),
    /// Tear the session down deterministically.
    Leave,
}

/// Classification of a surfaced error, determining the retry affordance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Client construction failed; non-recoverable for this mount.
    Fatal,
    /// Connection lost after being joined; a retry is scheduled.
    ConnectionLost,
    /// Join or create failed; the user must re-initiate.
    JoinFailure,
    /// A send failed; transient, connection state unaffected.
    SendFailure,
}

/// Events emitted by the session loop for the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The lifecycle state changed.
    StateChanged(SessionState),
    /// A message passed deduplication; append it to the conversation.
    MessageAdmitted(ChatMessage),
    /// The set of nicknames currently typing changed.
    TypingChanged(Vec<String>),
    /// The room join completed.
    RoomJoined {
        /// The joined room.
        room_id: String,
        /// The nickname joined under.
        nickname: String,
        /// The icon used, if any.
        icon: Option<String>,
    },
    /// A human-readable error to surface.
    Error {
        /// Display text.
        message: String,
        /// Retry-affordance classification.
        kind: ErrorKind,
    },
    /// The session tore down (explicit leave or UI unmount).
    Left,
}

/// A cancellable one-shot timer slot.
type TimerSlot = Option<Pin<Box<Sleep>>>;

/// What woke the session loop up.
enum Wakeup {
    Command(Option<SessionCommand>),
    Channel(Option<ChannelEvent>),
    Storage(StorageEvent),
    /// The storage subscription skipped notifications; advisory only.
    StorageGap,
    Visibility(bool),
    /// The join-grace timer fired; carries the generation it was armed for.
    JoinGrace(u64),
    ReconnectDelay,
    TypingIdle,
    Heartbeat,
}

/// Owns the transport channel and drives the session state machine.
pub struct SessionController<C: RoomClient, S: SharedStorage> {
    client: C,
    params: SessionParams,
    config: SessionConfig,

    state: SessionState,
    /// Attempt counter; invalidates timers armed for superseded channels.
    generation: u64,
    channel: Option<C::Channel>,
    /// Guards against a duplicate readiness signal scheduling two joins.
    join_scheduled: bool,

    dedup: Deduplicator,
    roster: TypingRoster,
    local_typing: LocalTyping,
    /// Highest non-system message timestamp observed this session.
    last_observed: u64,

    marker: MarkerSync<S>,
    storage_rx: broadcast::Receiver<StorageEvent>,
    visibility: VisibilityGate,
    heartbeat: HeartbeatScheduler,

    join_timer: Option<(u64, Pin<Box<Sleep>>)>,
    reconnect_timer: TimerSlot,
    typing_idle_timer: TimerSlot,

    cmd_rx: mpsc::Receiver<SessionCommand>,
    event_tx: mpsc::Sender<SessionEvent>,
}

async fn poll_channel<Ch: RoomChannel>(channel: &mut Option<Ch>) -> Option<ChannelEvent> {
    match channel.as_mut() {
        Some(ch) => ch.next_event().await,
        None => std::future::pending().await,
    }
}

async fn wait_slot(slot: &mut TimerSlot) {
    match slot.as_mut() {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn wait_join_timer(slot: &mut Option<(u64, Pin<Box<Sleep>>)>) {
    match slot.as_mut() {
        Some((_, sleep)) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

impl<C: RoomClient, S: SharedStorage> SessionController<C, S> {
    /// Creates a controller for the given (room, nickname, icon) triple.
    ///
    /// Returns the controller plus the command sender and event receiver
    /// the UI layer holds. Call [`run`](Self::run) (usually via
    /// [`spawn`](Self::spawn)) to start the loop.
    pub fn new(
        client: C,
        storage: S,
        visibility: VisibilityGate,
        params: SessionParams,
        config: SessionConfig,
    ) -> (
        Self,
        mpsc::Sender<SessionCommand>,
        mpsc::Receiver<SessionEvent>,
    ) {
        let (cmd_tx, cmd_rx) = mpsc::channel(config.event_buffer);
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer);
        let marker = MarkerSync::new(storage, params.room_id.clone());
        let storage_rx = marker.subscribe();
        let heartbeat = HeartbeatScheduler::new(config.heartbeat_period);

        let controller = Self {
            client,
            params,
            config,
            state: SessionState::Idle,
            generation: 0,
            channel: None,
            join_scheduled: false,
            dedup: Deduplicator::new(),
            roster: TypingRoster::new(),
            local_typing: LocalTyping::new(),
            last_observed: 0,
            marker,
            storage_rx,
            visibility,
            heartbeat,
            join_timer: None,
            reconnect_timer: None,
            typing_idle_timer: None,
            cmd_rx,
            event_tx,
        };
        (controller, cmd_tx, event_rx)
    }

    /// Convenience: create a controller and run it on a spawned task.
    pub fn spawn(
        client: C,
        storage: S,
        visibility: VisibilityGate,
        params: SessionParams,
        config: SessionConfig,
    ) -> (
        mpsc::Sender<SessionCommand>,
        mpsc::Receiver<SessionEvent>,
    ) {
        let (controller, cmd_tx, event_rx) = Self::new(client, storage, visibility, params, config);
        tokio::spawn(controller.run());
        (cmd_tx, event_rx)
    }

    /// Runs the session loop until `Leave` or the command channel closes.
    pub async fn run(mut self) {
        self.open_channel().await;

        loop {
            let wakeup = self.next_wakeup().await;
            match wakeup {
                Wakeup::Command(None | Some(SessionCommand::Leave)) => {
                    self.teardown().await;
                    break;
                }
                Wakeup::Command(Some(SessionCommand::SendMessage { body })) => {
                    self.on_send_message(body).await;
                }
                Wakeup::Command(Some(SessionCommand::InputChanged { text })) => {
                    self.on_input_changed(&text);
                }
                Wakeup::Command(Some(SessionCommand::SetTyping(is_typing))) => {
                    self.announce_typing(is_typing);
                }
                Wakeup::Channel(event) => self.on_channel_event(event).await,
                Wakeup::Storage(event) => self.on_storage_event(&event).await,
                Wakeup::StorageGap => {}
                Wakeup::Visibility(foreground) => self.on_visibility(foreground).await,
                Wakeup::JoinGrace(generation) => self.on_join_grace(generation).await,
                Wakeup::ReconnectDelay => self.on_reconnect_delay().await,
                Wakeup::TypingIdle => self.on_typing_idle(),
                Wakeup::Heartbeat => self.on_heartbeat(),
            }
        }
    }

    async fn next_wakeup(&mut self) -> Wakeup {
        let channel = &mut self.channel;
        let cmd_rx = &mut self.cmd_rx;
        let storage_rx = &mut self.storage_rx;
        let visibility = &mut self.visibility;
        let join_timer = &mut self.join_timer;
        let reconnect_timer = &mut self.reconnect_timer;
        let typing_idle_timer = &mut self.typing_idle_timer;
        let heartbeat = &mut self.heartbeat;

        tokio::select! {
            cmd = cmd_rx.recv() => Wakeup::Command(cmd),
            event = poll_channel(channel) => Wakeup::Channel(event),
            update = storage_rx.recv() => match update {
                Ok(event) => Wakeup::Storage(event),
                Err(_) => Wakeup::StorageGap,
            },
            foreground = visibility.changed() => Wakeup::Visibility(foreground),
            () = wait_join_timer(join_timer) => {
                let generation = join_timer.take().map_or(0, |(generation, _)| generation);
                Wakeup::JoinGrace(generation)
            }
            () = wait_slot(reconnect_timer) => {
                *reconnect_timer = None;
                Wakeup::ReconnectDelay
            }
            () = wait_slot(typing_idle_timer) => {
                *typing_idle_timer = None;
                Wakeup::TypingIdle
            }
            () = heartbeat.tick() => Wakeup::Heartbeat,
        }
    }

    async fn set_state(&mut self, state: SessionState) {
        if self.state == state {
            return;
        }
        tracing::debug!(from = ?self.state, to = ?state, "session state changed");
        self.state = state;
        self.emit(SessionEvent::StateChanged(state)).await;
    }

    async fn emit(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event).await;
    }

    async fn surface_error(&self, message: String, kind: ErrorKind) {
        tracing::warn!(?kind, %message, "session error");
        self.emit(SessionEvent::Error { message, kind }).await;
    }

    /// Opens a fresh channel, discarding any previous one. A channel is
    /// never reused after close; the transport does not support it.
    async fn open_channel(&mut self) {
        self.reconnect_timer = None;
        self.join_timer = None;
        self.join_scheduled = false;
        self.heartbeat.disarm();
        self.channel = None;
        self.generation += 1;
        self.set_state(SessionState::Connecting).await;

        match self.client.connect() {
            Ok(channel) => {
                tracing::info!(generation = self.generation, "transport channel opened");
                self.channel = Some(channel);
            }
            Err(e) => {
                self.surface_error(
                    format!("failed to initialize chat client: {e}"),
                    ErrorKind::Fatal,
                )
                .await;
                self.set_state(SessionState::Closed).await;
            }
        }
    }

    async fn on_channel_event(&mut self, event: Option<ChannelEvent>) {
        match event {
            // A vanished event stream is indistinguishable from a close.
            None | Some(ChannelEvent::Closed) => self.on_closed().await,
            Some(ChannelEvent::Ready) => self.on_ready().await,
            Some(ChannelEvent::Inbound(inbound)) => self.on_inbound(inbound).await,
            Some(ChannelEvent::Error(message)) => self.on_transport_error(message).await,
        }
    }

    async fn on_ready(&mut self) {
        if self.join_scheduled {
            tracing::debug!("duplicate readiness signal ignored");
            return;
        }
        self.set_state(SessionState::Ready).await;
        self.join_scheduled = true;
        self.join_timer = Some((
            self.generation,
            Box::pin(tokio::time::sleep(self.config.join_grace)),
        ));
    }

    /// Issues the delayed room join for the given channel generation.
    async fn on_join_grace(&mut self, generation: u64) {
        if generation != self.generation || self.channel.is_none() {
            tracing::debug!(generation, current = self.generation, "stale join timer discarded");
            return;
        }
        self.set_state(SessionState::Joining).await;

        let room_id = self.params.room_id.clone();
        let nickname = self.params.nickname.clone();
        let icon = self.params.icon.clone();

        {
            let Some(channel) = self.channel.as_ref() else {
                return;
            };
            if let Err(e) = channel.join_room(&nickname, &room_id, icon.as_deref()) {
                self.surface_error(format!("failed to join room: {e}"), ErrorKind::JoinFailure)
                    .await;
                self.channel = None;
                self.join_scheduled = false;
                self.set_state(SessionState::Closed).await;
                return;
            }

            // Recover whatever this tab missed while disconnected.
            let replay = ReplayRequest {
                room_id: room_id.clone(),
                timestamp: self.last_observed,
            };
            if let Err(e) = channel.send(OutboundKind::GetMessages, &replay) {
                tracing::warn!(error = %e, "failed to request message replay");
            }
        }

        // Local system notice: admitted to the conversation, never sent.
        let notice = ChatMessage::system(format!("{nickname} joined the room"), Timestamp::now());
        self.admit(notice).await;

        self.set_state(SessionState::Joined).await;
        store_recovery(self.marker.storage(), &room_id, &nickname, icon.as_deref());
        self.emit(SessionEvent::RoomJoined {
            room_id,
            nickname,
            icon,
        })
        .await;
        self.heartbeat.arm();
    }

    async fn on_closed(&mut self) {
        tracing::info!(state = ?self.state, "transport channel closed");
        self.channel = None;
        self.join_scheduled = false;
        self.join_timer = None;
        self.heartbeat.disarm();
        self.set_state(SessionState::Closed).await;

        if self.visibility.is_foreground() {
            self.surface_error(
                "connection to the chat room was closed".to_string(),
                ErrorKind::ConnectionLost,
            )
            .await;
            self.set_state(SessionState::Reconnecting).await;
            self.reconnect_timer = Some(Box::pin(tokio::time::sleep(self.config.reconnect_delay)));
        }
        // Backgrounded: no error surfaced, no retry until visibility returns.
    }

    async fn on_reconnect_delay(&mut self) {
        if self.visibility.is_foreground() {
            tracing::info!("reconnect timer fired, reopening channel");
            self.open_channel().await;
        } else {
            // Attempt dropped; deferred to visibility-restore or a
            // cross-tab marker update.
            tracing::debug!("reconnect attempt dropped while backgrounded");
        }
    }

    async fn on_transport_error(&mut self, message: String) {
        // Errors do not retry by themselves; retry is driven only by the
        // close path, which prevents immediate retry storms.
        let kind = if self.state == SessionState::Joined {
            ErrorKind::ConnectionLost
        } else {
            ErrorKind::JoinFailure
        };
        self.surface_error(format!("transport error: {message}"), kind)
            .await;
    }

    async fn on_inbound(&mut self, event: InboundEvent) {
        match event {
            InboundEvent::ChatMessage(raw) => {
                let message = raw.normalize(Timestamp::now());
                self.admit(message).await;
            }
            InboundEvent::HistoricalMessages(batch) => {
                let arrival = Timestamp::now();
                for raw in batch {
                    self.admit(raw.normalize(arrival)).await;
                }
            }
            InboundEvent::TypingPresence(presence) => {
                if self.roster.apply(&presence.nickname, presence.is_typing) {
                    self.emit(SessionEvent::TypingChanged(self.roster.nicknames()))
                        .await;
                }
            }
            InboundEvent::Heartbeat => {
                tracing::debug!("heartbeat echo received");
            }
            InboundEvent::UserList => {
                tracing::debug!("user list snapshot ignored");
            }
            InboundEvent::Unknown(kind) => {
                tracing::debug!(%kind, "unrecognized event ignored");
            }
        }
    }

    /// Offers a normalized message for admission; duplicates are dropped
    /// silently and accepted non-system messages advance the cross-tab
    /// marker.
    async fn admit(&mut self, message: ChatMessage) {
        if self.dedup.admit(&message) == Admission::Duplicate {
            return;
        }
        if !message.is_system_message {
            let ts = message.timestamp.as_millis();
            if ts > self.last_observed {
                self.last_observed = ts;
                self.marker.publish(ts);
            }
        }
        self.emit(SessionEvent::MessageAdmitted(message)).await;
    }

    async fn on_storage_event(&mut self, event: &StorageEvent) {
        let Some(ts) = self.marker.external_update(event) else {
            return;
        };
        if ts <= self.last_observed {
            return;
        }
        // Another tab is receiving traffic this tab is missing. The marker
        // is an advisory trigger only; the watermark advances when the
        // messages themselves are admitted, so the replay request issued on
        // rejoin still covers everything from the last admitted message on.
        if self.state.is_disconnected() && self.visibility.is_foreground() {
            tracing::info!(marker = ts, "another tab is ahead, reconnecting");
            self.open_channel().await;
        }
    }

    async fn on_visibility(&mut self, foreground: bool) {
        tracing::debug!(foreground, "visibility changed");
        if foreground && self.state.is_disconnected() && self.state != SessionState::Idle {
            self.open_channel().await;
        }
    }

    async fn on_send_message(&mut self, body: String) {
        if self.state != SessionState::Joined || self.channel.is_none() {
            tracing::debug!(state = ?self.state, "send ignored, session not joined");
            return;
        }

        let timestamp = Timestamp::now();
        let message = RawMessage {
            body,
            user_nickname: Some(self.params.nickname.clone()),
            user_icon: self.params.icon.clone(),
            timestamp: Some(timestamp.as_millis()),
            perm_id: format!(
                "{}-{}-{}",
                self.params.nickname,
                timestamp.as_millis(),
                Uuid::now_v7().simple()
            ),
            is_system_message: false,
        };

        // Sent to the server only; every tab (this one included) admits
        // the server's echo, so all tabs converge on the same sequence.
        let send_result = self
            .channel
            .as_ref()
            .map(|channel| channel.send(OutboundKind::SendMessage, &message));
        if let Some(Err(e)) = send_result {
            self.surface_error(format!("failed to send message: {e}"), ErrorKind::SendFailure)
                .await;
        }

        // Sending clears this tab's typing flag.
        self.typing_idle_timer = None;
        if self.local_typing.stop() {
            self.announce_typing(false);
        }
    }

    fn on_input_changed(&mut self, text: &str) {
        match self.local_typing.on_input(text) {
            TypingEdge::AnnounceTyping => {
                self.announce_typing(true);
                self.arm_typing_idle();
            }
            TypingEdge::Keystroke => self.arm_typing_idle(),
            TypingEdge::AnnounceStopped => {
                self.announce_typing(false);
                self.typing_idle_timer = None;
            }
            TypingEdge::Idle => {}
        }
    }

    fn arm_typing_idle(&mut self) {
        self.typing_idle_timer = Some(Box::pin(tokio::time::sleep(self.config.typing_idle)));
    }

    fn on_typing_idle(&mut self) {
        if self.local_typing.stop() {
            self.announce_typing(false);
        }
    }

    /// Transmits a typing-presence change; only meaningful while joined.
    fn announce_typing(&self, is_typing: bool) {
        if self.state != SessionState::Joined {
            return;
        }
        let Some(channel) = self.channel.as_ref() else {
            return;
        };
        let presence = TypingPresence {
            nickname: self.params.nickname.clone(),
            is_typing,
        };
        if let Err(e) = channel.send(OutboundKind::SetTypingPresence, &presence) {
            tracing::warn!(error = %e, "failed to send typing status");
        }
    }

    fn on_heartbeat(&self) {
        if self.state != SessionState::Joined {
            return;
        }
        let Some(channel) = self.channel.as_ref() else {
            return;
        };
        let ping = HeartbeatPing {
            timestamp: Timestamp::now().as_millis(),
            nickname: self.params.nickname.clone(),
        };
        if let Err(e) = channel.send(OutboundKind::Heartbeat, &ping) {
            tracing::warn!(error = %e, "failed to send heartbeat");
        }
    }

    /// Deterministic teardown: cancel every pending timer and release the
    /// channel handle. No protocol-level close exists.
    async fn teardown(&mut self) {
        tracing::info!("session tearing down");
        self.join_timer = None;
        self.reconnect_timer = None;
        self.typing_idle_timer = None;
        self.heartbeat.disarm();
        self.channel = None;
        self.roster.clear();
        self.emit(SessionEvent::Left).await;
    }
}
