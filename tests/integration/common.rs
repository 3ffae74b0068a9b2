//! Shared fixtures for the session integration tests: mounting a tab (a
//! session wired to the loopback hub, an in-memory storage handle, and a
//! controllable visibility signal) and waiting on its event stream.

#![allow(dead_code)]

use std::time::Duration;

use tokio::sync::mpsc;

use partyline::crosstab::{MemoryStorage, TabStorage};
use partyline::session::{
    SessionCommand, SessionConfig, SessionController, SessionEvent, SessionParams, SessionState,
};
use partyline::transport::loopback::{LoopbackClient, LoopbackHub};
use partyline::visibility::{VisibilityPublisher, visibility_channel};

use partyline_proto::message::ChatMessage;

/// How long `wait_for` is willing to wait. Generous because the paused
/// test clock auto-advances past it only on genuine failure.
const WAIT_TIMEOUT: Duration = Duration::from_secs(120);

/// Installs a per-process subscriber so `RUST_LOG` works under test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// One mounted tab: a running session plus the handles a test drives it
/// through.
pub struct Tab {
    pub commands: mpsc::Sender<SessionCommand>,
    pub events: mpsc::Receiver<SessionEvent>,
    pub visibility: VisibilityPublisher,
    /// The same storage handle the session writes through.
    pub storage: TabStorage,
    /// A clone of the client the session connects through; severing it
    /// severs the session's channels.
    pub client: LoopbackClient,
}

/// Mounts a foregrounded tab for `nickname` in `room_id`.
pub fn mount_tab(hub: &LoopbackHub, storage: &MemoryStorage, room_id: &str, nickname: &str) -> Tab {
    mount_tab_with(hub, storage, room_id, nickname, true)
}

/// Mounts a tab with explicit initial visibility.
pub fn mount_tab_with(
    hub: &LoopbackHub,
    storage: &MemoryStorage,
    room_id: &str,
    nickname: &str,
    foreground: bool,
) -> Tab {
    init_tracing();
    let (publisher, gate) = visibility_channel(foreground);
    let tab_storage = storage.tab();
    let client = hub.client();
    let params = SessionParams {
        room_id: room_id.to_string(),
        nickname: nickname.to_string(),
        icon: None,
    };
    let (commands, events) = SessionController::spawn(
        client.clone(),
        tab_storage.clone(),
        gate,
        params,
        SessionConfig::default(),
    );
    Tab {
        commands,
        events,
        visibility: publisher,
        storage: tab_storage,
        client,
    }
}

/// Waits for the first event matching `pred`, skipping non-matching ones.
/// Panics with `description` on timeout or channel close.
pub async fn wait_for<F>(
    events: &mut mpsc::Receiver<SessionEvent>,
    description: &str,
    pred: F,
) -> SessionEvent
where
    F: Fn(&SessionEvent) -> bool,
{
    let matching = async {
        loop {
            match events.recv().await {
                Some(event) if pred(&event) => return event,
                Some(_) => {}
                None => panic!("event channel closed while waiting for {description}"),
            }
        }
    };
    match tokio::time::timeout(WAIT_TIMEOUT, matching).await {
        Ok(event) => event,
        Err(_) => panic!("timeout waiting for {description}"),
    }
}

/// Waits for a specific state transition.
pub async fn wait_for_state(events: &mut mpsc::Receiver<SessionEvent>, state: SessionState) {
    wait_for(events, &format!("StateChanged({state:?})"), |event| {
        matches!(event, SessionEvent::StateChanged(s) if *s == state)
    })
    .await;
}

/// Waits until the session reports it is fully joined.
pub async fn wait_for_joined(events: &mut mpsc::Receiver<SessionEvent>) {
    wait_for_state(events, SessionState::Joined).await;
}

/// Waits for an admitted message with the given body.
pub async fn wait_for_message(events: &mut mpsc::Receiver<SessionEvent>, body: &str) -> ChatMessage {
    let event = wait_for(events, &format!("message {body:?}"), |event| {
        matches!(event, SessionEvent::MessageAdmitted(m) if m.body == body)
    })
    .await;
    match event {
        SessionEvent::MessageAdmitted(message) => message,
        _ => unreachable!(),
    }
}

/// Collects every event that arrives within `window` of quiet time.
pub async fn drain_for(
    events: &mut mpsc::Receiver<SessionEvent>,
    window: Duration,
) -> Vec<SessionEvent> {
    let mut collected = Vec::new();
    let deadline = tokio::time::Instant::now() + window;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, events.recv()).await {
            Ok(Some(event)) => collected.push(event),
            Ok(None) | Err(_) => break,
        }
    }
    collected
}

/// The bodies of all admitted messages in `events`, in order.
pub fn admitted_bodies(events: &[SessionEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            SessionEvent::MessageAdmitted(message) => Some(message.body.clone()),
            _ => None,
        })
        .collect()
}

/// Whether `events` contains a transition to `state`.
pub fn saw_state(events: &[SessionEvent], state: SessionState) -> bool {
    events
        .iter()
        .any(|event| matches!(event, SessionEvent::StateChanged(s) if *s == state))
}
