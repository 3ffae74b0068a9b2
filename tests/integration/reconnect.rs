// Test-specific lint overrides: integration tests use unwrap/expect freely.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_panics_doc,
    clippy::missing_docs_in_private_items
)]

//! Connection-loss handling.
//!
//! A severed foreground session surfaces an error, schedules one delayed
//! retry, and on rejoin replays whatever the room saw while it was away.
//! A backgrounded session stays silently closed until the tab is
//! foregrounded again; a retry timer that fires while backgrounded is
//! dropped rather than deferred.

mod common;

use std::time::Duration;

use partyline::crosstab::MemoryStorage;
use partyline::lobby::{self, LobbyConfig};
use partyline::session::{ErrorKind, SessionCommand, SessionEvent, SessionState};
use partyline::transport::loopback::LoopbackHub;

async fn create_room(hub: &LoopbackHub, storage: &MemoryStorage) -> String {
    let tab = storage.tab();
    lobby::create_room(&hub.client(), &tab, "Host", None, &LobbyConfig::default())
        .await
        .expect("room creation failed")
}

#[tokio::test(start_paused = true)]
async fn foreground_close_surfaces_error_and_rejoins_with_replay() {
    let hub = LoopbackHub::new();
    let storage = MemoryStorage::new();
    let room_id = create_room(&hub, &storage).await;

    let mut alice = common::mount_tab(&hub, &storage, &room_id, "Alice");
    common::wait_for_joined(&mut alice.events).await;

    alice.client.sever();
    common::wait_for_state(&mut alice.events, SessionState::Closed).await;
    let error = common::wait_for(&mut alice.events, "connection-lost error", |event| {
        matches!(event, SessionEvent::Error { .. })
    })
    .await;
    assert!(matches!(
        error,
        SessionEvent::Error {
            kind: ErrorKind::ConnectionLost,
            ..
        }
    ));
    common::wait_for_state(&mut alice.events, SessionState::Reconnecting).await;

    // Traffic arrives while Alice is away.
    let mut bob = common::mount_tab(&hub, &storage, &room_id, "Bob");
    common::wait_for_joined(&mut bob.events).await;
    bob.commands
        .send(SessionCommand::SendMessage {
            body: "posted while away".to_string(),
        })
        .await
        .unwrap();
    common::wait_for_message(&mut bob.events, "posted while away").await;

    // Alice rejoins and recovers the missed message through replay.
    common::wait_for_state(&mut alice.events, SessionState::Connecting).await;
    common::wait_for_joined(&mut alice.events).await;
    common::wait_for_message(&mut alice.events, "posted while away").await;

    let rest = common::drain_for(&mut alice.events, Duration::from_secs(2)).await;
    assert!(
        !common::admitted_bodies(&rest)
            .iter()
            .any(|b| b == "posted while away"),
        "replayed message admitted twice: {rest:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn background_close_stays_quiet_until_foregrounded() {
    let hub = LoopbackHub::new();
    let storage = MemoryStorage::new();
    let room_id = create_room(&hub, &storage).await;

    let mut alice = common::mount_tab(&hub, &storage, &room_id, "Alice");
    common::wait_for_joined(&mut alice.events).await;

    alice.visibility.set_foreground(false);
    tokio::time::sleep(Duration::from_millis(50)).await;
    alice.client.sever();

    common::wait_for_state(&mut alice.events, SessionState::Closed).await;

    // No error, no retry, no state churn while backgrounded.
    let quiet = common::drain_for(&mut alice.events, Duration::from_secs(20)).await;
    assert!(
        !quiet
            .iter()
            .any(|event| matches!(event, SessionEvent::Error { .. })),
        "error surfaced while backgrounded: {quiet:?}"
    );
    assert!(!common::saw_state(&quiet, SessionState::Reconnecting));
    assert!(!common::saw_state(&quiet, SessionState::Connecting));

    alice.visibility.set_foreground(true);
    common::wait_for_state(&mut alice.events, SessionState::Connecting).await;
    common::wait_for_joined(&mut alice.events).await;
}

#[tokio::test(start_paused = true)]
async fn retry_firing_while_backgrounded_is_dropped() {
    let hub = LoopbackHub::new();
    let storage = MemoryStorage::new();
    let room_id = create_room(&hub, &storage).await;

    let mut alice = common::mount_tab(&hub, &storage, &room_id, "Alice");
    common::wait_for_joined(&mut alice.events).await;

    alice.client.sever();
    common::wait_for_state(&mut alice.events, SessionState::Reconnecting).await;

    // Background the tab before the retry timer elapses.
    alice.visibility.set_foreground(false);
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Well past the retry delay: the fired timer must not reconnect.
    let quiet = common::drain_for(&mut alice.events, Duration::from_secs(30)).await;
    assert!(
        !common::saw_state(&quiet, SessionState::Connecting),
        "backgrounded retry reconnected: {quiet:?}"
    );

    alice.visibility.set_foreground(true);
    common::wait_for_state(&mut alice.events, SessionState::Connecting).await;
    common::wait_for_joined(&mut alice.events).await;
}
