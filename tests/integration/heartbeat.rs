// Test-specific lint overrides: integration tests use unwrap/expect freely.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_panics_doc,
    clippy::missing_docs_in_private_items
)]

//! Keepalive transmission: a joined session pings the server on a fixed
//! cadence, goes quiet when the connection closes, and resumes after a
//! rejoin.

mod common;

use std::time::Duration;

use partyline::crosstab::MemoryStorage;
use partyline::lobby::{self, LobbyConfig};
use partyline::session::SessionState;
use partyline::transport::loopback::LoopbackHub;

async fn create_room(hub: &LoopbackHub, storage: &MemoryStorage) -> String {
    let tab = storage.tab();
    lobby::create_room(&hub.client(), &tab, "Host", None, &LobbyConfig::default())
        .await
        .expect("room creation failed")
}

#[tokio::test(start_paused = true)]
async fn joined_session_pings_on_cadence() {
    let hub = LoopbackHub::new();
    let storage = MemoryStorage::new();
    let room_id = create_room(&hub, &storage).await;

    let mut alice = common::mount_tab(&hub, &storage, &room_id, "Alice");
    common::wait_for_joined(&mut alice.events).await;

    // Nothing before the first full period elapses.
    common::drain_for(&mut alice.events, Duration::from_secs(25)).await;
    assert!(
        hub.heartbeats(&room_id).is_empty(),
        "ping sent before the first period"
    );

    // 65 s after the join covers the ticks at 30 s and 60 s.
    common::drain_for(&mut alice.events, Duration::from_secs(40)).await;
    let pings = hub.heartbeats(&room_id);
    assert_eq!(pings.len(), 2, "expected two pings, got {pings:?}");
    assert!(pings.iter().all(|p| p.nickname == "Alice"));
}

#[tokio::test(start_paused = true)]
async fn heartbeats_stop_on_close_and_resume_after_rejoin() {
    let hub = LoopbackHub::new();
    let storage = MemoryStorage::new();
    let room_id = create_room(&hub, &storage).await;

    let mut alice = common::mount_tab(&hub, &storage, &room_id, "Alice");
    common::wait_for_joined(&mut alice.events).await;

    common::drain_for(&mut alice.events, Duration::from_secs(35)).await;
    assert_eq!(hub.heartbeats(&room_id).len(), 1);

    // Backgrounded so the close schedules no retry; the session stays
    // disconnected for as long as the test needs.
    alice.visibility.set_foreground(false);
    tokio::time::sleep(Duration::from_millis(50)).await;
    alice.client.sever();
    common::wait_for_state(&mut alice.events, SessionState::Closed).await;

    // Several periods pass without a connection; no pings arrive.
    common::drain_for(&mut alice.events, Duration::from_secs(95)).await;
    assert_eq!(
        hub.heartbeats(&room_id).len(),
        1,
        "ping sent while disconnected"
    );

    // Foregrounding rejoins and restarts the cadence.
    alice.visibility.set_foreground(true);
    common::wait_for_joined(&mut alice.events).await;
    common::drain_for(&mut alice.events, Duration::from_secs(35)).await;
    assert_eq!(hub.heartbeats(&room_id).len(), 2);
}
