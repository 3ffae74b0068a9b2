// Test-specific lint overrides: integration tests use unwrap/expect freely.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_panics_doc,
    clippy::missing_docs_in_private_items
)]

//! The room-creation flow: happy path, recovery-key persistence, the two
//! timeout races, and joining the room that was just created.

mod common;

use std::time::Duration;

use partyline::crosstab::{MemoryStorage, RecoveredSession, load_recovery};
use partyline::lobby::{self, LobbyConfig, LobbyError};
use partyline::session::SessionEvent;
use partyline::transport::loopback::LoopbackHub;

#[tokio::test(start_paused = true)]
async fn create_room_returns_id_and_persists_recovery() {
    let hub = LoopbackHub::new();
    let storage = MemoryStorage::new();
    let tab = storage.tab();

    let room_id = lobby::create_room(
        &hub.client(),
        &tab,
        "Alice",
        Some("icon-7"),
        &LobbyConfig::default(),
    )
    .await
    .expect("room creation failed");

    assert!(!room_id.is_empty());
    assert!(hub.history(&room_id).is_empty());
    assert_eq!(
        load_recovery(&tab),
        Some(RecoveredSession {
            room_id,
            nickname: "Alice".to_string(),
            icon: Some("icon-7".to_string()),
        })
    );
}

#[tokio::test(start_paused = true)]
async fn slow_readiness_times_out() {
    let hub = LoopbackHub::new();
    let storage = MemoryStorage::new();
    let tab = storage.tab();
    hub.set_ready_delay(Duration::from_secs(30));

    let result = lobby::create_room(&hub.client(), &tab, "Alice", None, &LobbyConfig::default())
        .await;
    assert!(matches!(result, Err(LobbyError::ReadyTimeout(_))));

    // A failed creation leaves no recovery keys behind.
    assert_eq!(load_recovery(&tab), None);
}

#[tokio::test(start_paused = true)]
async fn slow_create_call_times_out() {
    let hub = LoopbackHub::new();
    let storage = MemoryStorage::new();
    let tab = storage.tab();
    hub.set_create_delay(Duration::from_secs(30));

    let result = lobby::create_room(&hub.client(), &tab, "Alice", None, &LobbyConfig::default())
        .await;
    assert!(matches!(result, Err(LobbyError::CreateTimeout(_))));
}

#[tokio::test(start_paused = true)]
async fn connection_closing_before_readiness_fails_fast() {
    let hub = LoopbackHub::new();
    let storage = MemoryStorage::new();
    let tab = storage.tab();
    hub.set_ready_delay(Duration::from_secs(3600));

    let client = hub.client();
    let saboteur = client.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        saboteur.sever();
    });

    let started = tokio::time::Instant::now();
    let result = lobby::create_room(&client, &tab, "Alice", None, &LobbyConfig::default()).await;
    assert!(matches!(result, Err(LobbyError::ClosedBeforeReady)));
    assert!(
        started.elapsed() < Duration::from_secs(15),
        "close was not observed until the timeout"
    );
}

#[tokio::test(start_paused = true)]
async fn created_room_is_joinable() {
    let hub = LoopbackHub::new();
    let storage = MemoryStorage::new();
    let tab = storage.tab();

    let room_id = lobby::create_room(&hub.client(), &tab, "Alice", None, &LobbyConfig::default())
        .await
        .expect("room creation failed");

    let mut alice = common::mount_tab(&hub, &storage, &room_id, "Alice");
    let joined = common::wait_for(&mut alice.events, "RoomJoined", |event| {
        matches!(event, SessionEvent::RoomJoined { .. })
    })
    .await;
    match joined {
        SessionEvent::RoomJoined {
            room_id: joined_room,
            nickname,
            ..
        } => {
            assert_eq!(joined_room, room_id);
            assert_eq!(nickname, "Alice");
        }
        _ => unreachable!(),
    }
}
