//! Cross-tab coordination over a shared key-value channel.
//!
//! Every tab of the same origin sees the same [`SharedStorage`]. Tabs
//! publish the highest message timestamp they have observed under a
//! per-room marker key; other tabs receive a push notification for each
//! write and use it as an advisory freshness signal. Writes are monotonic
//! per tab and last-writer-wins across tabs, so no locking is needed.
//!
//! The same storage also carries the session-recovery keys the UI reads
//! once at start to offer a rejoin.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Key under which a tab's last room id is remembered.
pub const KEY_LAST_ROOM_ID: &str = "lastRoomId";
/// Key under which a tab's last nickname is remembered.
pub const KEY_LAST_NICKNAME: &str = "lastNickname";
/// Key under which a tab's last icon is remembered.
pub const KEY_LAST_ICON: &str = "lastUserIcon";

/// Capacity of the storage notification channel.
const STORAGE_EVENT_CAPACITY: usize = 64;

/// Identifies one tab (one storage handle) so receivers can ignore their
/// own writes, mirroring how browser storage events fire only in *other*
/// tabs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TabId(Uuid);

impl TabId {
    fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

/// One observed write to the shared storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    /// The key that was written.
    pub key: String,
    /// The new value.
    pub value: String,
    /// The tab that performed the write.
    pub writer: TabId,
}

/// A tab-visible key-value channel with push notification of writes.
///
/// The production implementation wraps the browser's origin-scoped
/// storage; [`MemoryStorage`] provides the in-process equivalent.
pub trait SharedStorage: Send + Sync + 'static {
    /// Writes `value` under `key`, notifying all subscribers.
    fn set(&self, key: &str, value: &str);

    /// Reads the current value under `key`.
    fn get(&self, key: &str) -> Option<String>;

    /// The identity of this tab's handle; events whose `writer` equals
    /// this id originate from this tab and must be ignored by it.
    fn tab_id(&self) -> TabId;

    /// Subscribes to write notifications from all tabs (own included;
    /// filter with [`SharedStorage::tab_id`]).
    fn subscribe(&self) -> broadcast::Receiver<StorageEvent>;
}

struct MemoryShared {
    map: RwLock<HashMap<String, String>>,
    tx: broadcast::Sender<StorageEvent>,
}

/// In-process shared storage; [`MemoryStorage::tab`] hands out per-tab
/// handles over the same underlying map.
#[derive(Clone)]
pub struct MemoryStorage {
    shared: Arc<MemoryShared>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    /// Creates an empty shared store.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(STORAGE_EVENT_CAPACITY);
        Self {
            shared: Arc::new(MemoryShared {
                map: RwLock::new(HashMap::new()),
                tx,
            }),
        }
    }

    /// Opens a handle representing one tab of this origin.
    #[must_use]
    pub fn tab(&self) -> TabStorage {
        TabStorage {
            shared: Arc::clone(&self.shared),
            id: TabId::new(),
        }
    }
}

/// One tab's handle onto a [`MemoryStorage`].
#[derive(Clone)]
pub struct TabStorage {
    shared: Arc<MemoryShared>,
    id: TabId,
}

impl SharedStorage for TabStorage {
    fn set(&self, key: &str, value: &str) {
        self.shared
            .map
            .write()
            .insert(key.to_string(), value.to_string());
        let _ = self.shared.tx.send(StorageEvent {
            key: key.to_string(),
            value: value.to_string(),
            writer: self.id,
        });
    }

    fn get(&self, key: &str) -> Option<String> {
        self.shared.map.read().get(key).cloned()
    }

    fn tab_id(&self) -> TabId {
        self.id
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.shared.tx.subscribe()
    }
}

/// The cross-tab marker key for a room.
#[must_use]
pub fn marker_key(room_id: &str) -> String {
    format!("{room_id}-lastMessageTimestamp")
}

/// Publishes and interprets the per-room freshness marker for one tab.
pub struct MarkerSync<S: SharedStorage> {
    storage: S,
    room_id: String,
    /// Highest value this tab has written; writes below it are skipped.
    last_written: u64,
}

impl<S: SharedStorage> MarkerSync<S> {
    /// Creates a marker publisher for `room_id`.
    pub fn new(storage: S, room_id: impl Into<String>) -> Self {
        Self {
            storage,
            room_id: room_id.into(),
            last_written: 0,
        }
    }

    /// Publishes `timestamp_millis` if it exceeds the last value this tab
    /// wrote. Values are decimal strings of milliseconds.
    pub fn publish(&mut self, timestamp_millis: u64) {
        if timestamp_millis <= self.last_written {
            return;
        }
        self.last_written = timestamp_millis;
        self.storage
            .set(&marker_key(&self.room_id), &timestamp_millis.to_string());
    }

    /// Interprets a storage event as an external marker update for this
    /// room. Returns the published timestamp when the event is another
    /// tab's write to this room's marker key; `None` otherwise.
    #[must_use]
    pub fn external_update(&self, event: &StorageEvent) -> Option<u64> {
        if event.writer == self.storage.tab_id() || event.key != marker_key(&self.room_id) {
            return None;
        }
        event.value.parse().ok()
    }

    /// Subscribes to the underlying storage notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.storage.subscribe()
    }

    /// The underlying storage handle.
    pub fn storage(&self) -> &S {
        &self.storage
    }
}

/// The identity a previous session left behind, offered for rejoin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveredSession {
    /// The last room joined or created.
    pub room_id: String,
    /// The nickname used.
    pub nickname: String,
    /// The icon used, if any.
    pub icon: Option<String>,
}

/// Reads the session-recovery keys. Returns `None` unless both a room id
/// and a nickname are present.
#[must_use]
pub fn load_recovery<S: SharedStorage>(storage: &S) -> Option<RecoveredSession> {
    let room_id = storage.get(KEY_LAST_ROOM_ID)?;
    let nickname = storage.get(KEY_LAST_NICKNAME)?;
    Some(RecoveredSession {
        room_id,
        nickname,
        icon: storage.get(KEY_LAST_ICON),
    })
}

/// Writes the session-recovery keys after a successful join or create.
pub fn store_recovery<S: SharedStorage>(
    storage: &S,
    room_id: &str,
    nickname: &str,
    icon: Option<&str>,
) {
    storage.set(KEY_LAST_ROOM_ID, room_id);
    storage.set(KEY_LAST_NICKNAME, nickname);
    if let Some(icon) = icon {
        storage.set(KEY_LAST_ICON, icon);
    }
}
