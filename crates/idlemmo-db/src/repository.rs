//! The repository seam between sessions and storage
//!
//! Saves overwrite the whole snapshot. A load distinguishes "no snapshot"
//! (`Ok(None)`) from a storage failure (`Err`); the session treats both as a
//! new player.

use crate::error::{Error, Result};
use crate::store::Store;
use async_trait::async_trait;
use idlemmo_core::{PlayerId, PlayerSnapshot};
use indexmap::IndexMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Snapshot storage
#[async_trait]
pub trait Repository: Send + Sync {
    /// Store `snapshot`, replacing whatever was saved for the same player
    async fn save(&self, snapshot: &PlayerSnapshot) -> Result<()>;

    /// Fetch the last saved snapshot for `player`
    async fn load(&self, player: &PlayerId) -> Result<Option<PlayerSnapshot>>;
}

/// In-process repository used by tests and the demo
///
/// Failures and load latency can be injected to exercise the session's
/// fallback paths.
#[derive(Default)]
pub struct MemoryRepository {
    players: Mutex<IndexMap<PlayerId, PlayerSnapshot>>,
    fail_saves: AtomicBool,
    fail_loads: AtomicBool,
    load_delay: Mutex<Option<Duration>>,
    saves: AtomicUsize,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent save fail
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent load fail
    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    /// Delay every subsequent load
    pub fn set_load_delay(&self, delay: Option<Duration>) {
        if let Ok(mut d) = self.load_delay.lock() {
            *d = delay;
        }
    }

    /// Insert a snapshot directly, bypassing the save counter
    pub fn insert(&self, snapshot: PlayerSnapshot) {
        if let Ok(mut players) = self.players.lock() {
            players.insert(snapshot.player_id.clone(), snapshot);
        }
    }

    /// Current stored snapshot, read synchronously
    pub fn get(&self, player: &PlayerId) -> Option<PlayerSnapshot> {
        self.players.lock().ok()?.get(player).cloned()
    }

    /// Number of successful saves so far
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn poisoned() -> Error {
        Error::Unavailable("memory repository lock poisoned".to_string())
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn save(&self, snapshot: &PlayerSnapshot) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(Error::Unavailable("save rejected".to_string()));
        }
        let mut players = self.players.lock().map_err(|_| Self::poisoned())?;
        players.insert(snapshot.player_id.clone(), snapshot.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load(&self, player: &PlayerId) -> Result<Option<PlayerSnapshot>> {
        let delay = *self.load_delay.lock().map_err(|_| Self::poisoned())?;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(Error::Unavailable("load rejected".to_string()));
        }
        let players = self.players.lock().map_err(|_| Self::poisoned())?;
        Ok(players.get(player).cloned())
    }
}

/// Repository backed by an embedded native_db [`Store`]
///
/// Store calls are synchronous, so each one runs on tokio's blocking pool.
#[derive(Clone)]
pub struct NativeDbRepository {
    store: Arc<Store>,
}

impl NativeDbRepository {
    /// Open or create a database file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            store: Arc::new(Store::open(path)?),
        })
    }

    /// Create an in-memory database
    pub fn in_memory() -> Result<Self> {
        Ok(Self {
            store: Arc::new(Store::in_memory()?),
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }
}

#[async_trait]
impl Repository for NativeDbRepository {
    async fn save(&self, snapshot: &PlayerSnapshot) -> Result<()> {
        let store = Arc::clone(&self.store);
        let snapshot = snapshot.clone();
        tokio::task::spawn_blocking(move || store.save_player(&snapshot)).await?
    }

    async fn load(&self, player: &PlayerId) -> Result<Option<PlayerSnapshot>> {
        let store = Arc::clone(&self.store);
        let player = player.clone();
        tokio::task::spawn_blocking(move || store.load_player(&player)).await?
    }
}
