//! Database store wrapper.

use crate::error::{Error, Result};
use crate::models::StoredPlayer;
use chrono::{DateTime, Utc};
use idlemmo_core::{PlayerId, PlayerSnapshot};
use native_db::*;
use std::path::Path;
use std::sync::LazyLock;

// Static models for the database
static MODELS: LazyLock<Models> = LazyLock::new(|| {
    let mut models = Models::new();
    models.define::<StoredPlayer>().unwrap();
    models
});

/// Database store for player snapshots.
pub struct Store {
    pub(crate) db: Database<'static>,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Builder::new()
            .create(&MODELS, path.as_ref())
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(Self { db })
    }

    /// Create an in-memory database.
    pub fn in_memory() -> Result<Self> {
        let db = Builder::new()
            .create_in_memory(&MODELS)
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(Self { db })
    }

    /// Save a snapshot, replacing any previous one for the same player.
    pub fn save_player(&self, snapshot: &PlayerSnapshot) -> Result<()> {
        let stored = StoredPlayer::from_snapshot(snapshot)?;
        let rw = self.db.rw_transaction()?;
        rw.upsert(stored)?;
        rw.commit()?;
        Ok(())
    }

    /// Load a snapshot by player ID.
    pub fn load_player(&self, id: &PlayerId) -> Result<Option<PlayerSnapshot>> {
        let r = self.db.r_transaction()?;
        let stored: Option<StoredPlayer> = r.get().primary(id.as_str().to_string())?;
        stored.map(|s| s.to_snapshot()).transpose()
    }

    /// When the player was last saved.
    pub fn saved_at(&self, id: &PlayerId) -> Result<Option<DateTime<Utc>>> {
        let r = self.db.r_transaction()?;
        let stored: Option<StoredPlayer> = r.get().primary(id.as_str().to_string())?;
        Ok(stored.map(|s| s.saved_at))
    }

    /// Delete a player's snapshot.
    pub fn delete_player(&self, id: &PlayerId) -> Result<()> {
        let rw = self.db.rw_transaction()?;
        let stored: Option<StoredPlayer> = rw.get().primary(id.as_str().to_string())?;
        if let Some(s) = stored {
            rw.remove(s)?;
        }
        rw.commit()?;
        Ok(())
    }

    /// Number of stored players.
    pub fn player_count(&self) -> Result<usize> {
        let r = self.db.r_transaction()?;
        let scan = r.scan().primary::<StoredPlayer>()?;
        let iter = scan.all()?;
        let players: std::result::Result<Vec<StoredPlayer>, _> = iter.collect();
        let players = players.map_err(|e| Error::Database(e.to_string()))?;
        Ok(players.len())
    }
}

impl From<native_db::db_type::Error> for Error {
    fn from(err: native_db::db_type::Error) -> Self {
        Error::Database(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idlemmo_core::{ActivityId, ItemId};

    fn snapshot(id: &str, exp: i64) -> PlayerSnapshot {
        let mut snap = PlayerSnapshot::new(PlayerId::new(id));
        snap.exp = exp;
        snap.seq_levels.insert(ActivityId::new("mining"), 3);
        snap.inventory.insert(ItemId::new("ore"), 12);
        snap
    }

    #[test]
    fn test_save_and_load() {
        let store = Store::in_memory().unwrap();
        let snap = snapshot("alice", 40);
        store.save_player(&snap).unwrap();

        let loaded = store.load_player(&PlayerId::new("alice")).unwrap();
        assert_eq!(loaded, Some(snap));
        assert!(store.saved_at(&PlayerId::new("alice")).unwrap().is_some());
    }

    #[test]
    fn test_load_missing() {
        let store = Store::in_memory().unwrap();
        assert_eq!(store.load_player(&PlayerId::new("nobody")).unwrap(), None);
    }

    #[test]
    fn test_save_overwrites() {
        let store = Store::in_memory().unwrap();
        store.save_player(&snapshot("alice", 1)).unwrap();
        store.save_player(&snapshot("alice", 2)).unwrap();

        let loaded = store.load_player(&PlayerId::new("alice")).unwrap().unwrap();
        assert_eq!(loaded.exp, 2);
        assert_eq!(store.player_count().unwrap(), 1);
    }

    #[test]
    fn test_delete() {
        let store = Store::in_memory().unwrap();
        store.save_player(&snapshot("alice", 1)).unwrap();
        store.delete_player(&PlayerId::new("alice")).unwrap();
        assert_eq!(store.player_count().unwrap(), 0);
    }
}
