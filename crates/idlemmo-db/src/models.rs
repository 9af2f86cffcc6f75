//! Database models.

use chrono::{DateTime, Utc};
use idlemmo_core::PlayerSnapshot;
use native_db::*;
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Stored player snapshot, one row per player.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[native_model(id = 1, version = 1)]
#[native_db]
pub struct StoredPlayer {
    /// Primary key - player ID.
    #[primary_key]
    pub player_id: String,
    /// Bincode-encoded `PlayerSnapshot`.
    pub payload: Vec<u8>,
    /// Wall-clock time of the save.
    pub saved_at: DateTime<Utc>,
}

impl StoredPlayer {
    /// Encode a snapshot, stamping it with the current time.
    pub fn from_snapshot(snapshot: &PlayerSnapshot) -> Result<Self> {
        Ok(Self {
            player_id: snapshot.player_id.as_str().to_string(),
            payload: bincode::serialize(snapshot)?,
            saved_at: Utc::now(),
        })
    }

    /// Decode the stored snapshot.
    pub fn to_snapshot(&self) -> Result<PlayerSnapshot> {
        Ok(bincode::deserialize(&self.payload)?)
    }
}
