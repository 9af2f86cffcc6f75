//! Player state and its durable snapshot
//!
//! [`PlayerState`] is owned by exactly one PlayerActor. Every mutation the
//! session performs on a player goes through the methods here, which validate
//! before they mutate.

use crate::catalog::{Catalog, Slot};
use crate::equipment::{self, EquipmentBonus, EquipmentLoadout, EquipmentState, EquippedItem};
use crate::error::{Error, Result};
use crate::inventory::{validate_count, Inventory};
use crate::offline::{self, OfflineReward};
use crate::rng::GameRng;
use crate::sequence::TickResult;
use crate::{ActivityId, ItemId, PlayerId, SubProjectId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Default offline cap, in hours
pub const DEFAULT_OFFLINE_LIMIT_HOURS: u64 = 10;

/// Exp granted per unit consumed by `use_item`
pub const EXP_PER_ITEM_USED: i64 = 10;

/// Durable representation of one player, overwritten wholesale on save
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub player_id: PlayerId,
    pub seq_levels: IndexMap<ActivityId, u32>,
    pub inventory: IndexMap<ItemId, u64>,
    pub exp: i64,
    pub equipment: IndexMap<Slot, EquipmentState>,
    pub offline_limit_hours: u64,
}

impl PlayerSnapshot {
    /// An empty snapshot for a player that has never been saved
    pub fn new(player_id: PlayerId) -> Self {
        Self {
            player_id,
            seq_levels: IndexMap::new(),
            inventory: IndexMap::new(),
            exp: 0,
            equipment: IndexMap::new(),
            offline_limit_hours: DEFAULT_OFFLINE_LIMIT_HOURS,
        }
    }
}

/// Connection-driven presence
///
/// Carrying the offline start inside the variant makes "has an offline start
/// exactly when offline" hold by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Online,
    Offline { since: Instant },
}

/// In-memory player state
#[derive(Debug, Clone)]
pub struct PlayerState {
    pub player_id: PlayerId,
    pub seq_levels: IndexMap<ActivityId, u32>,
    pub inventory: Inventory,
    pub equipment: EquipmentLoadout,
    pub exp: i64,
    pub offline_limit: Duration,
    presence: Presence,
    pub last_active: Instant,
    pub current_activity: Option<ActivityId>,
    pub active_sub_project: Option<SubProjectId>,
}

impl PlayerState {
    /// Fresh state; a player starts offline until a connection attaches
    pub fn new(player_id: PlayerId, inventory_limit: usize, offline_limit: Duration, now: Instant) -> Self {
        Self {
            player_id,
            seq_levels: IndexMap::new(),
            inventory: Inventory::new(inventory_limit),
            equipment: EquipmentLoadout::new(),
            exp: 0,
            offline_limit,
            presence: Presence::Offline { since: now },
            last_active: now,
            current_activity: None,
            active_sub_project: None,
        }
    }

    /// Overwrite persistent fields from a snapshot
    ///
    /// Equipment no longer present in the catalog is dropped. A zero offline
    /// limit keeps the current one.
    pub fn apply_snapshot(&mut self, snapshot: &PlayerSnapshot, catalog: &Catalog) {
        self.seq_levels = snapshot.seq_levels.clone();
        self.inventory = Inventory::from_counts(
            snapshot.inventory.iter().map(|(k, v)| (k.clone(), *v)),
            self.inventory.limit(),
        );
        self.exp = snapshot.exp;
        self.equipment = EquipmentLoadout::from_state(&snapshot.equipment, catalog);
        if snapshot.offline_limit_hours > 0 {
            self.offline_limit = Duration::from_secs(snapshot.offline_limit_hours * 3600);
        }
    }

    /// Seed every catalog activity at level 1 when the player has no levels yet
    pub fn ensure_sequence_defaults(&mut self, catalog: &Catalog) {
        if self.seq_levels.is_empty() {
            for id in catalog.activities.keys() {
                self.seq_levels.insert(id.clone(), 1);
            }
        }
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            player_id: self.player_id.clone(),
            seq_levels: self.seq_levels.clone(),
            inventory: self.inventory.to_counts(),
            exp: self.exp,
            equipment: self.equipment.export_state(),
            offline_limit_hours: self.offline_limit.as_secs() / 3600,
        }
    }

    pub fn presence(&self) -> Presence {
        self.presence
    }

    pub fn is_online(&self) -> bool {
        matches!(self.presence, Presence::Online)
    }

    pub fn offline_since(&self) -> Option<Instant> {
        match self.presence {
            Presence::Online => None,
            Presence::Offline { since } => Some(since),
        }
    }

    pub fn set_online(&mut self, now: Instant) {
        self.presence = Presence::Online;
        self.last_active = now;
    }

    /// Go offline; an already offline player keeps its original start
    pub fn set_offline(&mut self, now: Instant) {
        if self.is_online() {
            self.presence = Presence::Offline { since: now };
        }
        self.last_active = now;
    }

    /// True when the player has been offline for longer than its limit
    pub fn is_expired(&self, now: Instant) -> bool {
        match self.presence {
            Presence::Online => false,
            Presence::Offline { since } => now.saturating_duration_since(since) > self.offline_limit,
        }
    }

    /// Level of an activity; activities the player never touched start at 1
    pub fn level_of(&self, activity: &ActivityId) -> u32 {
        self.seq_levels.get(activity).copied().unwrap_or(1)
    }

    /// Level of the current activity, or 0 when idle
    pub fn current_level(&self) -> u32 {
        self.current_activity
            .as_ref()
            .map(|id| self.level_of(id))
            .unwrap_or(0)
    }

    pub fn equipment_bonus(&self) -> EquipmentBonus {
        self.equipment.total_bonus()
    }

    /// Compute the offline reward for the time since going offline
    ///
    /// Does not change presence or credit anything; see [`Self::credit_offline`].
    pub fn offline_reward(&self, now: Instant, catalog: &Catalog, rng: &mut GameRng) -> OfflineReward {
        let Some(since) = self.offline_since() else {
            return OfflineReward::default();
        };
        let duration = now.saturating_duration_since(since);
        offline::settle(&self.seq_levels, catalog, duration, self.offline_limit, rng)
    }

    /// Credit an offline reward; item types that do not fit are returned
    pub fn credit_offline(&mut self, reward: &OfflineReward) -> Vec<(ItemId, Error)> {
        self.exp += reward.gains;
        let mut rejected = Vec::new();
        for (item, count) in &reward.items {
            if let Err(err) = self.inventory.add(item, *count) {
                rejected.push((item.clone(), err));
            }
        }
        rejected
    }

    /// Merge a tick result; drops that do not fit are returned, the rest still applies
    pub fn apply_tick(&mut self, result: &TickResult) -> Vec<(ItemId, Error)> {
        let mut rejected = Vec::new();
        for item in &result.items {
            if let Err(err) = self.inventory.add(&item.id, 1) {
                rejected.push((item.id.clone(), err));
            }
        }
        self.seq_levels.insert(result.activity.clone(), result.level);
        self.active_sub_project = result.sub_project.clone();
        self.exp += result.gains;
        rejected
    }

    /// Consume `count` units and grant exp; returns the exp gained
    pub fn use_item(&mut self, item: &ItemId, count: i64) -> Result<i64> {
        if item.is_empty() {
            return Err(Error::MissingItemId);
        }
        let n = validate_count(count)?;
        self.inventory.remove(item, n)?;
        let gain = count * EXP_PER_ITEM_USED;
        self.exp += gain;
        Ok(gain)
    }

    /// Discard `count` units
    pub fn remove_item(&mut self, item: &ItemId, count: i64) -> Result<()> {
        if item.is_empty() {
            return Err(Error::MissingItemId);
        }
        let n = validate_count(count)?;
        self.inventory.remove(item, n)
    }

    /// Equip one unit of `item`, returning the displaced item if any
    pub fn equip_item(&mut self, item: &ItemId, enhancement: i32, catalog: &Catalog) -> Result<Option<EquippedItem>> {
        if item.is_empty() {
            return Err(Error::MissingItemId);
        }
        let definition = catalog
            .equipment(item)
            .ok_or_else(|| Error::NotEquippable(item.clone()))?;
        equipment::equip(&mut self.equipment, &mut self.inventory, definition, enhancement)
    }

    /// Unequip the item in the named slot
    pub fn unequip_item(&mut self, slot: &str) -> Result<EquippedItem> {
        let slot: Slot = slot.parse()?;
        equipment::unequip(&mut self.equipment, &mut self.inventory, slot)
    }
}
