//! Idlemmo Core - Domain state and tick economics for the idle session engine
//!
//! This crate holds everything about a player that can be expressed without
//! actors or I/O:
//! - String identifiers for players, activities, items and sub-projects
//! - The static catalog schema (activities, sub-projects, equipment)
//! - Bounded `Inventory` and `EquipmentLoadout` with transactional equip/unequip
//! - `PlayerState` and its durable `PlayerSnapshot`
//! - Per-activity tick math (`Sequence`) and offline settlement
//! - A deterministic RNG so ticks and settlements replay exactly under a seed
//!
//! The actor layer lives in `idlemmo-session`; it owns these values and is
//! the only thing that mutates them.

pub mod catalog;
pub mod equipment;
mod error;
mod identity;
pub mod inventory;
pub mod offline;
pub mod player;
mod rng;
pub mod sequence;

pub use catalog::{
    ActivityConfig, ActivitySummary, Catalog, EquipmentAttributes, EquipmentDefinition,
    EquipmentDrop, ItemDrop, Quality, RareEvent, Slot, SubProject, SubProjectBrief,
};
pub use equipment::{EquipmentBonus, EquipmentLoadout, EquipmentState, EquippedItem, EquippedItemView};
pub use error::{Error, ErrorKind, Result};
pub use identity::{ActivityId, ItemId, PlayerId, SubProjectId};
pub use inventory::Inventory;
pub use offline::OfflineReward;
pub use player::{PlayerSnapshot, PlayerState, Presence};
pub use rng::{hash_bytes_with_seed, hash_seed, GameRng};
pub use sequence::{Sequence, TickResult};
