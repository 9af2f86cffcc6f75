//! Static catalog schema: activities and equipment
//!
//! The catalog is loaded once at startup (see `idlemmo-script`) and shared
//! read-only between actors behind an `Arc`.

use crate::error::{Error, Result};
use crate::{ActivityId, ItemId, SubProjectId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Floor applied to every effective tick interval
pub const MIN_TICK_INTERVAL_SECS: f64 = 0.5;

/// An item that an activity can drop on a tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDrop {
    pub id: ItemId,
    #[serde(default)]
    pub name: String,
    /// Independent per-tick probability in [0, 1]
    #[serde(default)]
    pub drop_chance: f64,
    #[serde(default)]
    pub value: i64,
    #[serde(default)]
    pub is_equipment: bool,
}

/// An equipment piece an activity can drop once the player reaches `min_level`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentDrop {
    pub id: ItemId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub drop_chance: f64,
    #[serde(default)]
    pub min_level: u32,
}

impl EquipmentDrop {
    /// Value credited for an equipment drop
    pub const DROP_VALUE: i64 = 50;

    /// The inventory-facing drop produced when this roll succeeds
    pub fn to_item_drop(&self) -> ItemDrop {
        ItemDrop {
            id: self.id.clone(),
            name: self.name.clone(),
            drop_chance: self.drop_chance,
            value: Self::DROP_VALUE,
            is_equipment: true,
        }
    }
}

/// A rare event; when it fires it multiplies the tick's gain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RareEvent {
    pub name: String,
    #[serde(default)]
    pub effect: String,
    #[serde(default = "default_multiplier")]
    pub mult_gain: f64,
}

fn default_multiplier() -> f64 {
    1.0
}

fn default_tick_interval() -> f64 {
    1.0
}

/// A level-gated variant of an activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubProject {
    pub id: SubProjectId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub unlock_level: u32,
    #[serde(default)]
    pub description: String,
    /// Multiplies the gain factor; ignored when not positive
    #[serde(default)]
    pub gain_multiplier: f64,
    /// Added to the activity's rare chance
    #[serde(default)]
    pub rare_chance_bonus: f64,
    /// Multiplies the exp rate; ignored when not positive
    #[serde(default)]
    pub exp_multiplier: f64,
    /// Scales the tick interval; ignored when not positive
    #[serde(default)]
    pub interval_modifier: f64,
    #[serde(default)]
    pub extra_drops: Vec<ItemDrop>,
}

impl SubProject {
    /// Brief used in catalog listings
    pub fn brief(&self) -> SubProjectBrief {
        SubProjectBrief {
            id: self.id.clone(),
            name: self.name.clone(),
            unlock_level: self.unlock_level,
            description: self.description.clone(),
            gain_multiplier: self.gain_multiplier,
            rare_chance_bonus: self.rare_chance_bonus,
            exp_multiplier: self.exp_multiplier,
            interval_modifier: self.interval_modifier,
        }
    }
}

/// Tick economics of one activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityConfig {
    pub id: ActivityId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub base_gain: i64,
    #[serde(default)]
    pub growth_factor: f64,
    /// Seconds between ticks before sub-project modifiers
    #[serde(default = "default_tick_interval")]
    pub tick_interval: f64,
    #[serde(default)]
    pub rare_chance: f64,
    #[serde(default)]
    pub exp_rate: f64,
    #[serde(default)]
    pub level_up_exp: i64,
    #[serde(default)]
    pub drops: Vec<ItemDrop>,
    #[serde(default)]
    pub equipment_drops: Vec<EquipmentDrop>,
    #[serde(default)]
    pub rare_events: Vec<RareEvent>,
    #[serde(default)]
    pub sub_projects: Vec<SubProject>,
}

impl ActivityConfig {
    /// Create an activity with the given economics and no drops
    pub fn new(id: impl Into<ActivityId>, base_gain: i64, growth_factor: f64) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            base_gain,
            growth_factor,
            tick_interval: default_tick_interval(),
            rare_chance: 0.0,
            exp_rate: 0.0,
            level_up_exp: 0,
            drops: Vec::new(),
            equipment_drops: Vec::new(),
            rare_events: Vec::new(),
            sub_projects: Vec::new(),
        }
    }

    /// Look up a sub-project by ID
    pub fn sub_project(&self, id: &SubProjectId) -> Option<&SubProject> {
        self.sub_projects.iter().find(|sp| &sp.id == id)
    }

    /// Interval between ticks, scaled by the sub-project and floored at 0.5s
    pub fn effective_interval(&self, sub: Option<&SubProject>) -> Duration {
        let mut base = if self.tick_interval > 0.0 {
            self.tick_interval
        } else {
            1.0
        };
        if let Some(sp) = sub {
            if sp.interval_modifier > 0.0 {
                base *= sp.interval_modifier;
            }
        }
        Duration::from_secs_f64(base.max(MIN_TICK_INTERVAL_SECS))
    }

    /// Gain before multipliers: `base_gain + trunc(level × growth_factor)`
    pub fn base_tick_gain(&self, level: u32) -> i64 {
        self.base_gain + (level as f64 * self.growth_factor) as i64
    }

    /// Summary used by the `list_sequences` command
    pub fn summary(&self) -> ActivitySummary {
        ActivitySummary {
            id: self.id.clone(),
            name: if self.name.is_empty() {
                self.id.to_string()
            } else {
                self.name.clone()
            },
            tick_interval: self.tick_interval,
            sub_projects: self.sub_projects.iter().map(SubProject::brief).collect(),
        }
    }
}

/// Equipment slot; a loadout holds at most one item per slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    Weapon,
    Armor,
    Head,
    Hand,
    Foot,
    Relic,
}

impl Slot {
    pub const ALL: [Slot; 6] = [
        Slot::Weapon,
        Slot::Armor,
        Slot::Head,
        Slot::Hand,
        Slot::Foot,
        Slot::Relic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Slot::Weapon => "weapon",
            Slot::Armor => "armor",
            Slot::Head => "head",
            Slot::Hand => "hand",
            Slot::Foot => "foot",
            Slot::Relic => "relic",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Slot {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Slot::ALL
            .into_iter()
            .find(|slot| slot.as_str() == s)
            .ok_or_else(|| Error::UnknownSlot(s.to_string()))
    }
}

/// Item quality tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    #[default]
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
    Mythic,
}

/// Additive bonuses granted by one equipment piece
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EquipmentAttributes {
    #[serde(default)]
    pub gain_multiplier: f64,
    #[serde(default)]
    pub rare_chance_bonus: f64,
    #[serde(default)]
    pub exp_multiplier: f64,
}

/// Catalog entry for an equippable item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentDefinition {
    pub id: ItemId,
    #[serde(default)]
    pub name: String,
    pub slot: Slot,
    #[serde(default)]
    pub quality: Quality,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub attributes: EquipmentAttributes,
}

/// Listing entry for one activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySummary {
    pub id: ActivityId,
    pub name: String,
    pub tick_interval: f64,
    pub sub_projects: Vec<SubProjectBrief>,
}

/// Listing entry for one sub-project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubProjectBrief {
    pub id: SubProjectId,
    pub name: String,
    pub unlock_level: u32,
    pub description: String,
    pub gain_multiplier: f64,
    pub rare_chance_bonus: f64,
    pub exp_multiplier: f64,
    pub interval_modifier: f64,
}

/// Activity and equipment catalogs, keyed by ID
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub activities: IndexMap<ActivityId, ActivityConfig>,
    pub equipment: IndexMap<ItemId, EquipmentDefinition>,
}

impl Catalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an activity
    pub fn with_activity(mut self, activity: ActivityConfig) -> Self {
        self.activities.insert(activity.id.clone(), activity);
        self
    }

    /// Add or replace an equipment definition
    pub fn with_equipment(mut self, def: EquipmentDefinition) -> Self {
        self.equipment.insert(def.id.clone(), def);
        self
    }

    pub fn activity(&self, id: &ActivityId) -> Option<&ActivityConfig> {
        self.activities.get(id)
    }

    pub fn equipment(&self, id: &ItemId) -> Option<&EquipmentDefinition> {
        self.equipment.get(id)
    }

    /// Resolve an activity and optional sub-project, checking the unlock level
    pub fn resolve_start(
        &self,
        activity: &ActivityId,
        sub_project: Option<&SubProjectId>,
        level: u32,
    ) -> Result<(&ActivityConfig, Option<&SubProject>)> {
        let cfg = self
            .activity(activity)
            .ok_or_else(|| Error::UnknownActivity(activity.clone()))?;
        let sub = match sub_project {
            None => None,
            Some(id) => {
                let sp = cfg.sub_project(id).ok_or_else(|| Error::SubProjectNotFound {
                    activity: activity.clone(),
                    sub_project: id.clone(),
                })?;
                if level < sp.unlock_level {
                    return Err(Error::SubProjectLocked {
                        sub_project: id.clone(),
                        required: sp.unlock_level,
                        level,
                    });
                }
                Some(sp)
            }
        };
        Ok((cfg, sub))
    }

    /// Activity summaries sorted by ID
    pub fn summaries(&self) -> Vec<ActivitySummary> {
        let mut out: Vec<_> = self.activities.values().map(|a| a.summary()).collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }
}
