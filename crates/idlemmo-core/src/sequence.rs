//! Per-activity tick evaluation
//!
//! A [`Sequence`] is the pure state machine behind one running activity. The
//! session layer owns it inside a SequenceActor and calls [`Sequence::tick`]
//! whenever the scheduler fires.

use crate::catalog::{ActivityConfig, ItemDrop, RareEvent, SubProject};
use crate::equipment::EquipmentBonus;
use crate::rng::GameRng;
use crate::{ActivityId, SubProjectId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outcome of one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickResult {
    pub activity: ActivityId,
    /// Gain credited to the player; never negative
    pub gains: i64,
    pub items: Vec<ItemDrop>,
    pub rare: Option<RareEvent>,
    /// Activity level after this tick
    pub level: u32,
    /// Progress toward the next level after this tick
    pub cur_exp: i64,
    pub leveled: bool,
    pub sub_project: Option<SubProjectId>,
}

/// Multipliers for one tick after folding equipment and sub-project bonuses
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickModifiers {
    pub gain_multiplier: f64,
    pub rare_chance: f64,
    pub exp_rate: f64,
}

impl TickModifiers {
    pub fn new(cfg: &ActivityConfig, sub: Option<&SubProject>, bonus: &EquipmentBonus) -> Self {
        let mut gain_multiplier = 1.0 + bonus.gain_multiplier;
        let mut rare_chance = cfg.rare_chance + bonus.rare_chance_bonus;
        let mut exp_rate = cfg.exp_rate * (1.0 + bonus.exp_multiplier);

        if let Some(sp) = sub {
            if sp.gain_multiplier > 0.0 {
                gain_multiplier *= sp.gain_multiplier;
            }
            rare_chance += sp.rare_chance_bonus;
            if sp.exp_multiplier > 0.0 {
                exp_rate *= sp.exp_multiplier;
            }
        }

        Self {
            gain_multiplier,
            rare_chance: rare_chance.clamp(0.0, 1.0),
            exp_rate,
        }
    }
}

/// A running activity: level, progress and the chosen sub-project
#[derive(Debug, Clone)]
pub struct Sequence {
    config: ActivityConfig,
    sub_project: Option<SubProject>,
    level: u32,
    exp: i64,
}

impl Sequence {
    pub fn new(config: ActivityConfig, sub_project: Option<SubProject>, level: u32) -> Self {
        Self {
            config,
            sub_project,
            level,
            exp: 0,
        }
    }

    pub fn activity(&self) -> &ActivityId {
        &self.config.id
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn exp(&self) -> i64 {
        self.exp
    }

    pub fn sub_project(&self) -> Option<&SubProject> {
        self.sub_project.as_ref()
    }

    /// Interval at which the scheduler should fire this sequence
    pub fn interval(&self) -> Duration {
        self.config.effective_interval(self.sub_project.as_ref())
    }

    /// Evaluate one tick
    pub fn tick(&mut self, bonus: &EquipmentBonus, rng: &mut GameRng) -> TickResult {
        let cfg = &self.config;
        let sub = self.sub_project.as_ref();
        let mods = TickModifiers::new(cfg, sub, bonus);

        let base = cfg.base_tick_gain(self.level);
        let mut gains = ((base as f64) * mods.gain_multiplier) as i64;
        if gains < 0 {
            gains = 0;
        }

        let mut items = Vec::new();
        let extra = sub.map(|sp| sp.extra_drops.as_slice()).unwrap_or(&[]);
        for drop in cfg.drops.iter().chain(extra) {
            if rng.chance(drop.drop_chance) {
                items.push(drop.clone());
            }
        }
        for equip in &cfg.equipment_drops {
            if self.level >= equip.min_level && rng.chance(equip.drop_chance) {
                items.push(equip.to_item_drop());
            }
        }

        let mut rare = None;
        if rng.chance(mods.rare_chance) {
            if let Some(event) = rng.pick(&cfg.rare_events) {
                gains = ((gains as f64) * event.mult_gain) as i64;
                rare = Some(event.clone());
            }
        }

        self.exp += ((gains as f64) * mods.exp_rate) as i64;
        let mut leveled = false;
        if self.exp >= cfg.level_up_exp {
            self.level += 1;
            self.exp = 0;
            leveled = true;
        }

        TickResult {
            activity: cfg.id.clone(),
            gains,
            items,
            rare,
            level: self.level,
            cur_exp: self.exp,
            leveled,
            sub_project: sub.map(|sp| sp.id.clone()),
        }
    }
}
