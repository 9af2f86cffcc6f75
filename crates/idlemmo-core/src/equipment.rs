//! Equipment loadout and transactional equip/unequip
//!
//! Equip and unequip touch two aggregates (inventory and loadout). The
//! aggregates have no transaction log, so both operations are written as
//! compensating pairs: if the second step fails the first is undone and the
//! caller sees the error with both aggregates exactly as they were.

use crate::catalog::{Catalog, EquipmentAttributes, EquipmentDefinition, Quality, Slot};
use crate::error::{Error, Result};
use crate::inventory::Inventory;
use crate::ItemId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Summed additive attributes of everything equipped
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EquipmentBonus {
    pub gain_multiplier: f64,
    pub rare_chance_bonus: f64,
    pub exp_multiplier: f64,
}

impl EquipmentBonus {
    fn accumulate(&mut self, attrs: &EquipmentAttributes) {
        self.gain_multiplier += attrs.gain_multiplier;
        self.rare_chance_bonus += attrs.rare_chance_bonus;
        self.exp_multiplier += attrs.exp_multiplier;
    }
}

/// An item installed in a slot
#[derive(Debug, Clone, PartialEq)]
pub struct EquippedItem {
    pub definition: EquipmentDefinition,
    pub enhancement: i32,
}

/// Persisted form of one equipped item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentState {
    pub item_id: ItemId,
    pub enhancement: i32,
}

/// Client-facing description of an equipped (or catalog) item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquippedItemView {
    pub item_id: ItemId,
    pub name: String,
    pub slot: Slot,
    pub quality: Quality,
    pub description: String,
    pub enhancement: i32,
    pub attributes: EquipmentAttributes,
}

impl EquippedItemView {
    pub fn from_definition(def: &EquipmentDefinition, enhancement: i32) -> Self {
        Self {
            item_id: def.id.clone(),
            name: def.name.clone(),
            slot: def.slot,
            quality: def.quality,
            description: def.description.clone(),
            enhancement,
            attributes: def.attributes,
        }
    }
}

/// At most one item per slot
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EquipmentLoadout {
    slots: IndexMap<Slot, EquippedItem>,
}

impl EquipmentLoadout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a loadout from persisted state
    ///
    /// Entries whose item is no longer in the catalog, or whose catalog slot
    /// disagrees with the stored slot, are skipped.
    pub fn from_state(state: &IndexMap<Slot, EquipmentState>, catalog: &Catalog) -> Self {
        let mut loadout = Self::new();
        for (slot, st) in state {
            match catalog.equipment(&st.item_id) {
                Some(def) if def.slot == *slot => {
                    loadout.install(def.clone(), st.enhancement);
                }
                _ => {}
            }
        }
        loadout
    }

    /// Put an item in its slot, returning whatever was there before
    pub fn install(&mut self, definition: EquipmentDefinition, enhancement: i32) -> Option<EquippedItem> {
        let slot = definition.slot;
        self.slots.insert(
            slot,
            EquippedItem {
                definition,
                enhancement,
            },
        )
    }

    /// Take the item out of a slot
    pub fn take(&mut self, slot: Slot) -> Option<EquippedItem> {
        self.slots.shift_remove(&slot)
    }

    pub fn get(&self, slot: Slot) -> Option<&EquippedItem> {
        self.slots.get(&slot)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn total_bonus(&self) -> EquipmentBonus {
        let mut bonus = EquipmentBonus::default();
        for item in self.slots.values() {
            bonus.accumulate(&item.definition.attributes);
        }
        bonus
    }

    /// Persisted form, ordered by slot
    pub fn export_state(&self) -> IndexMap<Slot, EquipmentState> {
        let mut state: IndexMap<_, _> = self
            .slots
            .iter()
            .map(|(slot, item)| {
                (
                    *slot,
                    EquipmentState {
                        item_id: item.definition.id.clone(),
                        enhancement: item.enhancement,
                    },
                )
            })
            .collect();
        state.sort_keys();
        state
    }

    /// Client view, ordered by slot
    pub fn export_view(&self) -> IndexMap<Slot, EquippedItemView> {
        let mut view: IndexMap<_, _> = self
            .slots
            .iter()
            .map(|(slot, item)| {
                (
                    *slot,
                    EquippedItemView::from_definition(&item.definition, item.enhancement),
                )
            })
            .collect();
        view.sort_keys();
        view
    }
}

/// Move one unit of `definition` from the inventory into its slot
///
/// A displaced item goes back to the inventory. If that fails the new item
/// is restored to the inventory (bypassing the type limit), the displaced one
/// is reinstalled, and the capacity error is returned.
pub fn equip(
    loadout: &mut EquipmentLoadout,
    inventory: &mut Inventory,
    definition: &EquipmentDefinition,
    enhancement: i32,
) -> Result<Option<EquippedItem>> {
    inventory.remove(&definition.id, 1)?;
    let displaced = loadout.install(definition.clone(), enhancement);

    let Some(old) = displaced else {
        return Ok(None);
    };
    match inventory.add(&old.definition.id, 1) {
        Ok(()) => Ok(Some(old)),
        Err(err) => {
            loadout.install(old.definition, old.enhancement);
            inventory.restore(&definition.id, 1);
            Err(err)
        }
    }
}

/// Move the item in `slot` back into the inventory
///
/// When the inventory cannot take it the item stays equipped.
pub fn unequip(
    loadout: &mut EquipmentLoadout,
    inventory: &mut Inventory,
    slot: Slot,
) -> Result<EquippedItem> {
    let item = loadout
        .take(slot)
        .ok_or_else(|| Error::SlotEmpty(slot.to_string()))?;
    if let Err(err) = inventory.add(&item.definition.id, 1) {
        loadout.install(item.definition, item.enhancement);
        return Err(err);
    }
    Ok(item)
}
