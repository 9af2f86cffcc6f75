//! Bounded item inventory
//!
//! The limit counts distinct item types, not stack sizes. Adding a new item
//! type to a full inventory fails without touching any slot.

use crate::error::{Error, Result};
use crate::ItemId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Default number of distinct item types a player may hold
pub const DEFAULT_INVENTORY_LIMIT: usize = 200;

/// Validate a client-supplied count and convert it to a stack size
pub fn validate_count(count: i64) -> Result<u64> {
    if count <= 0 {
        return Err(Error::InvalidItemCount(count));
    }
    Ok(count as u64)
}

/// Map of item type to count, bounded by the number of distinct types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    slots: IndexMap<ItemId, u64>,
    limit: usize,
}

impl Inventory {
    /// Create an empty inventory with the given type limit
    pub fn new(limit: usize) -> Self {
        Self {
            slots: IndexMap::new(),
            limit,
        }
    }

    /// Rebuild an inventory from persisted counts
    ///
    /// Zero counts are dropped. The limit is not enforced here so an
    /// over-full snapshot (e.g. saved under a larger limit) still loads.
    pub fn from_counts(counts: impl IntoIterator<Item = (ItemId, u64)>, limit: usize) -> Self {
        let slots = counts.into_iter().filter(|(_, n)| *n > 0).collect();
        Self { slots, limit }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of distinct item types held
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Count held of one item type (0 when absent)
    pub fn count(&self, item: &ItemId) -> u64 {
        self.slots.get(item).copied().unwrap_or(0)
    }

    /// True when adding `item` would not create a new slot past the limit
    pub fn can_add(&self, item: &ItemId) -> bool {
        self.slots.contains_key(item) || self.slots.len() < self.limit
    }

    /// Add `count` units of `item`
    ///
    /// Fails with [`Error::InventoryFull`] when `item` is a new type and the
    /// inventory already holds `limit` types. Nothing changes on failure.
    pub fn add(&mut self, item: &ItemId, count: u64) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        if !self.can_add(item) {
            return Err(Error::InventoryFull { limit: self.limit });
        }
        self.restore(item, count);
        Ok(())
    }

    /// Put back units taken out by a rolled-back operation
    ///
    /// Skips the type limit, so undoing a removal never fails even when the
    /// inventory was loaded over its limit. Stacks saturate at `u64::MAX`.
    pub(crate) fn restore(&mut self, item: &ItemId, count: u64) {
        if count == 0 {
            return;
        }
        let n = self.slots.entry(item.clone()).or_insert(0);
        *n = n.saturating_add(count);
    }

    /// Remove `count` units of `item`; the slot disappears when it reaches zero
    pub fn remove(&mut self, item: &ItemId, count: u64) -> Result<()> {
        let have = self.count(item);
        if have < count {
            return Err(Error::NotEnoughItems {
                item: item.clone(),
                have,
                want: count,
            });
        }
        if have == count {
            self.slots.shift_remove(item);
        } else if let Some(n) = self.slots.get_mut(item) {
            *n -= count;
        }
        Ok(())
    }

    /// Iterate over held stacks in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&ItemId, u64)> {
        self.slots.iter().map(|(k, v)| (k, *v))
    }

    /// Copy of the counts, for snapshots and client views
    pub fn to_counts(&self) -> IndexMap<ItemId, u64> {
        self.slots.clone()
    }
}

impl Default for Inventory {
    fn default() -> Self {
        Self::new(DEFAULT_INVENTORY_LIMIT)
    }
}
