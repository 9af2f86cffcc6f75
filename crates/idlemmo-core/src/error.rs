//! Error types for idlemmo-core

use crate::{ActivityId, ItemId, SubProjectId};
use thiserror::Error;

/// Broad class of a domain error, used to decide how the caller reacts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before any mutation; retrying the same request is pointless
    Validation,
    /// The inventory could not take the items; the operation was rolled back
    Capacity,
    /// A referenced item or slot does not exist
    NotFound,
}

/// Core error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Unknown activity: {0}")]
    UnknownActivity(ActivityId),

    #[error("Sub-project {sub_project} not found in activity {activity}")]
    SubProjectNotFound {
        activity: ActivityId,
        sub_project: SubProjectId,
    },

    #[error("Sub-project {sub_project} unlocks at level {required} (current level {level})")]
    SubProjectLocked {
        sub_project: SubProjectId,
        required: u32,
        level: u32,
    },

    #[error("Invalid item count: {0}")]
    InvalidItemCount(i64),

    #[error("Missing item id")]
    MissingItemId,

    #[error("Item cannot be equipped: {0}")]
    NotEquippable(ItemId),

    #[error("Unknown equipment slot: {0}")]
    UnknownSlot(String),

    #[error("Not enough {item}: have {have}, need {want}")]
    NotEnoughItems { item: ItemId, have: u64, want: u64 },

    #[error("Inventory full ({limit} item types)")]
    InventoryFull { limit: usize },

    #[error("Slot is empty: {0}")]
    SlotEmpty(String),
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnknownActivity(_)
            | Error::SubProjectNotFound { .. }
            | Error::SubProjectLocked { .. }
            | Error::InvalidItemCount(_)
            | Error::MissingItemId
            | Error::NotEquippable(_)
            | Error::UnknownSlot(_) => ErrorKind::Validation,
            Error::InventoryFull { .. } => ErrorKind::Capacity,
            Error::NotEnoughItems { .. } | Error::SlotEmpty(_) => ErrorKind::NotFound,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            Error::InventoryFull { limit: 3 }.kind(),
            ErrorKind::Capacity
        );
        assert_eq!(
            Error::UnknownActivity(ActivityId::new("x")).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            Error::SlotEmpty("weapon".into()).kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_error_display() {
        let err = Error::NotEnoughItems {
            item: ItemId::new("ore"),
            have: 1,
            want: 3,
        };
        assert_eq!(err.to_string(), "Not enough ore: have 1, need 3");
    }
}
