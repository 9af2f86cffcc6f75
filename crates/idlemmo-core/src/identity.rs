//! Identity types for players, activities, items and sub-projects
//!
//! All identifiers are string-based so they can be referenced directly from
//! RON catalogs and decoded client payloads.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create a new identifier
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the ID as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// True when the identifier is the empty string
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Identifier of a player; one PlayerActor exists per live player ID
    PlayerId
);

string_id!(
    /// Identifier of an activity ("sequence") in the activity catalog
    ActivityId
);

string_id!(
    /// Identifier of an item type; inventory slots are keyed by it
    ItemId
);

string_id!(
    /// Identifier of a sub-project within one activity
    SubProjectId
);
