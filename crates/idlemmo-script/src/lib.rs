//! Idlemmo Script - RON catalog loader
//!
//! Loads the static catalogs the session engine reads at startup:
//! - Activity definitions (`activities.ron`) with sub-projects, drops and rare events
//! - Equipment definitions (`equipment.ron`) keyed by item id
//!
//! A default catalog is bundled with the crate; see [`bundled_catalog`].

mod error;
mod loader;

pub use error::{Error, Result};
pub use loader::{bundled_catalog, unresolved_equipment_drops, Loader};
