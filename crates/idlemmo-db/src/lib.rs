//! Idlemmo DB - Player snapshot persistence
//!
//! Provides the [`Repository`] seam the session layer saves to and loads
//! from, with two implementations:
//! - [`MemoryRepository`] for tests and local runs
//! - [`NativeDbRepository`] backed by an embedded native_db [`Store`]

mod error;
mod models;
mod repository;
mod store;

pub use error::{Error, Result};
pub use models::StoredPlayer;
pub use repository::{MemoryRepository, NativeDbRepository, Repository};
pub use store::Store;
