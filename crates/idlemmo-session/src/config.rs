//! Session Configuration - Timing, capacity and seeding for the actor runtime
//!
//! Every field has a default, so an empty RON document `()` is a valid
//! configuration. Durations are stored as plain numbers and exposed through
//! accessors returning [`Duration`].

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for a [`SessionRuntime`](crate::SessionRuntime)
///
/// # Example
///
/// ```
/// use idlemmo_session::SessionConfig;
/// use std::time::Duration;
///
/// let config = SessionConfig::from_ron_str("(scheduler_resolution_ms: 100)").unwrap();
/// assert_eq!(config.scheduler_resolution(), Duration::from_millis(100));
/// // unspecified fields keep their defaults
/// assert_eq!(config.inventory_limit, 200);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Wake period of the scheduler's scan loop
    ///
    /// Upper bound on how late a tick can fire.
    pub scheduler_resolution_ms: u64,

    /// How often the persistence actor asks every player to check expiry
    pub expiry_check_interval_secs: u64,

    /// Offline cap for players whose snapshot does not carry one
    pub default_offline_limit_hours: u64,

    /// Distinct item types a player inventory may hold
    pub inventory_limit: usize,

    /// Snapshot loads slower than this fall back to a new player
    pub load_timeout_ms: u64,

    /// Notifications buffered per connection before new ones are dropped
    pub outbound_buffer: usize,

    /// Base seed for every per-actor RNG
    ///
    /// When absent a seed is derived from the wall clock at startup.
    pub rng_seed: Option<u64>,

    /// Worker threads for a runtime built from this configuration
    ///
    /// Clamped to `[1, max_workers()]`; absent means one per logical CPU.
    pub worker_threads: Option<usize>,
}

impl SessionConfig {
    /// Parse a configuration from RON text
    pub fn from_ron_str(content: &str) -> Result<Self> {
        Ok(ron::from_str(content)?)
    }

    /// Load a configuration from a RON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_ron_str(&content)
    }

    pub fn scheduler_resolution(&self) -> Duration {
        Duration::from_millis(self.scheduler_resolution_ms.max(1))
    }

    pub fn expiry_check_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_check_interval_secs.max(1))
    }

    pub fn default_offline_limit(&self) -> Duration {
        Duration::from_secs(self.default_offline_limit_hours * 3600)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    /// Outbound buffer size, never zero
    pub fn outbound_buffer(&self) -> usize {
        self.outbound_buffer.max(1)
    }

    /// The configured seed, or one derived from the current wall-clock time
    pub fn resolve_seed(&self) -> u64 {
        self.rng_seed.unwrap_or_else(|| {
            let now = chrono::Utc::now();
            now.timestamp_nanos_opt()
                .map(|n| n as u64)
                .unwrap_or_else(|| now.timestamp() as u64)
        })
    }

    /// Worker thread count for a multi-threaded runtime
    pub fn worker_threads(&self) -> usize {
        self.worker_threads
            .unwrap_or_else(max_workers)
            .clamp(1, max_workers())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scheduler_resolution_ms: 200,
            expiry_check_interval_secs: 60,
            default_offline_limit_hours: 10,
            inventory_limit: idlemmo_core::inventory::DEFAULT_INVENTORY_LIMIT,
            load_timeout_ms: 3000,
            outbound_buffer: 64,
            rng_seed: None,
            worker_threads: None,
        }
    }
}

/// Logical CPUs available to the process
///
/// ```
/// assert!(idlemmo_session::max_workers() >= 1);
/// ```
pub fn max_workers() -> usize {
    num_cpus::get()
}
