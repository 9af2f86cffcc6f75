//! Actor identity
//!
//! Every spawned actor gets a process-unique [`ActorId`]. Identities are
//! never reused, so comparing IDs tells a live actor apart from a stopped
//! predecessor that served the same player.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

static NEXT_ACTOR_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a spawned actor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(u64);

impl ActorId {
    /// Allocate a fresh identity
    pub fn next() -> Self {
        Self(NEXT_ACTOR_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor:{}", self.0)
    }
}

/// Current time as seen by the tokio clock
///
/// Player presence is tracked with `std::time::Instant`; reading it through
/// tokio keeps paused-clock tests in step with the actors.
pub(crate) fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}
