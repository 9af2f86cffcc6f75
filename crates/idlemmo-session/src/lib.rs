//! Idlemmo Session - Actor runtime for idle-game player sessions
//!
//! This crate runs many concurrent players, each as an isolated task that
//! exclusively owns its state and talks to the rest of the system only
//! through message channels.
//!
//! ## Architecture
//!
//! ```text
//! SessionRuntime
//!  │
//!  ├── GatewayActor ← player ID → PlayerActor registry
//!  │    │
//!  │    └── PlayerActor[] ← owns PlayerState, one per live player
//!  │         └── SequenceActor ← at most one running activity
//!  │
//!  ├── SchedulerActor ← one wake loop ticking every SequenceActor
//!  └── PersistActor ← ordered saves, timed loads, expiry broadcast
//! ```
//!
//! ## Key Components
//!
//! - [`SessionRuntime`]: Spawns and owns the service actors
//! - [`GatewayHandle`]: Routes connections and commands to players
//! - [`PlayerHandle`]: Mailbox of one player session
//! - [`TickTable`]: Indexed tick targets swept by the scheduler
//! - [`ClientCommand`] / [`Notification`]: The client-facing message surface
//!
//! Domain rules (tick math, inventory, equipment, offline settlement) live in
//! `idlemmo-core`; this crate only decides who owns them and when they run.

mod actor;
pub mod config;
mod connection;
mod error;
pub mod gateway;
pub mod messages;
pub mod persist;
pub mod player;
mod runtime;
pub mod scheduler;
pub mod sequence;

pub use actor::ActorId;
pub use config::{max_workers, SessionConfig};
pub use connection::{Connection, ConnectionId};
pub use error::{Error, ErrorKind, Result};
pub use gateway::GatewayHandle;
pub use messages::{ClientCommand, Notification, PlayerView};
pub use persist::PersistHandle;
pub use player::{PlayerHandle, PlayerMsg, PlayerStatus};
pub use runtime::SessionRuntime;
pub use scheduler::{SchedulerHandle, TickSink, TickTable};
pub use sequence::SequenceHandle;
