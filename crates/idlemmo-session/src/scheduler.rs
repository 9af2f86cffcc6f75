//! SchedulerActor - one wake loop for every running activity
//!
//! Instead of one timer per SequenceActor, all tick targets live in a single
//! [`TickTable`] swept by one interval at a fixed resolution. A target is
//! fired when its due time has passed and is then rescheduled a full
//! interval from the sweep that fired it, so it fires at most once per sweep.
//!
//! Targets are keyed by actor identity and tagged with the owning player.
//! Adding a target evicts any other target of the same owner, so a player can
//! never have two registered activities at once.
//!
//! There is no explicit termination message: a target whose mailbox has
//! closed is dropped by the next sweep that finds it due.

use crate::actor::ActorId;
use crate::error::{Error, Result};
use crate::sequence::SequenceMsg;
use idlemmo_core::PlayerId;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace};

/// Anything the scheduler can deliver a tick to
pub trait TickSink {
    /// Deliver a tick; `false` means the target is gone
    fn tick(&self, at: Instant) -> bool;
}

impl TickSink for mpsc::UnboundedSender<SequenceMsg> {
    fn tick(&self, at: Instant) -> bool {
        self.send(SequenceMsg::Tick { at }).is_ok()
    }
}

#[derive(Debug)]
struct Target<S> {
    owner: PlayerId,
    sink: S,
    interval: Duration,
    next_due: Instant,
}

/// What a sweep did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Sweep {
    pub fired: Vec<ActorId>,
    pub dropped: Vec<ActorId>,
}

/// Indexed table of tick targets
#[derive(Debug)]
pub struct TickTable<S> {
    targets: IndexMap<ActorId, Target<S>>,
    owners: HashMap<PlayerId, ActorId>,
}

impl<S: TickSink> TickTable<S> {
    pub fn new() -> Self {
        Self {
            targets: IndexMap::new(),
            owners: HashMap::new(),
        }
    }

    /// Register or overwrite a target, first due at `now + interval`
    ///
    /// Returns the target of the same owner that was evicted, if any.
    pub fn add(
        &mut self,
        id: ActorId,
        owner: PlayerId,
        sink: S,
        interval: Duration,
        now: Instant,
    ) -> Option<ActorId> {
        let evicted = match self.owners.insert(owner.clone(), id) {
            Some(prev) if prev != id => {
                self.targets.swap_remove(&prev);
                Some(prev)
            }
            _ => None,
        };
        self.targets.insert(
            id,
            Target {
                owner,
                sink,
                interval,
                next_due: now + interval,
            },
        );
        evicted
    }

    /// Deregister a target; removing an unknown target is a no-op
    pub fn remove(&mut self, id: ActorId) -> bool {
        match self.targets.swap_remove(&id) {
            Some(target) => {
                if self.owners.get(&target.owner) == Some(&id) {
                    self.owners.remove(&target.owner);
                }
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn contains(&self, id: ActorId) -> bool {
        self.targets.contains_key(&id)
    }

    /// Target currently registered for `owner`
    pub fn target_of(&self, owner: &PlayerId) -> Option<ActorId> {
        self.owners.get(owner).copied()
    }

    /// Fire every due target and drop the ones whose sink is gone
    pub fn sweep(&mut self, now: Instant) -> Sweep {
        let mut sweep = Sweep::default();
        for (id, target) in self.targets.iter_mut() {
            if target.next_due > now {
                continue;
            }
            if target.sink.tick(now) {
                target.next_due = now + target.interval;
                sweep.fired.push(*id);
            } else {
                sweep.dropped.push(*id);
            }
        }
        for id in &sweep.dropped {
            self.remove(*id);
        }
        sweep
    }
}

impl<S: TickSink> Default for TickTable<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Messages accepted by the scheduler
#[derive(Debug)]
pub enum SchedulerMsg {
    AddTarget {
        id: ActorId,
        owner: PlayerId,
        sink: mpsc::UnboundedSender<SequenceMsg>,
        interval: Duration,
    },
    RemoveTarget {
        id: ActorId,
    },
    TargetCount {
        reply: oneshot::Sender<usize>,
    },
    TargetOf {
        owner: PlayerId,
        reply: oneshot::Sender<Option<ActorId>>,
    },
    Stop,
}

/// Handle to the scheduler actor
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<SchedulerMsg>,
}

impl SchedulerHandle {
    fn send(&self, msg: SchedulerMsg) -> Result<()> {
        self.tx
            .send(msg)
            .map_err(|_| Error::MailboxClosed("scheduler"))
    }

    pub fn add_target(
        &self,
        id: ActorId,
        owner: PlayerId,
        sink: mpsc::UnboundedSender<SequenceMsg>,
        interval: Duration,
    ) -> Result<()> {
        self.send(SchedulerMsg::AddTarget {
            id,
            owner,
            sink,
            interval,
        })
    }

    pub fn remove_target(&self, id: ActorId) -> Result<()> {
        self.send(SchedulerMsg::RemoveTarget { id })
    }

    /// Number of registered targets
    pub async fn target_count(&self) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.send(SchedulerMsg::TargetCount { reply })?;
        rx.await.map_err(|_| Error::MailboxClosed("scheduler"))
    }

    /// Target currently registered for a player
    pub async fn target_of(&self, owner: PlayerId) -> Result<Option<ActorId>> {
        let (reply, rx) = oneshot::channel();
        self.send(SchedulerMsg::TargetOf { owner, reply })?;
        rx.await.map_err(|_| Error::MailboxClosed("scheduler"))
    }

    pub fn stop(&self) -> Result<()> {
        self.send(SchedulerMsg::Stop)
    }

    /// Resolves once the scheduler has stopped
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

struct SchedulerActor {
    table: TickTable<mpsc::UnboundedSender<SequenceMsg>>,
    resolution: Duration,
}

impl SchedulerActor {
    fn handle(&mut self, msg: SchedulerMsg) -> bool {
        match msg {
            SchedulerMsg::AddTarget {
                id,
                owner,
                sink,
                interval,
            } => {
                debug!(target_id = %id, player = %owner, ?interval, "scheduler add target");
                if let Some(evicted) = self.table.add(id, owner, sink, interval, Instant::now()) {
                    debug!(target_id = %evicted, "scheduler evicted previous target of owner");
                }
            }
            SchedulerMsg::RemoveTarget { id } => {
                if self.table.remove(id) {
                    debug!(target_id = %id, "scheduler remove target");
                }
            }
            SchedulerMsg::TargetCount { reply } => {
                let _ = reply.send(self.table.len());
            }
            SchedulerMsg::TargetOf { owner, reply } => {
                let _ = reply.send(self.table.target_of(&owner));
            }
            SchedulerMsg::Stop => return false,
        }
        true
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SchedulerMsg>) {
        info!(resolution = ?self.resolution, "scheduler started");
        let mut wake = tokio::time::interval(self.resolution);
        wake.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(msg) => {
                        if !self.handle(msg) {
                            break;
                        }
                    }
                    None => break,
                },
                _ = wake.tick() => {
                    let sweep = self.table.sweep(Instant::now());
                    if !sweep.fired.is_empty() {
                        trace!(fired = sweep.fired.len(), "scheduler sweep");
                    }
                    for id in sweep.dropped {
                        debug!(target_id = %id, "scheduler dropped closed target");
                    }
                }
            }
        }
        info!(targets = self.table.len(), "scheduler stopped");
    }
}

/// Spawn the scheduler on the current tokio runtime
pub fn spawn_scheduler(resolution: Duration) -> SchedulerHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let actor = SchedulerActor {
        table: TickTable::new(),
        resolution,
    };
    tokio::spawn(actor.run(rx));
    SchedulerHandle { tx }
}
