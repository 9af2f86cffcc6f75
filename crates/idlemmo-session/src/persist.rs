//! PersistActor - the only path from sessions to the repository
//!
//! Saves are awaited inline, one at a time, so saves for the same player land
//! in the order they were requested. Loads run on their own task under a
//! timeout and reply to the requesting PlayerActor with a `Loaded` message;
//! a failed or timed-out load is reported as "no snapshot".
//!
//! The actor also keeps the registry of live PlayerActors and drives the
//! periodic expiry check by broadcasting `CheckExpire` to every one of them.

use crate::actor::ActorId;
use crate::error::{Error, Result};
use crate::player::{PlayerHandle, PlayerMsg};
use idlemmo_core::{PlayerId, PlayerSnapshot};
use idlemmo_db::Repository;
use indexmap::IndexMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Messages accepted by the persistence actor
#[derive(Debug)]
pub enum PersistMsg {
    Register {
        player: PlayerId,
        handle: PlayerHandle,
    },
    Unregister {
        player: PlayerId,
        id: ActorId,
    },
    Save {
        snapshot: PlayerSnapshot,
    },
    Load {
        player: PlayerId,
        reply_to: PlayerHandle,
    },
    CheckExpire,
    Flush {
        reply: oneshot::Sender<()>,
    },
    RegisteredCount {
        reply: oneshot::Sender<usize>,
    },
    Stop,
}

/// Handle to the persistence actor
#[derive(Debug, Clone)]
pub struct PersistHandle {
    tx: mpsc::UnboundedSender<PersistMsg>,
}

impl PersistHandle {
    fn send(&self, msg: PersistMsg) -> Result<()> {
        self.tx.send(msg).map_err(|_| Error::MailboxClosed("persist"))
    }

    pub fn register(&self, player: PlayerId, handle: PlayerHandle) -> Result<()> {
        self.send(PersistMsg::Register { player, handle })
    }

    /// Remove a player from the registry if it is still served by actor `id`
    pub fn unregister(&self, player: PlayerId, id: ActorId) -> Result<()> {
        self.send(PersistMsg::Unregister { player, id })
    }

    /// Queue a save; completion is not reported
    pub fn save(&self, snapshot: PlayerSnapshot) -> Result<()> {
        self.send(PersistMsg::Save { snapshot })
    }

    /// Request a load; the result arrives at `reply_to` as `PlayerMsg::Loaded`
    pub fn load(&self, player: PlayerId, reply_to: PlayerHandle) -> Result<()> {
        self.send(PersistMsg::Load { player, reply_to })
    }

    /// Broadcast an expiry check now, outside the periodic schedule
    pub fn check_expire(&self) -> Result<()> {
        self.send(PersistMsg::CheckExpire)
    }

    /// Wait until every save queued before this call has completed
    pub async fn flush(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(PersistMsg::Flush { reply })?;
        rx.await.map_err(|_| Error::MailboxClosed("persist"))
    }

    /// Number of registered live players
    pub async fn registered_count(&self) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.send(PersistMsg::RegisteredCount { reply })?;
        rx.await.map_err(|_| Error::MailboxClosed("persist"))
    }

    pub fn stop(&self) -> Result<()> {
        self.send(PersistMsg::Stop)
    }

    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

struct PersistActor {
    repo: Arc<dyn Repository>,
    registry: IndexMap<PlayerId, PlayerHandle>,
    load_timeout: Duration,
    expiry_interval: Duration,
}

impl PersistActor {
    async fn handle(&mut self, msg: PersistMsg) -> bool {
        match msg {
            PersistMsg::Register { player, handle } => {
                debug!(player = %player, actor = %handle.id(), "persist register");
                self.registry.insert(player, handle);
            }
            PersistMsg::Unregister { player, id } => {
                if self.registry.get(&player).map(|h| h.id()) == Some(id) {
                    self.registry.shift_remove(&player);
                    debug!(player = %player, actor = %id, "persist unregister");
                }
            }
            PersistMsg::Save { snapshot } => {
                if let Err(err) = self.repo.save(&snapshot).await {
                    error!(player = %snapshot.player_id, error = %err, "snapshot save failed");
                }
            }
            PersistMsg::Load { player, reply_to } => self.spawn_load(player, reply_to),
            PersistMsg::CheckExpire => self.broadcast_expiry(),
            PersistMsg::Flush { reply } => {
                let _ = reply.send(());
            }
            PersistMsg::RegisteredCount { reply } => {
                let _ = reply.send(self.registry.len());
            }
            PersistMsg::Stop => return false,
        }
        true
    }

    fn spawn_load(&self, player: PlayerId, reply_to: PlayerHandle) {
        let repo = Arc::clone(&self.repo);
        let timeout = self.load_timeout;
        tokio::spawn(async move {
            let snapshot = match tokio::time::timeout(timeout, repo.load(&player)).await {
                Ok(Ok(snapshot)) => snapshot,
                Ok(Err(err)) => {
                    warn!(player = %player, error = %err, "snapshot load failed, treating as new player");
                    None
                }
                Err(_) => {
                    warn!(player = %player, error = %Error::LoadTimeout(player.clone()), "treating as new player");
                    None
                }
            };
            if reply_to.send(PlayerMsg::Loaded { snapshot }).is_err() {
                debug!(player = %player, "player stopped before its load completed");
            }
        });
    }

    fn broadcast_expiry(&mut self) {
        self.registry
            .retain(|_, handle| handle.send(PlayerMsg::CheckExpire).is_ok());
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<PersistMsg>) {
        info!(expiry_interval = ?self.expiry_interval, "persist started");
        let start = Instant::now() + self.expiry_interval;
        let mut expiry = tokio::time::interval_at(start, self.expiry_interval);
        expiry.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(msg) => {
                        if !self.handle(msg).await {
                            break;
                        }
                    }
                    None => break,
                },
                _ = expiry.tick() => self.broadcast_expiry(),
            }
        }
        info!(registered = self.registry.len(), "persist stopped");
    }
}

/// Spawn the persistence actor on the current tokio runtime
pub fn spawn_persist(
    repo: Arc<dyn Repository>,
    load_timeout: Duration,
    expiry_interval: Duration,
) -> PersistHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let actor = PersistActor {
        repo,
        registry: IndexMap::new(),
        load_timeout,
        expiry_interval,
    };
    tokio::spawn(actor.run(rx));
    PersistHandle { tx }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idlemmo_db::MemoryRepository;

    const MINUTE: Duration = Duration::from_secs(60);

    fn persist(repo: &Arc<MemoryRepository>) -> PersistHandle {
        spawn_persist(repo.clone(), Duration::from_secs(3), MINUTE)
    }

    async fn expect_loaded(rx: &mut mpsc::UnboundedReceiver<PlayerMsg>) -> Option<PlayerSnapshot> {
        match rx.recv().await {
            Some(PlayerMsg::Loaded { snapshot }) => snapshot,
            other => panic!("expected Loaded, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_then_load() {
        let repo = Arc::new(MemoryRepository::new());
        let persist = persist(&repo);
        let mut snap = PlayerSnapshot::new(PlayerId::new("alice"));
        snap.exp = 42;
        persist.save(snap.clone()).unwrap();

        let (handle, mut rx) = PlayerHandle::detached(PlayerId::new("alice"));
        persist.load(PlayerId::new("alice"), handle).unwrap();
        assert_eq!(expect_loaded(&mut rx).await, Some(snap));
    }

    #[tokio::test(start_paused = true)]
    async fn test_saves_apply_in_order() {
        let repo = Arc::new(MemoryRepository::new());
        let persist = persist(&repo);
        for exp in 1..=5 {
            let mut snap = PlayerSnapshot::new(PlayerId::new("alice"));
            snap.exp = exp;
            persist.save(snap).unwrap();
        }
        persist.flush().await.unwrap();
        assert_eq!(repo.get(&PlayerId::new("alice")).unwrap().exp, 5);
        assert_eq!(repo.save_count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_failure_is_new_player() {
        let repo = Arc::new(MemoryRepository::new());
        repo.insert(PlayerSnapshot::new(PlayerId::new("alice")));
        repo.set_fail_loads(true);
        let persist = persist(&repo);

        let (handle, mut rx) = PlayerHandle::detached(PlayerId::new("alice"));
        persist.load(PlayerId::new("alice"), handle).unwrap();
        assert_eq!(expect_loaded(&mut rx).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_timeout_is_new_player() {
        let repo = Arc::new(MemoryRepository::new());
        repo.insert(PlayerSnapshot::new(PlayerId::new("alice")));
        repo.set_load_delay(Some(Duration::from_secs(10)));
        let persist = persist(&repo);

        let start = Instant::now();
        let (handle, mut rx) = PlayerHandle::detached(PlayerId::new("alice"));
        persist.load(PlayerId::new("alice"), handle).unwrap();
        assert_eq!(expect_loaded(&mut rx).await, None);
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_failure_does_not_stop_actor() {
        let repo = Arc::new(MemoryRepository::new());
        repo.set_fail_saves(true);
        let persist = persist(&repo);
        persist.save(PlayerSnapshot::new(PlayerId::new("alice"))).unwrap();
        persist.flush().await.unwrap();
        assert_eq!(repo.save_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_broadcast_and_registry() {
        let repo = Arc::new(MemoryRepository::new());
        let persist = persist(&repo);
        let (alive, mut alive_rx) = PlayerHandle::detached(PlayerId::new("alice"));
        let (gone, gone_rx) = PlayerHandle::detached(PlayerId::new("bob"));
        persist.register(PlayerId::new("alice"), alive).unwrap();
        persist.register(PlayerId::new("bob"), gone).unwrap();
        assert_eq!(persist.registered_count().await.unwrap(), 2);
        drop(gone_rx);

        tokio::time::sleep(MINUTE + Duration::from_secs(1)).await;
        assert!(matches!(alive_rx.recv().await, Some(PlayerMsg::CheckExpire)));
        // the closed actor was pruned by the broadcast
        assert_eq!(persist.registered_count().await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unregister_is_identity_checked() {
        let repo = Arc::new(MemoryRepository::new());
        let persist = persist(&repo);
        let (old, _old_rx) = PlayerHandle::detached(PlayerId::new("alice"));
        let (new, _new_rx) = PlayerHandle::detached(PlayerId::new("alice"));
        let old_id = old.id();
        persist.register(PlayerId::new("alice"), old).unwrap();
        persist.register(PlayerId::new("alice"), new.clone()).unwrap();

        persist.unregister(PlayerId::new("alice"), old_id).unwrap();
        assert_eq!(persist.registered_count().await.unwrap(), 1);
        persist.unregister(PlayerId::new("alice"), new.id()).unwrap();
        assert_eq!(persist.registered_count().await.unwrap(), 0);
    }
}
