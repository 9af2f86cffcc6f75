//! SequenceActor - one running activity
//!
//! Owns a core [`Sequence`] and evaluates it on every scheduler tick,
//! reporting each [`TickResult`](idlemmo_core::TickResult) to its parent
//! PlayerActor. It stops on an explicit stop, or when either the parent or
//! the scheduler goes away, and always deregisters from the scheduler before
//! telling the parent it has terminated.

use crate::actor::ActorId;
use crate::error::{Error, Result};
use crate::player::{PlayerHandle, PlayerMsg};
use crate::scheduler::SchedulerHandle;
use idlemmo_core::{EquipmentBonus, GameRng, PlayerId, Sequence};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info};

/// Messages accepted by a SequenceActor
#[derive(Debug)]
pub enum SequenceMsg {
    Tick { at: Instant },
    UpdateBonus(EquipmentBonus),
    Stop,
}

/// Handle to a running SequenceActor
#[derive(Debug, Clone)]
pub struct SequenceHandle {
    id: ActorId,
    tx: mpsc::UnboundedSender<SequenceMsg>,
}

impl SequenceHandle {
    pub fn id(&self) -> ActorId {
        self.id
    }

    fn send(&self, msg: SequenceMsg) -> Result<()> {
        self.tx
            .send(msg)
            .map_err(|_| Error::MailboxClosed("sequence"))
    }

    pub fn update_bonus(&self, bonus: EquipmentBonus) -> Result<()> {
        self.send(SequenceMsg::UpdateBonus(bonus))
    }

    pub fn stop(&self) -> Result<()> {
        self.send(SequenceMsg::Stop)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the actor has exited
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

/// Everything a SequenceActor is spawned with
pub struct SequenceParams {
    pub player: PlayerId,
    pub sequence: Sequence,
    pub bonus: EquipmentBonus,
    pub parent: PlayerHandle,
    pub scheduler: SchedulerHandle,
    pub seed: u64,
}

struct SequenceActor {
    id: ActorId,
    player: PlayerId,
    sequence: Sequence,
    bonus: EquipmentBonus,
    parent: PlayerHandle,
    scheduler: SchedulerHandle,
    rng: GameRng,
}

impl SequenceActor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SequenceMsg>) {
        info!(
            player = %self.player,
            activity = %self.sequence.activity(),
            level = self.sequence.level(),
            "sequence started"
        );

        loop {
            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(SequenceMsg::Tick { .. }) => {
                        let result = self.sequence.tick(&self.bonus, &mut self.rng);
                        let report = PlayerMsg::SequenceResult { from: self.id, result };
                        if self.parent.send(report).is_err() {
                            break;
                        }
                    }
                    Some(SequenceMsg::UpdateBonus(bonus)) => {
                        debug!(player = %self.player, ?bonus, "sequence bonus updated");
                        self.bonus = bonus;
                    }
                    Some(SequenceMsg::Stop) | None => break,
                },
                _ = self.parent.closed() => break,
                _ = self.scheduler.closed() => break,
            }
        }

        let _ = self.scheduler.remove_target(self.id);
        let _ = self.parent.send(PlayerMsg::SequenceTerminated { from: self.id });
        info!(
            player = %self.player,
            activity = %self.sequence.activity(),
            level = self.sequence.level(),
            "sequence stopped"
        );
    }
}

/// Spawn a SequenceActor and register it with the scheduler
///
/// Registration is sent from the caller's task so it is ordered after any
/// scheduler message the caller sent before.
pub fn spawn_sequence(params: SequenceParams) -> Result<SequenceHandle> {
    let (tx, rx) = mpsc::unbounded_channel();
    let id = ActorId::next();
    params.scheduler.add_target(
        id,
        params.player.clone(),
        tx.clone(),
        params.sequence.interval(),
    )?;

    let actor = SequenceActor {
        id,
        player: params.player,
        sequence: params.sequence,
        bonus: params.bonus,
        parent: params.parent,
        scheduler: params.scheduler,
        rng: GameRng::new(params.seed),
    };
    tokio::spawn(actor.run(rx));
    Ok(SequenceHandle { id, tx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::spawn_scheduler;
    use idlemmo_core::ActivityConfig;
    use std::time::Duration;

    fn mining() -> Sequence {
        let mut cfg = ActivityConfig::new("mining", 10, 2.0);
        cfg.tick_interval = 1.0;
        cfg.exp_rate = 1.0;
        cfg.level_up_exp = 1_000;
        Sequence::new(cfg, None, 3)
    }

    fn spawn_with(
        scheduler: &SchedulerHandle,
    ) -> (SequenceHandle, mpsc::UnboundedReceiver<PlayerMsg>) {
        let (parent, parent_rx) = PlayerHandle::detached(PlayerId::new("alice"));
        let handle = spawn_sequence(SequenceParams {
            player: PlayerId::new("alice"),
            sequence: mining(),
            bonus: EquipmentBonus::default(),
            parent,
            scheduler: scheduler.clone(),
            seed: 1,
        })
        .unwrap();
        (handle, parent_rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_reports_tick_results() {
        let scheduler = spawn_scheduler(Duration::from_millis(200));
        let (handle, mut parent_rx) = spawn_with(&scheduler);

        match parent_rx.recv().await {
            Some(PlayerMsg::SequenceResult { from, result }) => {
                assert_eq!(from, handle.id());
                assert_eq!(result.gains, 16);
            }
            other => panic!("expected result, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_bonus_update_applies_to_next_tick() {
        let scheduler = spawn_scheduler(Duration::from_millis(200));
        let (handle, mut parent_rx) = spawn_with(&scheduler);
        handle
            .update_bonus(EquipmentBonus {
                gain_multiplier: 1.0,
                ..Default::default()
            })
            .unwrap();

        match parent_rx.recv().await {
            Some(PlayerMsg::SequenceResult { result, .. }) => assert_eq!(result.gains, 32),
            other => panic!("expected result, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_deregisters_then_reports() {
        let scheduler = spawn_scheduler(Duration::from_millis(200));
        let (handle, mut parent_rx) = spawn_with(&scheduler);
        assert_eq!(scheduler.target_count().await.unwrap(), 1);

        handle.stop().unwrap();
        loop {
            match parent_rx.recv().await {
                Some(PlayerMsg::SequenceTerminated { from }) => {
                    assert_eq!(from, handle.id());
                    break;
                }
                Some(_) => continue,
                None => panic!("parent channel closed"),
            }
        }
        assert_eq!(scheduler.target_count().await.unwrap(), 0);
        handle.closed().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_parent_goes_away() {
        let scheduler = spawn_scheduler(Duration::from_millis(200));
        let (handle, parent_rx) = spawn_with(&scheduler);
        drop(parent_rx);

        handle.closed().await;
        assert_eq!(scheduler.target_count().await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_scheduler_goes_away() {
        let scheduler = spawn_scheduler(Duration::from_millis(200));
        let (handle, _parent_rx) = spawn_with(&scheduler);
        scheduler.stop().unwrap();
        handle.closed().await;
        assert!(handle.is_closed());
    }
}
