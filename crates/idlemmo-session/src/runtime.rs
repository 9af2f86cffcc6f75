//! SessionRuntime - wires the actors together
//!
//! Starting a runtime spawns the scheduler, the persistence actor and the
//! gateway on the current tokio runtime. Everything a transport needs goes
//! through the returned value: open a connection, attach it to a player,
//! dispatch decoded commands, report closed connections, and finally shut
//! down with every loaded player saved.

use crate::config::SessionConfig;
use crate::connection::{Connection, ConnectionId};
use crate::error::Result;
use crate::gateway::{spawn_gateway, GatewayHandle, GatewayParams};
use crate::messages::{ClientCommand, Notification};
use crate::persist::{spawn_persist, PersistHandle};
use crate::player::PlayerHandle;
use crate::scheduler::{spawn_scheduler, SchedulerHandle};
use idlemmo_core::{Catalog, PlayerId};
use idlemmo_db::Repository;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

/// A running session engine
pub struct SessionRuntime {
    config: Arc<SessionConfig>,
    catalog: Arc<Catalog>,
    seed: u64,
    scheduler: SchedulerHandle,
    persist: PersistHandle,
    gateway: GatewayHandle,
}

impl SessionRuntime {
    /// Spawn all session actors
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: SessionConfig,
        catalog: impl Into<Arc<Catalog>>,
        repo: Arc<dyn Repository>,
    ) -> Self {
        let config = Arc::new(config);
        let catalog = catalog.into();
        let seed = config.resolve_seed();

        let scheduler = spawn_scheduler(config.scheduler_resolution());
        let persist = spawn_persist(repo, config.load_timeout(), config.expiry_check_interval());
        let gateway = spawn_gateway(GatewayParams {
            catalog: Arc::clone(&catalog),
            config: Arc::clone(&config),
            seed,
            scheduler: scheduler.clone(),
            persist: persist.clone(),
        });

        info!(
            seed,
            activities = catalog.activities.len(),
            equipment = catalog.equipment.len(),
            "session runtime started"
        );
        Self {
            config,
            catalog,
            seed,
            scheduler,
            persist,
            gateway,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Base seed every actor RNG is derived from
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn scheduler(&self) -> &SchedulerHandle {
        &self.scheduler
    }

    pub fn persist(&self) -> &PersistHandle {
        &self.persist
    }

    pub fn gateway(&self) -> &GatewayHandle {
        &self.gateway
    }

    /// New outbound connection sized from the configuration
    pub fn open_connection(&self) -> (Connection, mpsc::Receiver<Notification>) {
        Connection::channel(self.config.outbound_buffer())
    }

    /// Attach a connection to a player
    pub fn connect(
        &self,
        player: impl Into<PlayerId>,
        conn: Connection,
        request_state: bool,
    ) -> Result<()> {
        self.gateway.connect(player.into(), conn, request_state)
    }

    /// Run a command for a player and wait for its primary notification
    pub async fn dispatch(
        &self,
        player: impl Into<PlayerId>,
        command: ClientCommand,
    ) -> Result<Notification> {
        self.gateway.dispatch(player.into(), command).await
    }

    /// Decode a JSON command frame and dispatch it
    pub async fn dispatch_json(&self, player: impl Into<PlayerId>, raw: &str) -> Result<Notification> {
        let command = ClientCommand::from_json(raw)?;
        self.dispatch(player, command).await
    }

    /// Report that a transport connection went away
    pub fn connection_closed(&self, player: impl Into<PlayerId>, conn_id: ConnectionId) -> Result<()> {
        self.gateway.connection_closed(player.into(), conn_id)
    }

    /// Handle of a player's session, spawning it if needed
    pub async fn resolve(&self, player: impl Into<PlayerId>) -> Result<PlayerHandle> {
        self.gateway.resolve(player.into()).await
    }

    /// Number of live sessions
    pub async fn player_count(&self) -> Result<usize> {
        self.gateway.player_count().await
    }

    /// Stop every session, wait for their saves, then stop the services
    pub async fn shutdown(self) -> Result<()> {
        self.gateway.shutdown().await?;
        self.persist.flush().await?;
        self.persist.stop()?;
        self.scheduler.stop()?;
        info!("session runtime stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::ActorId;
    use crate::error::ErrorKind;
    use crate::player::PlayerMsg;
    use idlemmo_core::{
        ActivityConfig, ActivityId, EquipmentAttributes, EquipmentDefinition, EquipmentState,
        ItemId, PlayerSnapshot, Quality, Slot, SubProject, SubProjectId, TickResult,
    };
    use idlemmo_db::MemoryRepository;
    use std::time::Duration;

    fn catalog() -> Catalog {
        let mut mining = ActivityConfig::new("mining", 10, 2.0);
        mining.tick_interval = 1.0;
        mining.level_up_exp = 1_000;
        mining.sub_projects.push(SubProject {
            id: SubProjectId::new("deep_vein"),
            name: "Deep Vein".to_string(),
            unlock_level: 5,
            description: String::new(),
            gain_multiplier: 2.0,
            rare_chance_bonus: 0.0,
            exp_multiplier: 0.0,
            interval_modifier: 0.0,
            extra_drops: Vec::new(),
        });

        let mut woodcutting = ActivityConfig::new("woodcutting", 10, 1.0);
        woodcutting.tick_interval = 60.0;
        woodcutting.level_up_exp = 1_000;

        let pickaxe = |id: &str| EquipmentDefinition {
            id: ItemId::new(id),
            name: id.to_string(),
            slot: Slot::Weapon,
            quality: Quality::Common,
            description: String::new(),
            attributes: EquipmentAttributes {
                gain_multiplier: 0.5,
                ..Default::default()
            },
        };

        Catalog::new()
            .with_activity(mining)
            .with_activity(woodcutting)
            .with_equipment(pickaxe("pick_a"))
            .with_equipment(pickaxe("pick_b"))
    }

    fn config() -> SessionConfig {
        SessionConfig {
            scheduler_resolution_ms: 100,
            rng_seed: Some(7),
            ..Default::default()
        }
    }

    fn start(config: SessionConfig) -> (SessionRuntime, Arc<MemoryRepository>) {
        let repo = Arc::new(MemoryRepository::new());
        let runtime = SessionRuntime::start(config, catalog(), repo.clone());
        (runtime, repo)
    }

    fn snapshot(player: &str) -> PlayerSnapshot {
        let mut snap = PlayerSnapshot::new(PlayerId::new(player));
        snap.seq_levels.insert(ActivityId::new("mining"), 1);
        snap.seq_levels.insert(ActivityId::new("woodcutting"), 1);
        snap
    }

    async fn recv(rx: &mut mpsc::Receiver<Notification>) -> Notification {
        tokio::time::timeout(Duration::from_secs(30), rx.recv())
            .await
            .expect("no notification in time")
            .expect("connection closed")
    }

    async fn recv_kind(rx: &mut mpsc::Receiver<Notification>, kind: &str) -> Notification {
        loop {
            let n = recv(rx).await;
            if n.kind() == kind {
                return n;
            }
        }
    }

    fn start_cmd(seq: &str) -> ClientCommand {
        ClientCommand::StartSequence {
            seq_id: ActivityId::new(seq),
            sub_project_id: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_player_seeds_every_activity() {
        let (rt, _repo) = start(config());
        let (conn, mut rx) = rt.open_connection();
        rt.connect("alice", conn, false).unwrap();

        assert_eq!(
            recv(&mut rx).await,
            Notification::NewPlayer {
                player_id: PlayerId::new("alice")
            }
        );
        let snap = rt.resolve("alice").await.unwrap().snapshot().await.unwrap();
        assert_eq!(snap.seq_levels.len(), 2);
        assert!(snap.seq_levels.values().all(|&level| level == 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_gain() {
        let (rt, repo) = start(config());
        let mut snap = snapshot("alice");
        snap.seq_levels.insert(ActivityId::new("mining"), 3);
        repo.insert(snap);

        let (conn, mut rx) = rt.open_connection();
        rt.connect("alice", conn, false).unwrap();
        assert_eq!(recv(&mut rx).await.kind(), "load_ok");

        match rt.dispatch("alice", start_cmd("mining")).await.unwrap() {
            Notification::SequenceStarted {
                level,
                tick_interval_secs,
                ..
            } => {
                assert_eq!(level, 3);
                assert_eq!(tick_interval_secs, 1.0);
            }
            other => panic!("unexpected {:?}", other),
        }

        match recv_kind(&mut rx, "sequence_result").await {
            Notification::SequenceResult { gains, level, .. } => {
                assert_eq!(gains, 16);
                assert_eq!(level, 3);
            }
            other => panic!("unexpected {:?}", other),
        }
        let snap = rt.resolve("alice").await.unwrap().snapshot().await.unwrap();
        assert!(snap.exp >= 16);
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_reward_on_reconnect() {
        let (rt, repo) = start(config());
        let mut snap = PlayerSnapshot::new(PlayerId::new("alice"));
        snap.seq_levels.insert(ActivityId::new("woodcutting"), 5);
        repo.insert(snap);

        let (conn, mut rx) = rt.open_connection();
        let first = conn.id();
        rt.connect("alice", conn, true).unwrap();
        assert_eq!(recv(&mut rx).await.kind(), "load_ok");
        assert_eq!(recv(&mut rx).await.kind(), "reconnected");

        rt.connection_closed("alice", first).unwrap();
        tokio::time::sleep(Duration::from_secs(3600)).await;

        let (conn, mut rx) = rt.open_connection();
        rt.connect("alice", conn, true).unwrap();
        match recv(&mut rx).await {
            Notification::OfflineReward {
                gains,
                offline_duration_secs,
                ..
            } => {
                assert_eq!(gains, 900);
                assert_eq!(offline_duration_secs, 3600);
            }
            other => panic!("unexpected {:?}", other),
        }
        match recv(&mut rx).await {
            Notification::Reconnected { state: Some(view) } => assert_eq!(view.exp, 900),
            other => panic!("unexpected {:?}", other),
        }

        rt.persist().flush().await.unwrap();
        assert_eq!(repo.get(&PlayerId::new("alice")).unwrap().exp, 900);
    }

    #[tokio::test(start_paused = true)]
    async fn test_equip_rolls_back_when_inventory_full() {
        let (rt, repo) = start(SessionConfig {
            inventory_limit: 2,
            ..config()
        });
        let mut snap = snapshot("alice");
        snap.equipment.insert(
            Slot::Weapon,
            EquipmentState {
                item_id: ItemId::new("pick_a"),
                enhancement: 0,
            },
        );
        snap.inventory.insert(ItemId::new("pick_b"), 2);
        snap.inventory.insert(ItemId::new("ore"), 5);
        repo.insert(snap.clone());

        let err = rt
            .dispatch(
                "alice",
                ClientCommand::EquipItem {
                    item_id: ItemId::new("pick_b"),
                    enhancement: 0,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Capacity);

        let after = rt.resolve("alice").await.unwrap().snapshot().await.unwrap();
        assert_eq!(after.equipment, snap.equipment);
        assert_eq!(after.inventory, snap.inventory);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_player_is_persisted_and_reloaded() {
        let (rt, repo) = start(SessionConfig {
            default_offline_limit_hours: 1,
            scheduler_resolution_ms: 1000,
            ..config()
        });
        let mut snap = snapshot("alice");
        snap.inventory.insert(ItemId::new("ore"), 5);
        repo.insert(snap);

        let (conn, mut rx) = rt.open_connection();
        let conn_id = conn.id();
        rt.connect("alice", conn, false).unwrap();
        assert_eq!(recv(&mut rx).await.kind(), "load_ok");
        let used = rt
            .dispatch(
                "alice",
                ClientCommand::UseItem {
                    item_id: ItemId::new("ore"),
                    count: 2,
                },
            )
            .await
            .unwrap();
        assert!(matches!(used, Notification::ItemUsed { exp: 20, .. }));

        let first = rt.resolve("alice").await.unwrap();
        rt.connection_closed("alice", conn_id).unwrap();
        tokio::time::sleep(Duration::from_secs(3600 + 180)).await;

        first.closed().await;
        assert_eq!(rt.player_count().await.unwrap(), 0);
        rt.persist().flush().await.unwrap();
        assert_eq!(rt.persist().registered_count().await.unwrap(), 0);
        let stored = repo.get(&PlayerId::new("alice")).unwrap();
        assert_eq!(stored.exp, 20);

        let (conn, mut rx) = rt.open_connection();
        rt.connect("alice", conn, false).unwrap();
        match recv(&mut rx).await {
            Notification::LoadOk { exp, bag, .. } => {
                assert_eq!(exp, 20);
                assert_eq!(bag.get(&ItemId::new("ore")), Some(&3));
            }
            other => panic!("unexpected {:?}", other),
        }
        let second = rt.resolve("alice").await.unwrap();
        assert_ne!(second.id(), first.id());
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_tick_result_is_ignored() {
        let (rt, _repo) = start(config());
        let handle = rt.resolve("alice").await.unwrap();
        rt.dispatch("alice", ClientCommand::ListBag).await.unwrap();

        handle
            .send(PlayerMsg::SequenceResult {
                from: ActorId::next(),
                result: TickResult {
                    activity: ActivityId::new("mining"),
                    gains: 1_000,
                    items: Vec::new(),
                    rare: None,
                    level: 9,
                    cur_exp: 0,
                    leveled: true,
                    sub_project: None,
                },
            })
            .unwrap();

        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.exp, 0);
        assert_eq!(snap.seq_levels.get(&ActivityId::new("mining")), Some(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_scheduler_target_per_player() {
        let (rt, _repo) = start(config());
        rt.dispatch("alice", start_cmd("mining")).await.unwrap();
        rt.dispatch("alice", start_cmd("woodcutting")).await.unwrap();
        rt.dispatch("bob", start_cmd("mining")).await.unwrap();

        assert_eq!(rt.scheduler().target_count().await.unwrap(), 2);
        let status = rt.resolve("alice").await.unwrap().status().await.unwrap();
        assert_eq!(status.current_activity, Some(ActivityId::new("woodcutting")));
        assert_eq!(
            rt.scheduler().target_of(PlayerId::new("alice")).await.unwrap(),
            status.sequence_actor
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_start_keeps_running_activity() {
        let (rt, _repo) = start(config());
        rt.dispatch("alice", start_cmd("mining")).await.unwrap();

        let err = rt.dispatch("alice", start_cmd("sailing")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let locked = rt
            .dispatch(
                "alice",
                ClientCommand::StartSequence {
                    seq_id: ActivityId::new("mining"),
                    sub_project_id: Some(SubProjectId::new("deep_vein")),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(locked.kind(), ErrorKind::Validation);

        let status = rt.resolve("alice").await.unwrap().status().await.unwrap();
        assert_eq!(status.current_activity, Some(ActivityId::new("mining")));
        assert_eq!(rt.scheduler().target_count().await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_sequence() {
        let (rt, _repo) = start(config());
        rt.dispatch("alice", start_cmd("mining")).await.unwrap();
        let ended = rt.dispatch("alice", ClientCommand::StopSequence).await.unwrap();
        assert_eq!(
            ended,
            Notification::SequenceEnded {
                seq_id: Some(ActivityId::new("mining"))
            }
        );
        let status = rt.resolve("alice").await.unwrap().status().await.unwrap();
        assert_eq!(status.current_activity, None);
        assert_eq!(status.sequence_actor, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_wait_for_load() {
        let (rt, repo) = start(config());
        let mut snap = snapshot("alice");
        snap.exp = 77;
        repo.insert(snap);
        repo.set_load_delay(Some(Duration::from_secs(2)));

        let (conn, mut rx) = rt.open_connection();
        rt.connect("alice", conn, false).unwrap();
        match rt.dispatch("alice", ClientCommand::Login).await.unwrap() {
            Notification::LoginOk { view, .. } => assert_eq!(view.exp, 77),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(recv(&mut rx).await.kind(), "load_ok");
        assert_eq!(recv(&mut rx).await.kind(), "login_ok");
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_timeout_starts_new_player() {
        let (rt, repo) = start(config());
        let mut snap = snapshot("alice");
        snap.exp = 77;
        repo.insert(snap);
        repo.set_load_delay(Some(Duration::from_secs(10)));

        let (conn, mut rx) = rt.open_connection();
        rt.connect("alice", conn, false).unwrap();
        assert_eq!(recv(&mut rx).await.kind(), "new_player");
        match rt.dispatch("alice", ClientCommand::Login).await.unwrap() {
            Notification::LoginOk { view, .. } => assert_eq!(view.exp, 0),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_latest_connection_close_counts() {
        let (rt, _repo) = start(config());
        let (conn1, mut rx1) = rt.open_connection();
        let (conn2, mut rx2) = rt.open_connection();
        let (id1, id2) = (conn1.id(), conn2.id());

        rt.connect("alice", conn1, false).unwrap();
        assert_eq!(recv(&mut rx1).await.kind(), "new_player");
        rt.connect("alice", conn2, false).unwrap();
        assert_eq!(
            recv(&mut rx2).await,
            Notification::Reconnected { state: None }
        );

        rt.connection_closed("alice", id1).unwrap();
        let status = rt.resolve("alice").await.unwrap().status().await.unwrap();
        assert!(status.online);
        assert!(status.connected);

        rt.connection_closed("alice", id2).unwrap();
        let status = rt.resolve("alice").await.unwrap().status().await.unwrap();
        assert!(!status.online);
        assert!(!status.connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_close_after_session_stopped() {
        let (rt, _repo) = start(config());
        let (conn, mut rx) = rt.open_connection();
        let conn_id = conn.id();
        rt.connect("alice", conn, false).unwrap();
        assert_eq!(recv(&mut rx).await.kind(), "new_player");

        // stop the session behind the gateway's back
        let stale = rt.resolve("alice").await.unwrap();
        let (reply, done) = tokio::sync::oneshot::channel();
        stale.send(PlayerMsg::Shutdown { reply: Some(reply) }).unwrap();
        done.await.unwrap();
        stale.closed().await;

        rt.connection_closed("alice", conn_id).unwrap();
        assert_eq!(rt.player_count().await.unwrap(), 1);

        let bag = rt.dispatch("alice", ClientCommand::ListBag).await.unwrap();
        assert_eq!(bag.kind(), "bag_info");
        let fresh = rt.resolve("alice").await.unwrap();
        assert_ne!(fresh.id(), stale.id());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_command_notifies_connection() {
        let (rt, _repo) = start(config());
        let (conn, mut rx) = rt.open_connection();
        rt.connect("alice", conn, false).unwrap();

        let err = rt
            .dispatch_json("alice", r#"{"type":"use_item","item_id":"potion","count":1}"#)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        match recv_kind(&mut rx, "error").await {
            Notification::Error { kind, .. } => assert_eq!(kind, "not_found"),
            other => panic!("unexpected {:?}", other),
        }

        let bad = rt.dispatch_json("alice", r#"{"type":"teleport"}"#).await.unwrap_err();
        assert_eq!(bad.kind(), ErrorKind::Validation);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_saves_loaded_players() {
        let (rt, repo) = start(config());
        let (conn, mut rx) = rt.open_connection();
        rt.connect("alice", conn, false).unwrap();
        assert_eq!(recv(&mut rx).await.kind(), "new_player");
        rt.dispatch("alice", start_cmd("mining")).await.unwrap();

        rt.shutdown().await.unwrap();
        let stored = repo.get(&PlayerId::new("alice")).unwrap();
        assert_eq!(stored.seq_levels.len(), 2);
    }
}
