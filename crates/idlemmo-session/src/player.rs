//! PlayerActor - one session per live player
//!
//! The actor exclusively owns a [`PlayerState`]. It starts in a loading phase
//! in which connection and command messages are buffered until the snapshot
//! load completes (or times out); they are then replayed in arrival order.
//!
//! Presence follows the connection: a connection-closed signal for the most
//! recently attached connection takes the player offline, and attaching a
//! connection brings it back online, settling offline rewards first when the
//! caller asks for state. A periodic expiry check stops the actor once the
//! player has been offline longer than its limit; before stopping it saves,
//! leaves both registries, and hands any message still queued to the gateway
//! so that a successor actor picks it up.

use crate::actor::{now, ActorId};
use crate::config::SessionConfig;
use crate::connection::{Connection, ConnectionId};
use crate::error::{Error, Result};
use crate::gateway::GatewayHandle;
use crate::messages::{ClientCommand, Notification, PlayerView};
use crate::persist::PersistHandle;
use crate::scheduler::SchedulerHandle;
use crate::sequence::{spawn_sequence, SequenceHandle, SequenceParams};
use idlemmo_core::{
    hash_bytes_with_seed, hash_seed, ActivityId, Catalog, EquippedItemView, GameRng, ItemId,
    PlayerId, PlayerSnapshot, PlayerState, Sequence, SubProjectId, TickResult,
};
use indexmap::IndexMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Reply channel for an executed command
pub type CommandReply = oneshot::Sender<Result<Notification>>;

/// Messages accepted by a PlayerActor
#[derive(Debug)]
pub enum PlayerMsg {
    /// Snapshot load finished; `None` means new player
    Loaded { snapshot: Option<PlayerSnapshot> },
    AttachConnection {
        conn: Connection,
        request_state: bool,
    },
    DetachConnection { conn_id: ConnectionId },
    ConnectionClosed { conn_id: ConnectionId },
    Execute {
        command: ClientCommand,
        reply: Option<CommandReply>,
    },
    SequenceResult { from: ActorId, result: TickResult },
    SequenceTerminated { from: ActorId },
    CheckExpire,
    Snapshot { reply: oneshot::Sender<PlayerSnapshot> },
    Status { reply: oneshot::Sender<PlayerStatus> },
    Shutdown { reply: Option<oneshot::Sender<()>> },
}

/// Point-in-time description of a session
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerStatus {
    pub player_id: PlayerId,
    pub actor: ActorId,
    pub online: bool,
    pub offline_for: Option<Duration>,
    pub connected: bool,
    pub current_activity: Option<ActivityId>,
    pub sequence_actor: Option<ActorId>,
    pub level: u32,
    pub exp: i64,
}

/// Handle to a PlayerActor
#[derive(Debug, Clone)]
pub struct PlayerHandle {
    id: ActorId,
    player: PlayerId,
    tx: mpsc::UnboundedSender<PlayerMsg>,
}

impl PlayerHandle {
    pub fn id(&self) -> ActorId {
        self.id
    }

    pub fn player(&self) -> &PlayerId {
        &self.player
    }

    pub fn send(&self, msg: PlayerMsg) -> Result<()> {
        self.tx.send(msg).map_err(|_| Error::MailboxClosed("player"))
    }

    /// Send, handing the message back if the actor is gone
    pub(crate) fn deliver(&self, msg: PlayerMsg) -> std::result::Result<(), PlayerMsg> {
        self.tx.send(msg).map_err(|e| e.0)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the actor has stopped
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    pub fn attach(&self, conn: Connection, request_state: bool) -> Result<()> {
        self.send(PlayerMsg::AttachConnection {
            conn,
            request_state,
        })
    }

    pub fn connection_closed(&self, conn_id: ConnectionId) -> Result<()> {
        self.send(PlayerMsg::ConnectionClosed { conn_id })
    }

    pub fn check_expire(&self) -> Result<()> {
        self.send(PlayerMsg::CheckExpire)
    }

    /// Run a command and wait for its primary notification
    pub async fn execute(&self, command: ClientCommand) -> Result<Notification> {
        let (reply, rx) = oneshot::channel();
        self.send(PlayerMsg::Execute {
            command,
            reply: Some(reply),
        })?;
        rx.await.map_err(|_| Error::MailboxClosed("player"))?
    }

    pub async fn snapshot(&self) -> Result<PlayerSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(PlayerMsg::Snapshot { reply })?;
        rx.await.map_err(|_| Error::MailboxClosed("player"))
    }

    pub async fn status(&self) -> Result<PlayerStatus> {
        let (reply, rx) = oneshot::channel();
        self.send(PlayerMsg::Status { reply })?;
        rx.await.map_err(|_| Error::MailboxClosed("player"))
    }

    /// A handle wired to a bare channel instead of an actor
    #[cfg(test)]
    pub(crate) fn detached(player: PlayerId) -> (Self, mpsc::UnboundedReceiver<PlayerMsg>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                id: ActorId::next(),
                player,
                tx,
            },
            rx,
        )
    }
}

/// Shared collaborators every PlayerActor is spawned with
#[derive(Clone)]
pub struct PlayerContext {
    pub catalog: Arc<Catalog>,
    pub config: Arc<SessionConfig>,
    pub seed: u64,
    pub scheduler: SchedulerHandle,
    pub persist: PersistHandle,
    pub gateway: GatewayHandle,
}

enum Flow {
    Continue,
    Expired,
    Shutdown(Option<oneshot::Sender<()>>),
}

struct PlayerActor {
    me: PlayerHandle,
    ctx: PlayerContext,
    state: PlayerState,
    /// Messages held back until the snapshot load completes
    pending: Option<VecDeque<PlayerMsg>>,
    greeting: Option<Notification>,
    conn: Option<Connection>,
    last_conn: Option<ConnectionId>,
    current: Option<SequenceHandle>,
    rng: GameRng,
    player_hash: u64,
    spawned: u64,
}

impl PlayerActor {
    fn player(&self) -> &PlayerId {
        &self.state.player_id
    }

    fn notify(&self, notification: Notification) {
        if let Some(conn) = &self.conn {
            conn.send(notification);
        }
    }

    fn save(&self) {
        if let Err(err) = self.ctx.persist.save(self.state.snapshot()) {
            warn!(player = %self.player(), error = %err, "could not queue save");
        }
    }

    fn handle(&mut self, msg: PlayerMsg) -> Flow {
        let Some(pending) = self.pending.as_mut() else {
            return self.handle_active(msg);
        };
        match msg {
            PlayerMsg::Loaded { snapshot } => {
                self.on_loaded(snapshot);
                let buffered = self.pending.take().unwrap_or_default();
                for msg in buffered {
                    match self.handle_active(msg) {
                        Flow::Continue => {}
                        stop => return stop,
                    }
                }
                Flow::Continue
            }
            PlayerMsg::Shutdown { reply } => Flow::Shutdown(reply),
            PlayerMsg::CheckExpire => Flow::Continue,
            other => {
                pending.push_back(other);
                Flow::Continue
            }
        }
    }

    fn on_loaded(&mut self, snapshot: Option<PlayerSnapshot>) {
        let catalog = Arc::clone(&self.ctx.catalog);
        match snapshot {
            Some(snapshot) => {
                self.state.apply_snapshot(&snapshot, &catalog);
                self.state.ensure_sequence_defaults(&catalog);
                info!(player = %self.player(), exp = self.state.exp, "player loaded");
                self.greeting = Some(Notification::LoadOk {
                    exp: self.state.exp,
                    bag: self.state.inventory.to_counts(),
                    equipment: self.state.equipment.export_view(),
                    equipment_bonus: self.state.equipment_bonus(),
                    offline_limit_hours: self.state.offline_limit.as_secs() / 3600,
                });
            }
            None => {
                self.state.ensure_sequence_defaults(&catalog);
                info!(player = %self.player(), "new player initialized");
                self.greeting = Some(Notification::NewPlayer {
                    player_id: self.player().clone(),
                });
            }
        }
    }

    fn handle_active(&mut self, msg: PlayerMsg) -> Flow {
        match msg {
            PlayerMsg::Loaded { .. } => {
                warn!(player = %self.player(), "duplicate load result ignored");
            }
            PlayerMsg::AttachConnection {
                conn,
                request_state,
            } => self.attach(conn, request_state),
            PlayerMsg::DetachConnection { conn_id } => {
                if self.conn.as_ref().map(|c| c.id()) == Some(conn_id) {
                    debug!(player = %self.player(), conn = %conn_id, "connection detached");
                    self.conn = None;
                }
            }
            PlayerMsg::ConnectionClosed { conn_id } => self.connection_closed(conn_id),
            PlayerMsg::Execute { command, reply } => self.execute(command, reply),
            PlayerMsg::SequenceResult { from, result } => self.on_sequence_result(from, result),
            PlayerMsg::SequenceTerminated { from } => self.on_sequence_terminated(from),
            PlayerMsg::CheckExpire => {
                if self.state.is_expired(now()) {
                    return Flow::Expired;
                }
            }
            PlayerMsg::Snapshot { reply } => {
                let _ = reply.send(self.state.snapshot());
            }
            PlayerMsg::Status { reply } => {
                let _ = reply.send(self.status());
            }
            PlayerMsg::Shutdown { reply } => return Flow::Shutdown(reply),
        }
        Flow::Continue
    }

    fn status(&self) -> PlayerStatus {
        let now = now();
        PlayerStatus {
            player_id: self.player().clone(),
            actor: self.me.id(),
            online: self.state.is_online(),
            offline_for: self
                .state
                .offline_since()
                .map(|since| now.saturating_duration_since(since)),
            connected: self.conn.is_some(),
            current_activity: self.state.current_activity.clone(),
            sequence_actor: self.current.as_ref().map(|h| h.id()),
            level: self.state.current_level(),
            exp: self.state.exp,
        }
    }

    fn attach(&mut self, conn: Connection, request_state: bool) {
        let now = now();
        let conn_id = conn.id();
        if let Some(prev) = self.conn.replace(conn) {
            debug!(player = %self.player(), old = %prev.id(), new = %conn_id, "connection replaced");
        }
        self.last_conn = Some(conn_id);

        let greeted = match self.greeting.take() {
            Some(greeting) => {
                self.notify(greeting);
                true
            }
            None => false,
        };

        if request_state {
            let catalog = Arc::clone(&self.ctx.catalog);
            let reward = self.state.offline_reward(now, &catalog, &mut self.rng);
            let credited = !reward.is_empty();
            if credited {
                for (item, err) in self.state.credit_offline(&reward) {
                    warn!(player = %self.player(), item = %item, error = %err, "offline drop not added");
                }
                info!(
                    player = %self.player(),
                    gains = reward.gains,
                    offline_secs = reward.duration.as_secs(),
                    "offline reward settled"
                );
                self.notify(Notification::OfflineReward {
                    gains: reward.gains,
                    items: reward.items,
                    offline_duration_secs: reward.duration.as_secs(),
                    bag: self.state.inventory.to_counts(),
                });
            }
            self.state.set_online(now);
            self.notify(Notification::Reconnected {
                state: Some(PlayerView::of(&self.state)),
            });
            if credited {
                self.save();
            }
        } else {
            self.state.set_online(now);
            if !greeted {
                self.notify(Notification::Reconnected { state: None });
            }
        }
        info!(player = %self.player(), conn = %conn_id, request_state, "player online");
    }

    fn connection_closed(&mut self, conn_id: ConnectionId) {
        if self.last_conn != Some(conn_id) {
            debug!(player = %self.player(), conn = %conn_id, "stale connection close ignored");
            return;
        }
        if self.conn.as_ref().map(|c| c.id()) == Some(conn_id) {
            self.conn = None;
        }
        self.state.set_offline(now());
        self.save();
        info!(player = %self.player(), conn = %conn_id, "player offline");
    }

    fn execute(&mut self, command: ClientCommand, reply: Option<CommandReply>) {
        let name = command.name();
        let mutating = command.is_mutating();
        self.state.last_active = now();

        let result = self.run_command(command);
        match &result {
            Ok(notification) => {
                debug!(player = %self.player(), command = name, "command ok");
                self.notify(notification.clone());
                if mutating {
                    self.save();
                }
            }
            Err(err) => {
                warn!(player = %self.player(), command = name, error = %err, "command rejected");
                self.notify(Notification::error(err));
            }
        }
        if let Some(reply) = reply {
            let _ = reply.send(result);
        }
    }

    fn run_command(&mut self, command: ClientCommand) -> Result<Notification> {
        let catalog = Arc::clone(&self.ctx.catalog);
        match command {
            ClientCommand::Login => Ok(Notification::LoginOk {
                player_id: self.player().clone(),
                view: PlayerView::of(&self.state),
            }),
            ClientCommand::StartSequence {
                seq_id,
                sub_project_id,
            } => {
                let sub = sub_project_id.filter(|id| !id.is_empty());
                self.start_sequence(&catalog, seq_id, sub)
            }
            ClientCommand::StopSequence => {
                let seq_id = self.stop_sequence();
                Ok(Notification::SequenceEnded { seq_id })
            }
            ClientCommand::ListSequences => Ok(Notification::SequenceList {
                sequences: catalog.summaries(),
            }),
            ClientCommand::ListBag => Ok(Notification::BagInfo {
                bag: self.state.inventory.to_counts(),
            }),
            ClientCommand::ListEquipment { include_catalog } => {
                Ok(self.equipment_state(&catalog, include_catalog))
            }
            ClientCommand::EquipItem {
                item_id,
                enhancement,
            } => {
                let returned = self.state.equip_item(&item_id, enhancement, &catalog)?;
                let slot = match catalog.equipment(&item_id) {
                    Some(def) => def.slot,
                    None => return Err(idlemmo_core::Error::NotEquippable(item_id).into()),
                };
                self.push_bonus();
                Ok(Notification::EquipmentChanged {
                    slot,
                    equipped: Some(item_id),
                    returned: returned.map(|item| item.definition.id),
                    equipment: self.state.equipment.export_view(),
                    equipment_bonus: self.state.equipment_bonus(),
                })
            }
            ClientCommand::UnequipItem { slot } => {
                let item = self.state.unequip_item(&slot)?;
                self.push_bonus();
                Ok(Notification::EquipmentChanged {
                    slot: item.definition.slot,
                    equipped: None,
                    returned: Some(item.definition.id),
                    equipment: self.state.equipment.export_view(),
                    equipment_bonus: self.state.equipment_bonus(),
                })
            }
            ClientCommand::UseItem { item_id, count } => {
                let gain = self.state.use_item(&item_id, count)?;
                Ok(Notification::ItemUsed {
                    item_id,
                    count,
                    gain,
                    exp: self.state.exp,
                })
            }
            ClientCommand::RemoveItem { item_id, count } => {
                self.state.remove_item(&item_id, count)?;
                Ok(Notification::ItemRemoved {
                    item_id,
                    count,
                    bag: self.state.inventory.to_counts(),
                })
            }
        }
    }

    fn equipment_state(&self, catalog: &Catalog, include_catalog: bool) -> Notification {
        let catalog_view = include_catalog.then(|| {
            let mut view: IndexMap<ItemId, EquippedItemView> = catalog
                .equipment
                .values()
                .map(|def| (def.id.clone(), EquippedItemView::from_definition(def, 0)))
                .collect();
            view.sort_keys();
            view
        });
        Notification::EquipmentState {
            equipment: self.state.equipment.export_view(),
            equipment_bonus: self.state.equipment_bonus(),
            active_sub_project: self.state.active_sub_project.clone(),
            catalog: catalog_view,
        }
    }

    /// Validate, stop whatever is running, then spawn the new activity
    fn start_sequence(
        &mut self,
        catalog: &Catalog,
        seq_id: ActivityId,
        sub_project: Option<SubProjectId>,
    ) -> Result<Notification> {
        let level = self.state.level_of(&seq_id);
        let (cfg, sub) = catalog.resolve_start(&seq_id, sub_project.as_ref(), level)?;
        let sequence = Sequence::new(cfg.clone(), sub.cloned(), level);
        let interval = sequence.interval();

        self.stop_sequence();

        self.spawned += 1;
        let bonus = self.state.equipment_bonus();
        let handle = spawn_sequence(SequenceParams {
            player: self.player().clone(),
            sequence,
            bonus,
            parent: self.me.clone(),
            scheduler: self.ctx.scheduler.clone(),
            seed: hash_seed(self.ctx.seed, self.player_hash, self.spawned),
        })?;

        self.state.seq_levels.entry(seq_id.clone()).or_insert(level);
        self.state.current_activity = Some(seq_id.clone());
        self.state.active_sub_project = sub_project.clone();
        self.current = Some(handle);

        info!(player = %self.player(), activity = %seq_id, level, ?interval, "activity started");
        Ok(Notification::SequenceStarted {
            seq_id,
            level,
            sub_project_id: sub_project,
            tick_interval_secs: interval.as_secs_f64(),
            equipment_bonus: bonus,
        })
    }

    /// Stop the running activity, if any, and clear the pointer immediately
    fn stop_sequence(&mut self) -> Option<ActivityId> {
        if let Some(handle) = self.current.take() {
            let _ = handle.stop();
        }
        self.state.active_sub_project = None;
        let stopped = self.state.current_activity.take();
        if let Some(activity) = &stopped {
            info!(player = %self.player(), activity = %activity, "activity stopped");
        }
        stopped
    }

    fn push_bonus(&self) {
        if let Some(handle) = &self.current {
            let _ = handle.update_bonus(self.state.equipment_bonus());
        }
    }

    fn on_sequence_result(&mut self, from: ActorId, result: TickResult) {
        if self.current.as_ref().map(|h| h.id()) != Some(from) {
            debug!(player = %self.player(), from = %from, "late tick result ignored");
            return;
        }
        for (item, err) in self.state.apply_tick(&result) {
            warn!(player = %self.player(), item = %item, error = %err, "drop not added");
        }
        if result.leveled {
            info!(player = %self.player(), activity = %result.activity, level = result.level, "level up");
        }
        self.notify(Notification::SequenceResult {
            seq_id: result.activity,
            gains: result.gains,
            items: result.items,
            rare: result.rare,
            level: result.level,
            cur_exp: result.cur_exp,
            leveled: result.leveled,
            sub_project_id: result.sub_project,
            equipment_bonus: self.state.equipment_bonus(),
            bag: self.state.inventory.to_counts(),
        });
        self.save();
    }

    fn on_sequence_terminated(&mut self, from: ActorId) {
        if self.current.as_ref().map(|h| h.id()) != Some(from) {
            return;
        }
        self.current = None;
        self.state.active_sub_project = None;
        let seq_id = self.state.current_activity.take();
        info!(player = %self.player(), "activity ended");
        self.notify(Notification::SequenceEnded { seq_id });
    }

    /// Persist, leave both registries and pass on anything still queued
    async fn expire(mut self, mut rx: mpsc::UnboundedReceiver<PlayerMsg>) {
        let player = self.player().clone();
        let id = self.me.id();
        info!(player = %player, offline_limit = ?self.state.offline_limit, "session expired");

        self.stop_sequence();
        self.save();
        let _ = self.ctx.persist.unregister(player.clone(), id);
        let _ = self.ctx.gateway.unregister(player.clone(), id);

        rx.close();
        while let Some(msg) = rx.recv().await {
            match msg {
                msg @ (PlayerMsg::AttachConnection { .. }
                | PlayerMsg::Execute { .. }
                | PlayerMsg::Snapshot { .. }
                | PlayerMsg::Status { .. }) => {
                    let _ = self.ctx.gateway.redeliver(player.clone(), msg);
                }
                _ => {}
            }
        }
    }

    fn shutdown(mut self, loaded: bool, reply: Option<oneshot::Sender<()>>) {
        self.stop_sequence();
        if loaded {
            self.save();
        }
        let _ = self.ctx.persist.unregister(self.player().clone(), self.me.id());
        debug!(player = %self.player(), "player shut down");
        if let Some(reply) = reply {
            let _ = reply.send(());
        }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<PlayerMsg>) {
        while let Some(msg) = rx.recv().await {
            match self.handle(msg) {
                Flow::Continue => {}
                Flow::Expired => {
                    self.expire(rx).await;
                    return;
                }
                Flow::Shutdown(reply) => {
                    let loaded = self.pending.is_none();
                    self.shutdown(loaded, reply);
                    return;
                }
            }
        }
    }
}

/// Spawn a PlayerActor and start loading its snapshot
pub fn spawn_player(player: PlayerId, ctx: PlayerContext) -> PlayerHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = PlayerHandle {
        id: ActorId::next(),
        player: player.clone(),
        tx,
    };

    let state = PlayerState::new(
        player.clone(),
        ctx.config.inventory_limit,
        ctx.config.default_offline_limit(),
        now(),
    );
    let player_hash = hash_bytes_with_seed(player.as_str().as_bytes(), ctx.seed);

    if let Err(err) = ctx.persist.register(player.clone(), handle.clone()) {
        warn!(player = %player, error = %err, "could not register with persist");
    }
    if let Err(err) = ctx.persist.load(player.clone(), handle.clone()) {
        warn!(player = %player, error = %err, "could not request load, starting as new player");
        let _ = handle.send(PlayerMsg::Loaded { snapshot: None });
    }

    let actor = PlayerActor {
        me: handle.clone(),
        rng: GameRng::new(hash_seed(ctx.seed, player_hash, 0)),
        ctx,
        state,
        pending: Some(VecDeque::new()),
        greeting: None,
        conn: None,
        last_conn: None,
        current: None,
        player_hash,
        spawned: 0,
    };
    debug!(player = %player, actor = %handle.id(), "player actor spawned");
    tokio::spawn(actor.run(rx));
    handle
}
