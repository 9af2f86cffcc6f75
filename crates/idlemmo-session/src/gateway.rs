//! GatewayActor - the player registry
//!
//! Maps player IDs to live PlayerActors and routes every connection and
//! command message through that map. A PlayerActor is spawned on first use
//! and replaced transparently when the stored one has stopped, so a message
//! racing with an expiring session reaches its successor instead of being
//! lost.

use crate::actor::ActorId;
use crate::config::SessionConfig;
use crate::connection::{Connection, ConnectionId};
use crate::error::{Error, Result};
use crate::messages::{ClientCommand, Notification};
use crate::persist::PersistHandle;
use crate::player::{spawn_player, CommandReply, PlayerContext, PlayerHandle, PlayerMsg};
use crate::scheduler::SchedulerHandle;
use idlemmo_core::{Catalog, PlayerId};
use indexmap::IndexMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Messages accepted by the gateway
#[derive(Debug)]
pub enum GatewayMsg {
    Connect {
        player: PlayerId,
        conn: Connection,
        request_state: bool,
    },
    Dispatch {
        player: PlayerId,
        command: ClientCommand,
        reply: Option<CommandReply>,
    },
    ConnectionClosed {
        player: PlayerId,
        conn_id: ConnectionId,
    },
    Resolve {
        player: PlayerId,
        reply: oneshot::Sender<PlayerHandle>,
    },
    /// Sent by a stopping PlayerActor; ignored unless `id` is still registered
    Unregister {
        player: PlayerId,
        id: ActorId,
    },
    /// A message a stopped PlayerActor received too late to handle
    Redeliver {
        player: PlayerId,
        msg: PlayerMsg,
    },
    PlayerCount {
        reply: oneshot::Sender<usize>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to the gateway actor
#[derive(Debug, Clone)]
pub struct GatewayHandle {
    tx: mpsc::UnboundedSender<GatewayMsg>,
}

impl GatewayHandle {
    fn send(&self, msg: GatewayMsg) -> Result<()> {
        self.tx.send(msg).map_err(|_| Error::MailboxClosed("gateway"))
    }

    /// Attach a connection to a player, spawning its session if needed
    pub fn connect(&self, player: PlayerId, conn: Connection, request_state: bool) -> Result<()> {
        self.send(GatewayMsg::Connect {
            player,
            conn,
            request_state,
        })
    }

    /// Route a command without waiting for its outcome
    pub fn submit(&self, player: PlayerId, command: ClientCommand) -> Result<()> {
        self.send(GatewayMsg::Dispatch {
            player,
            command,
            reply: None,
        })
    }

    /// Route a command and wait for its primary notification
    pub async fn dispatch(&self, player: PlayerId, command: ClientCommand) -> Result<Notification> {
        let (reply, rx) = oneshot::channel();
        self.send(GatewayMsg::Dispatch {
            player,
            command,
            reply: Some(reply),
        })?;
        rx.await.map_err(|_| Error::MailboxClosed("player"))?
    }

    pub fn connection_closed(&self, player: PlayerId, conn_id: ConnectionId) -> Result<()> {
        self.send(GatewayMsg::ConnectionClosed { player, conn_id })
    }

    /// Handle of the live session for `player`, spawning one if needed
    pub async fn resolve(&self, player: PlayerId) -> Result<PlayerHandle> {
        let (reply, rx) = oneshot::channel();
        self.send(GatewayMsg::Resolve { player, reply })?;
        rx.await.map_err(|_| Error::MailboxClosed("gateway"))
    }

    pub fn unregister(&self, player: PlayerId, id: ActorId) -> Result<()> {
        self.send(GatewayMsg::Unregister { player, id })
    }

    pub fn redeliver(&self, player: PlayerId, msg: PlayerMsg) -> Result<()> {
        self.send(GatewayMsg::Redeliver { player, msg })
    }

    /// Number of registered sessions
    pub async fn player_count(&self) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.send(GatewayMsg::PlayerCount { reply })?;
        rx.await.map_err(|_| Error::MailboxClosed("gateway"))
    }

    /// Shut every session down, saving loaded players, then stop
    pub async fn shutdown(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(GatewayMsg::Shutdown { reply })?;
        rx.await.map_err(|_| Error::MailboxClosed("gateway"))
    }

    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

struct GatewayActor {
    players: IndexMap<PlayerId, PlayerHandle>,
    ctx: PlayerContext,
}

impl GatewayActor {
    fn resolve(&mut self, player: &PlayerId) -> PlayerHandle {
        if let Some(handle) = self.players.get(player) {
            if !handle.is_closed() {
                return handle.clone();
            }
            debug!(player = %player, stale = %handle.id(), "replacing stopped session");
        }
        let handle = spawn_player(player.clone(), self.ctx.clone());
        info!(player = %player, actor = %handle.id(), "session spawned");
        self.players.insert(player.clone(), handle.clone());
        handle
    }

    /// Deliver to the live session, retrying once on a fresh one
    fn deliver(&mut self, player: PlayerId, msg: PlayerMsg) {
        let handle = self.resolve(&player);
        let Err(msg) = handle.deliver(msg) else {
            return;
        };
        self.players.shift_remove(&player);
        let handle = self.resolve(&player);
        if handle.deliver(msg).is_err() {
            warn!(player = %player, "session stopped before delivery, message dropped");
        }
    }

    async fn shutdown(&mut self) {
        let mut pending = Vec::with_capacity(self.players.len());
        for (player, handle) in self.players.drain(..) {
            let (reply, rx) = oneshot::channel();
            if handle.send(PlayerMsg::Shutdown { reply: Some(reply) }).is_ok() {
                pending.push((player, rx));
            }
        }
        let count = pending.len();
        for (player, rx) in pending {
            if rx.await.is_err() {
                debug!(player = %player, "session stopped without acknowledging shutdown");
            }
        }
        info!(sessions = count, "gateway shut down");
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<GatewayMsg>) {
        info!("gateway started");
        while let Some(msg) = rx.recv().await {
            match msg {
                GatewayMsg::Connect {
                    player,
                    conn,
                    request_state,
                } => {
                    debug!(player = %player, conn = %conn.id(), request_state, "gateway connect");
                    self.deliver(
                        player,
                        PlayerMsg::AttachConnection {
                            conn,
                            request_state,
                        },
                    );
                }
                GatewayMsg::Dispatch {
                    player,
                    command,
                    reply,
                } => self.deliver(player, PlayerMsg::Execute { command, reply }),
                GatewayMsg::ConnectionClosed { player, conn_id } => {
                    if let Some(handle) = self.players.get(&player) {
                        if let Err(err) = handle.connection_closed(conn_id) {
                            debug!(
                                player = %player,
                                conn = %conn_id,
                                error = %err,
                                "connection closed for stopped session"
                            );
                        }
                    }
                }
                GatewayMsg::Resolve { player, reply } => {
                    let _ = reply.send(self.resolve(&player));
                }
                GatewayMsg::Unregister { player, id } => {
                    if self.players.get(&player).map(|h| h.id()) == Some(id) {
                        self.players.shift_remove(&player);
                        debug!(player = %player, actor = %id, "session unregistered");
                    }
                }
                GatewayMsg::Redeliver { player, msg } => {
                    debug!(player = %player, "redelivering to successor session");
                    self.deliver(player, msg);
                }
                GatewayMsg::PlayerCount { reply } => {
                    let _ = reply.send(self.players.len());
                }
                GatewayMsg::Shutdown { reply } => {
                    self.shutdown().await;
                    let _ = reply.send(());
                    break;
                }
            }
        }
    }
}

/// Everything the gateway needs to spawn sessions
pub struct GatewayParams {
    pub catalog: Arc<Catalog>,
    pub config: Arc<SessionConfig>,
    pub seed: u64,
    pub scheduler: SchedulerHandle,
    pub persist: PersistHandle,
}

/// Spawn the gateway on the current tokio runtime
pub fn spawn_gateway(params: GatewayParams) -> GatewayHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = GatewayHandle { tx };
    let actor = GatewayActor {
        players: IndexMap::new(),
        ctx: PlayerContext {
            catalog: params.catalog,
            config: params.config,
            seed: params.seed,
            scheduler: params.scheduler,
            persist: params.persist,
            gateway: handle.clone(),
        },
    };
    tokio::spawn(actor.run(rx));
    handle
}
