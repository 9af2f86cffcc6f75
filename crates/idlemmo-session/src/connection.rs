//! Outbound connection sinks
//!
//! The session never sees transport framing. A transport adapter creates a
//! [`Connection`] with [`Connection::channel`], hands the sender side to the
//! session, and forwards whatever arrives on the receiver to the client.

use crate::messages::Notification;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of one client connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn:{}", self.0)
    }
}

/// Bounded outbound sink for one client
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    tx: mpsc::Sender<Notification>,
}

impl Connection {
    /// Create a connection and the receiver its transport drains
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (
            Self {
                id: ConnectionId::next(),
                tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// True once the transport dropped its receiver
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Queue a notification without waiting
    ///
    /// A full buffer drops the notification; returns whether it was queued.
    pub fn send(&self, notification: Notification) -> bool {
        match self.tx.try_send(notification) {
            Ok(()) => true,
            Err(TrySendError::Full(n)) => {
                warn!(conn = %self.id, kind = n.kind(), "outbound buffer full, dropping notification");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(conn = %self.id, "send on closed connection");
                false
            }
        }
    }
}
