//! Live streaming connections and broadcast fanout.
//!
//! A [`ConnectionSet`] holds the open connections of one counter key. Sets
//! live in the [`ConnectionRegistry`], not in actor memory, so they survive
//! an actor being evicted and rebuilt: the new instance picks up the same
//! set and keeps fanning out to the sockets that are still attached.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tally_core::{CounterKey, UpdateMessage};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Identifier of one streaming connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a fresh identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Liveness of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Open,
    Closing,
    Closed,
}

/// Frames queued for a connection's socket writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Counter update text frame.
    Update(UpdateMessage),
    /// Close the socket with this code and reason.
    Close { code: u16, reason: String },
}

/// Failure to hand a frame to one connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendFailure {
    /// The socket side is gone.
    #[error("connection {0} is closed")]
    Closed(ConnectionId),
    /// The connection's queue is full; the client is not keeping up.
    #[error("connection {0} is not draining its queue")]
    Full(ConnectionId),
}

impl SendFailure {
    /// Connection the failure belongs to.
    #[must_use]
    pub const fn connection(&self) -> ConnectionId {
        match self {
            Self::Closed(id) | Self::Full(id) => *id,
        }
    }
}

/// One streaming client attachment.
///
/// The actor side only holds the sending half of the connection's queue.
/// Clones share that queue. Once every clone is dropped the queue closes,
/// which ends the socket task.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    tx: mpsc::Sender<Outbound>,
    state: ConnectionState,
}

impl Connection {
    /// Create a connection with a bounded queue of `buffer` frames.
    ///
    /// Returns the connection and the receiver the socket writer drains.
    #[must_use]
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let connection = Self {
            id: ConnectionId::new(),
            tx,
            state: ConnectionState::Open,
        };
        (connection, rx)
    }

    /// Connection identifier.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Current liveness.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    fn send(&self, frame: Outbound) -> Result<(), SendFailure> {
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendFailure::Full(self.id),
            mpsc::error::TrySendError::Closed(_) => SendFailure::Closed(self.id),
        })
    }
}

/// Result of one fanout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanoutReport {
    /// Connections that accepted the update
    pub delivered: usize,
    /// Connections removed because the send failed
    pub dropped: Vec<ConnectionId>,
}

/// The live connections of one counter key, in join order.
#[derive(Debug)]
pub struct ConnectionSet {
    key: CounterKey,
    connections: Vec<Connection>,
}

impl ConnectionSet {
    /// Create an empty set for `key`.
    #[must_use]
    pub fn new(key: CounterKey) -> Self {
        Self {
            key,
            connections: Vec::new(),
        }
    }

    /// Register `connection` and send it a snapshot of `count`.
    ///
    /// # Errors
    ///
    /// Returns `SendFailure` if the snapshot cannot be queued; the
    /// connection is not kept in that case.
    pub fn join(&mut self, connection: Connection, count: i64) -> Result<(), SendFailure> {
        connection.send(Outbound::Update(UpdateMessage::update(count)))?;
        debug!(key = %self.key, connection = %connection.id(), count, "Connection joined");
        self.connections.push(connection);
        Ok(())
    }

    /// Remove a connection. Unknown ids are ignored.
    pub fn leave(&mut self, id: ConnectionId) -> Option<Connection> {
        let index = self.connections.iter().position(|c| c.id == id)?;
        let mut connection = self.connections.remove(index);
        connection.state = ConnectionState::Closed;
        debug!(key = %self.key, connection = %id, "Connection left");
        Some(connection)
    }

    /// Queue a close frame for a connection and remove it.
    pub fn close(&mut self, id: ConnectionId, code: u16, reason: impl Into<String>) -> bool {
        let Some(index) = self.connections.iter().position(|c| c.id == id) else {
            return false;
        };
        let mut connection = self.connections.remove(index);
        connection.state = ConnectionState::Closing;
        if let Err(e) = connection.send(Outbound::Close {
            code,
            reason: reason.into(),
        }) {
            debug!(key = %self.key, error = %e, "Close frame not queued");
        }
        true
    }

    /// Send `count` to every connection.
    ///
    /// A failed send removes that connection only; the others still
    /// receive the update.
    pub fn broadcast(&mut self, count: i64) -> FanoutReport {
        let frame = Outbound::Update(UpdateMessage::update(count));
        let mut report = FanoutReport::default();
        let key = &self.key;

        self.connections.retain(|connection| match connection.send(frame.clone()) {
            Ok(()) => {
                report.delivered = report.delivered.saturating_add(1);
                true
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Dropping connection after failed send");
                report.dropped.push(e.connection());
                false
            }
        });

        report
    }

    /// Whether `id` is registered.
    #[must_use]
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.iter().any(|c| c.id == id)
    }

    /// Ids in join order.
    #[must_use]
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(Connection::id).collect()
    }

    /// Number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connection is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

/// A connection set shared between the registry and the owning actor.
pub type SharedConnectionSet = Arc<tokio::sync::Mutex<ConnectionSet>>;

/// Connection sets of every key, independent of actor lifetimes.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    sets: Mutex<HashMap<CounterKey, SharedConnectionSet>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set for `key`, created empty on first use.
    #[must_use]
    pub fn set_for(&self, key: &CounterKey) -> SharedConnectionSet {
        let mut sets = self.sets.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            sets.entry(key.clone())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(ConnectionSet::new(key.clone())))),
        )
    }

    /// Number of live connections on `key`.
    pub async fn connection_count(&self, key: &CounterKey) -> usize {
        let set = {
            let sets = self.sets.lock().unwrap_or_else(PoisonError::into_inner);
            sets.get(key).map(Arc::clone)
        };
        match set {
            Some(set) => set.lock().await.len(),
            None => 0,
        }
    }

    /// Forget the set for `key` if it holds no connection.
    ///
    /// Returns `false` while connections are attached or the set is
    /// locked elsewhere; the set is kept in both cases.
    pub fn release_if_empty(&self, key: &CounterKey) -> bool {
        let mut sets = self.sets.lock().unwrap_or_else(PoisonError::into_inner);
        let idle = match sets.get(key) {
            Some(set) => set.try_lock().is_ok_and(|set| set.is_empty()),
            None => return true,
        };
        if idle {
            sets.remove(key);
        }
        idle
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.sets.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
