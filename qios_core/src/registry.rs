//! Connection Registry - live nodes and observers.
//!
//! A connection enters the registry on handshake (no role yet), joins one of
//! the two role sets when it registers, and leaves on transport disconnect.
//! Sends to a connection that is gone are dropped and logged, never surfaced.

use crate::error::RegistryError;
use crate::protocol::{Outbound, Role};
use qios_env::{ConnId, ConnectionSink};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Boxed outbound half of a connection.
pub type BoxedSink = Box<dyn ConnectionSink<Outbound>>;

struct Peer {
    /// Role, once registered
    role: Option<Role>,

    /// Registration order (scheduler snapshots follow it)
    seq: u64,

    sink: BoxedSink,
}

#[derive(Default)]
struct Peers {
    by_id: HashMap<ConnId, Peer>,
    next_seq: u64,
}

/// Registry of live connections, shared by every component.
///
/// Critical sections are short and never span an await point.
#[derive(Default)]
pub struct ConnectionRegistry {
    peers: Mutex<Peers>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn peers(&self) -> MutexGuard<'_, Peers> {
        // A panic while holding the lock leaves the map itself consistent
        self.peers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Handshake: attaches the outbound sink of a new connection.
    pub fn connect(&self, conn: ConnId, sink: impl ConnectionSink<Outbound>) {
        let mut peers = self.peers();
        let seq = peers.next_seq;
        peers.next_seq += 1;
        peers.by_id.insert(
            conn,
            Peer {
                role: None,
                seq,
                sink: Box::new(sink),
            },
        );
        debug!(conn = %conn, "connection attached");
    }

    /// Assigns a role. Idempotent: a connection keeps its first role.
    ///
    /// Returns `true` only when the role was newly assigned.
    pub fn register(&self, conn: ConnId, role: Role) -> bool {
        let mut peers = self.peers();
        let seq = peers.next_seq;
        let Some(peer) = peers.by_id.get_mut(&conn) else {
            debug!(conn = %conn, ?role, "register for unknown connection ignored");
            return false;
        };
        if peer.role.is_some() {
            return false;
        }
        peer.role = Some(role);
        peer.seq = seq;
        peers.next_seq += 1;
        true
    }

    /// Removes a connection and returns the role it held, if any.
    pub fn unregister(&self, conn: ConnId) -> Result<Option<Role>, RegistryError> {
        self.peers()
            .by_id
            .remove(&conn)
            .map(|peer| peer.role)
            .ok_or(RegistryError::NotFound(conn))
    }

    /// Delivers to one connection. Stale targets are a logged no-op.
    ///
    /// Returns whether the message was queued.
    pub fn send_to(&self, conn: ConnId, message: Outbound) -> bool {
        let peers = self.peers();
        let Some(peer) = peers.by_id.get(&conn) else {
            debug!(conn = %conn, "dropping message for stale connection");
            return false;
        };
        match peer.sink.deliver(message) {
            Ok(()) => true,
            Err(e) => {
                debug!(conn = %conn, error = %e, "dropping message for closed connection");
                false
            }
        }
    }

    /// Delivers to every connection holding `role`. Returns the delivered count.
    pub fn broadcast(&self, role: Role, message: Outbound) -> usize {
        self.fan_out(|peer| peer.role == Some(role), message)
    }

    /// Delivers to every connection, registered or not.
    pub fn broadcast_all(&self, message: Outbound) -> usize {
        self.fan_out(|_| true, message)
    }

    fn fan_out(&self, include: impl Fn(&Peer) -> bool, message: Outbound) -> usize {
        self.peers()
            .by_id
            .values()
            .filter(|peer| include(peer))
            .filter(|peer| peer.sink.deliver(message.clone()).is_ok())
            .count()
    }

    pub fn count(&self, role: Role) -> usize {
        self.peers()
            .by_id
            .values()
            .filter(|peer| peer.role == Some(role))
            .count()
    }

    /// Total attached connections, including unregistered ones.
    pub fn connected(&self) -> usize {
        self.peers().by_id.len()
    }

    pub fn role_of(&self, conn: ConnId) -> Option<Role> {
        self.peers().by_id.get(&conn).and_then(|peer| peer.role)
    }

    /// Node identifiers in registration order.
    pub fn node_ids(&self) -> Vec<ConnId> {
        let peers = self.peers();
        let mut nodes: Vec<(u64, ConnId)> = peers
            .by_id
            .iter()
            .filter(|(_, peer)| peer.role == Some(Role::Node))
            .map(|(id, peer)| (peer.seq, *id))
            .collect();
        nodes.sort_unstable();
        nodes.into_iter().map(|(_, id)| id).collect()
    }
}
