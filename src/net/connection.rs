//! Admitted connections and their identity.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Bundle an accepted stream with the slot that admitted it, so the slot
//!   lives exactly as long as the session that owns the connection

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::TcpStream;

use crate::net::admission::AdmissionSlot;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// An accepted, admitted TCP connection awaiting its echo session.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    peer_addr: SocketAddr,
    stream: TcpStream,
    slot: AdmissionSlot,
}

impl Connection {
    pub fn new(stream: TcpStream, peer_addr: SocketAddr, slot: AdmissionSlot) -> Self {
        Self {
            id: ConnectionId::new(),
            peer_addr,
            stream,
            slot,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Split into the raw stream and the slot guard.
    pub fn into_parts(self) -> (TcpStream, AdmissionSlot) {
        (self.stream, self.slot)
    }
}
