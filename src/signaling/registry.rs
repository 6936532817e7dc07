//! Connection registry
//!
//! Tracks live signaling connections, the outbox each one is written through,
//! the framing it speaks, and the room (if any) each one currently occupies.

use super::{ServerMessage, WireFormat};
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Process-unique identifier assigned when a connection is accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
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
        write!(f, "{}", self.0)
    }
}

/// A queued message, stamped with the recipient's framing at queue time
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub message: ServerMessage,
    pub wire_format: WireFormat,
}

/// Bookkeeping for one live connection
#[derive(Debug)]
pub struct ConnectionEntry {
    /// Room currently occupied
    room: Option<String>,
    /// Framing adopted from the first decodable frame
    wire_format: Option<WireFormat>,
    /// Outbound queue drained by the connection's writer task
    outbox: mpsc::UnboundedSender<Outbound>,
    /// Accept time
    connected_at: Instant,
}

impl ConnectionEntry {
    pub fn room(&self) -> Option<&str> {
        self.room.as_deref()
    }

    pub fn wire_format(&self) -> WireFormat {
        self.wire_format.unwrap_or_default()
    }

    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

/// Registry of live connections
///
/// Room membership is only changed by the relay, in lock-step with the
/// room table.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, ConnectionEntry>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a freshly accepted connection with no room
    pub fn register(&mut self, id: ConnectionId, outbox: mpsc::UnboundedSender<Outbound>) {
        self.connections.insert(
            id,
            ConnectionEntry {
                room: None,
                wire_format: None,
                outbox,
                connected_at: Instant::now(),
            },
        );
    }

    /// Record the connection's room membership
    pub fn set_room(&mut self, id: ConnectionId, room: Option<String>) {
        if let Some(entry) = self.connections.get_mut(&id) {
            entry.room = room;
        }
    }

    pub fn room_of(&self, id: ConnectionId) -> Option<&str> {
        self.connections.get(&id).and_then(|entry| entry.room())
    }

    /// Fix the connection's framing. Only the first call has an effect;
    /// returns whether this call set it.
    pub fn adopt_wire_format(&mut self, id: ConnectionId, wire_format: WireFormat) -> bool {
        match self.connections.get_mut(&id) {
            Some(entry) if entry.wire_format.is_none() => {
                entry.wire_format = Some(wire_format);
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Remove a connection; a no-op when it is already gone.
    ///
    /// Dropping the entry closes its outbox, which ends the writer task once
    /// queued messages are drained.
    pub fn unregister(&mut self, id: ConnectionId) -> Option<ConnectionEntry> {
        self.connections.remove(&id)
    }

    /// Queue a message for a connection in its current framing. Returns false
    /// when the connection is unknown or its writer has gone away.
    pub fn send(&self, id: ConnectionId, message: ServerMessage) -> bool {
        match self.connections.get(&id) {
            Some(entry) => {
                let wire_format = entry.wire_format();
                entry.outbox.send(Outbound { message, wire_format }).is_ok()
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
