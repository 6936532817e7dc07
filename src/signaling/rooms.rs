//! Room table
//!
//! Maps room names to their members. A room exists only while it has at
//! least one member and never holds more than [`ROOM_CAPACITY`].

use super::ConnectionId;
use serde::Serialize;
use std::collections::HashMap;

/// Maximum members per room (caller and callee)
pub const ROOM_CAPACITY: usize = 2;

/// Result of a join attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Room did not exist; the joiner is its host
    Created,
    /// Joiner became the second member
    Joined,
    /// Room already at capacity; membership unchanged
    Full,
}

/// Introspection view of one room
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomSummary {
    pub name: String,
    pub members: usize,
}

#[derive(Debug, Default)]
pub struct RoomTable {
    rooms: HashMap<String, Vec<ConnectionId>>,
}

impl RoomTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room, creating the room on first join.
    ///
    /// Whether the connection already sits in another room is checked by the
    /// relay, not here.
    pub fn join(&mut self, room: &str, id: ConnectionId) -> JoinOutcome {
        let members = self.rooms.entry(room.to_string()).or_default();
        if members.len() >= ROOM_CAPACITY {
            return JoinOutcome::Full;
        }
        members.push(id);
        if members.len() == 1 {
            JoinOutcome::Created
        } else {
            JoinOutcome::Joined
        }
    }

    /// Remove a connection from a room, deleting the room once empty.
    /// Returns the members that remain.
    pub fn leave(&mut self, room: &str, id: ConnectionId) -> Vec<ConnectionId> {
        let remaining = match self.rooms.get_mut(room) {
            Some(members) => {
                members.retain(|member| *member != id);
                members.clone()
            }
            None => return Vec::new(),
        };
        if remaining.is_empty() {
            self.rooms.remove(room);
        }
        remaining
    }

    /// Other members of the room
    pub fn peers_of(&self, room: &str, id: ConnectionId) -> Vec<ConnectionId> {
        self.rooms
            .get(room)
            .map(|members| members.iter().copied().filter(|m| *m != id).collect())
            .unwrap_or_default()
    }

    pub fn members(&self, room: &str) -> &[ConnectionId] {
        self.rooms.get(room).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn member_count(&self, room: &str) -> usize {
        self.members(room).len()
    }

    pub fn is_paired(&self, room: &str) -> bool {
        self.member_count(room) == ROOM_CAPACITY
    }

    #[cfg(test)]
    fn contains(&self, room: &str) -> bool {
        self.rooms.contains_key(room)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn paired_count(&self) -> usize {
        self.rooms.values().filter(|m| m.len() == ROOM_CAPACITY).count()
    }

    /// Rooms sorted by name
    pub fn snapshot(&self) -> Vec<RoomSummary> {
        let mut rooms: Vec<RoomSummary> = self
            .rooms
            .iter()
            .map(|(name, members)| RoomSummary {
                name: name.clone(),
                members: members.len(),
            })
            .collect();
        rooms.sort_by(|a, b| a.name.cmp(&b.name));
        rooms
    }
}
