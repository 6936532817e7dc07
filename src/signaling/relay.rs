//! Signaling relay
//!
//! Applies the room state machine to inbound client messages:
//! - `join` answers `created` / `joined` / `full` depending on room size
//! - `ready`, `offer`, `answer` go to the other member of a paired room
//! - `ice-candidate` goes to the other member of the sender's room
//! - `leave` and transport close remove the sender and notify the survivor
//!
//! Out-of-sequence messages are dropped, never answered with an error.
//! All state sits behind a single lock; outbound messages are queued on the
//! recipients' unbounded outboxes while it is held, so every connection sees
//! one global order and each sender's messages arrive in send order.

use super::{
    ClientMessage, ConnectionId, ConnectionRegistry, JoinOutcome, Outbound, RoomSummary, RoomTable,
    ServerMessage, WireFormat,
};
use log::{debug, info};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

/// Relay counters and gauges
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RelayStats {
    pub connections: usize,
    pub rooms: usize,
    pub paired_rooms: usize,
    pub rooms_created: u64,
    pub joins_rejected: u64,
    pub messages_relayed: u64,
}

#[derive(Debug, Default)]
struct RelayState {
    registry: ConnectionRegistry,
    rooms: RoomTable,
}

impl RelayState {
    /// Returns `None` when the sender already occupies a room
    fn join(&mut self, id: ConnectionId, room: String) -> Option<JoinOutcome> {
        if let Some(current) = self.registry.room_of(id) {
            debug!("{} tried to join {} while in {}", id, room, current);
            return None;
        }

        let outcome = self.rooms.join(&room, id);
        let reply = match outcome {
            JoinOutcome::Created => {
                info!("Room {} created by {}", room, id);
                self.registry.set_room(id, Some(room));
                ServerMessage::Created
            }
            JoinOutcome::Joined => {
                info!("{} joined room {}", id, room);
                self.registry.set_room(id, Some(room));
                ServerMessage::Joined
            }
            JoinOutcome::Full => {
                info!("Room {} is full, rejecting {}", room, id);
                ServerMessage::Full
            }
        };
        self.registry.send(id, reply);
        Some(outcome)
    }

    /// Send to every other member of `room`, provided the sender is in it.
    /// Returns the number of deliveries.
    fn broadcast(
        &self,
        id: ConnectionId,
        room: &str,
        message: ServerMessage,
        require_paired: bool,
    ) -> usize {
        if self.registry.room_of(id) != Some(room) {
            debug!("Dropping {} from {}: not a member of {}", message.event(), id, room);
            return 0;
        }
        if require_paired && !self.rooms.is_paired(room) {
            debug!("Dropping {} from {}: room {} is not paired", message.event(), id, room);
            return 0;
        }

        let mut delivered = 0;
        for peer in self.rooms.peers_of(room, id) {
            if self.registry.send(peer, message.clone()) {
                delivered += 1;
            }
        }
        debug!("Relayed {} from {} to {} peer(s) in {}", message.event(), id, delivered, room);
        delivered
    }

    /// Remove `id` from `room` and tell whoever remains.
    ///
    /// Shared by explicit `leave` and transport close.
    fn depart(&mut self, id: ConnectionId, room: &str) -> usize {
        let remaining = self.rooms.leave(room, id);
        self.registry.set_room(id, None);
        if remaining.is_empty() {
            info!("{} left room {}, room removed", id, room);
        } else {
            info!("{} left room {}", id, room);
        }

        remaining
            .into_iter()
            .filter(|peer| self.registry.send(*peer, ServerMessage::Leave))
            .count()
    }

    fn disconnect(&mut self, id: ConnectionId) -> bool {
        if let Some(room) = self.registry.room_of(id).map(str::to_owned) {
            self.depart(id, &room);
        }
        match self.registry.unregister(id) {
            Some(entry) => {
                info!("Connection {} closed after {:.1}s", id, entry.age().as_secs_f64());
                true
            }
            None => false,
        }
    }
}

/// The signaling relay shared by every connection task
#[derive(Debug, Default)]
pub struct SignalingRelay {
    state: Mutex<RelayState>,
    rooms_created: AtomicU64,
    joins_rejected: AtomicU64,
    messages_relayed: AtomicU64,
}

impl SignalingRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection and hand back its identifier and outbox
    pub fn connect(&self) -> (ConnectionId, mpsc::UnboundedReceiver<Outbound>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().registry.register(id, tx);
        info!("Connection {} registered", id);
        (id, rx)
    }

    /// Fix the framing used for everything later queued to `id`.
    /// The first decodable frame decides; later calls are ignored.
    pub fn adopt_wire_format(&self, id: ConnectionId, wire_format: WireFormat) -> bool {
        let adopted = self.state.lock().registry.adopt_wire_format(id, wire_format);
        if adopted {
            debug!("Connection {} speaks {:?}", id, wire_format);
        }
        adopted
    }

    /// Dispatch one inbound message from `id`
    pub fn handle(&self, id: ConnectionId, message: ClientMessage) {
        let mut state = self.state.lock();
        if !state.registry.contains(id) {
            debug!("Ignoring {} from unregistered connection {}", message.event(), id);
            return;
        }

        let relayed = match message {
            ClientMessage::Join { room } => {
                match state.join(id, room) {
                    Some(JoinOutcome::Created) => {
                        self.rooms_created.fetch_add(1, Ordering::Relaxed);
                    }
                    Some(JoinOutcome::Full) => {
                        self.joins_rejected.fetch_add(1, Ordering::Relaxed);
                    }
                    _ => {}
                }
                0
            }
            ClientMessage::Ready { room } => state.broadcast(id, &room, ServerMessage::Ready, true),
            ClientMessage::Offer { payload, room } => {
                state.broadcast(id, &room, ServerMessage::Offer { payload }, true)
            }
            ClientMessage::Answer { payload, room } => {
                state.broadcast(id, &room, ServerMessage::Answer { payload }, true)
            }
            ClientMessage::IceCandidate { payload, room } => {
                state.broadcast(id, &room, ServerMessage::IceCandidate { payload }, false)
            }
            ClientMessage::Leave { room } => {
                if state.registry.room_of(id) == Some(room.as_str()) {
                    state.depart(id, &room)
                } else {
                    debug!("Ignoring leave of {} from {}: not a member", room, id);
                    0
                }
            }
        };

        if relayed > 0 {
            self.messages_relayed.fetch_add(relayed as u64, Ordering::Relaxed);
        }
    }

    /// Transport closed: leave the connection's room (notifying the peer)
    /// and forget it. Calling this twice is harmless.
    pub fn disconnect(&self, id: ConnectionId) {
        let mut state = self.state.lock();
        if !state.disconnect(id) {
            debug!("Connection {} already unregistered", id);
        }
    }

    /// Room the connection currently occupies
    pub fn room_of(&self, id: ConnectionId) -> Option<String> {
        self.state.lock().registry.room_of(id).map(str::to_owned)
    }

    pub fn rooms(&self) -> Vec<RoomSummary> {
        self.state.lock().rooms.snapshot()
    }

    pub fn connection_count(&self) -> usize {
        self.state.lock().registry.len()
    }

    pub fn stats(&self) -> RelayStats {
        let state = self.state.lock();
        RelayStats {
            connections: state.registry.len(),
            rooms: state.rooms.len(),
            paired_rooms: state.rooms.paired_count(),
            rooms_created: self.rooms_created.load(Ordering::Relaxed),
            joins_rejected: self.joins_rejected.load(Ordering::Relaxed),
            messages_relayed: self.messages_relayed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::mpsc::error::TryRecvError;

    fn join(room: &str) -> ClientMessage {
        ClientMessage::Join { room: room.to_string() }
    }

    type Peer = (ConnectionId, mpsc::UnboundedReceiver<Outbound>);

    fn drain(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(outbound) = rx.try_recv() {
            out.push(outbound.message);
        }
        out
    }

    /// Two connections paired in `room`, outboxes already drained
    fn paired(relay: &SignalingRelay, room: &str) -> (Peer, Peer) {
        let (a, mut a_rx) = relay.connect();
        let (b, mut b_rx) = relay.connect();
        relay.handle(a, join(room));
        relay.handle(b, join(room));
        assert_eq!(drain(&mut a_rx), vec![ServerMessage::Created]);
        assert_eq!(drain(&mut b_rx), vec![ServerMessage::Joined]);
        ((a, a_rx), (b, b_rx))
    }

    #[test]
    fn test_join_created_joined_full() {
        let relay = SignalingRelay::new();
        let ((a, mut a_rx), (b, mut b_rx)) = paired(&relay, "abc123");
        let (c, mut c_rx) = relay.connect();

        relay.handle(c, join("abc123"));
        assert_eq!(drain(&mut c_rx), vec![ServerMessage::Full]);
        assert_eq!(relay.room_of(c), None);
        assert!(drain(&mut a_rx).is_empty());
        assert!(drain(&mut b_rx).is_empty());

        assert_eq!(relay.room_of(a).as_deref(), Some("abc123"));
        assert_eq!(relay.room_of(b).as_deref(), Some("abc123"));
        assert_eq!(relay.rooms(), vec![RoomSummary { name: "abc123".to_string(), members: 2 }]);

        let stats = relay.stats();
        assert_eq!(stats.joins_rejected, 1);
        assert_eq!(stats.rooms_created, 1);
        assert_eq!(stats.paired_rooms, 1);
    }

    #[test]
    fn test_second_join_while_in_room_is_ignored() {
        let relay = SignalingRelay::new();
        let (a, mut a_rx) = relay.connect();
        relay.handle(a, join("one"));
        relay.handle(a, join("two"));

        assert_eq!(drain(&mut a_rx), vec![ServerMessage::Created]);
        assert_eq!(relay.room_of(a).as_deref(), Some("one"));
        assert_eq!(relay.rooms().len(), 1);
    }

    #[test]
    fn test_ready_and_negotiation_reach_only_the_peer() {
        let relay = SignalingRelay::new();
        let ((a, mut a_rx), (b, mut b_rx)) = paired(&relay, "abc123");
        let offer = json!({"type": "offer", "sdp": "v=0\r\no=- 1 2 IN IP4 127.0.0.1\r\n"});
        let answer = json!({"type": "answer", "sdp": "v=0\r\n"});
        let candidate = json!({
            "candidate": "candidate:1 1 udp 1 10.0.0.1 5000 typ host",
            "sdpMLineIndex": 0
        });
        let room = || "abc123".to_string();

        relay.handle(b, ClientMessage::Ready { room: room() });
        relay.handle(a, ClientMessage::Offer { payload: offer.clone(), room: room() });
        relay.handle(b, ClientMessage::Answer { payload: answer.clone(), room: room() });
        relay.handle(a, ClientMessage::IceCandidate { payload: candidate.clone(), room: room() });

        assert_eq!(
            drain(&mut a_rx),
            vec![ServerMessage::Ready, ServerMessage::Answer { payload: answer }]
        );
        assert_eq!(
            drain(&mut b_rx),
            vec![
                ServerMessage::Offer { payload: offer },
                ServerMessage::IceCandidate { payload: candidate },
            ]
        );
        assert_eq!(relay.stats().messages_relayed, 4);
    }

    #[test]
    fn test_out_of_sequence_messages_are_dropped() {
        let relay = SignalingRelay::new();
        let (a, mut a_rx) = relay.connect();
        let (x, mut x_rx) = relay.connect();

        // No room yet
        relay.handle(a, ClientMessage::Offer { payload: json!({}), room: "r".to_string() });
        relay.handle(a, ClientMessage::Leave { room: "r".to_string() });
        assert!(drain(&mut a_rx).is_empty());

        // Waiting room: ready/offer need a peer, candidates have nobody to go to
        relay.handle(a, join("r"));
        drain(&mut a_rx);
        relay.handle(a, ClientMessage::Ready { room: "r".to_string() });
        relay.handle(a, ClientMessage::IceCandidate { payload: json!("c"), room: "r".to_string() });
        assert!(drain(&mut a_rx).is_empty());

        // Non-member naming someone else's room
        let (b, mut b_rx) = relay.connect();
        relay.handle(b, join("r"));
        drain(&mut b_rx);
        relay.handle(x, ClientMessage::Offer { payload: json!({}), room: "r".to_string() });
        relay.handle(x, ClientMessage::Leave { room: "r".to_string() });
        assert!(drain(&mut a_rx).is_empty());
        assert!(drain(&mut b_rx).is_empty());
        assert!(drain(&mut x_rx).is_empty());

        // Member naming the wrong room
        relay.handle(a, ClientMessage::Offer { payload: json!({}), room: "elsewhere".to_string() });
        assert!(drain(&mut b_rx).is_empty());
        assert_eq!(relay.rooms()[0].members, 2);
    }

    #[test]
    fn test_leave_notifies_peer_and_removes_empty_room() {
        let relay = SignalingRelay::new();
        let ((a, mut a_rx), (b, mut b_rx)) = paired(&relay, "abc123");

        relay.handle(b, ClientMessage::Leave { room: "abc123".to_string() });
        assert_eq!(drain(&mut a_rx), vec![ServerMessage::Leave]);
        assert!(drain(&mut b_rx).is_empty());
        assert_eq!(relay.room_of(b), None);

        relay.handle(a, ClientMessage::Leave { room: "abc123".to_string() });
        assert!(relay.rooms().is_empty());

        let (c, mut c_rx) = relay.connect();
        relay.handle(c, join("abc123"));
        assert_eq!(drain(&mut c_rx), vec![ServerMessage::Created]);
    }

    #[test]
    fn test_disconnect_matches_leave() {
        let relay = SignalingRelay::new();
        let ((a, mut a_rx), (b, b_rx)) = paired(&relay, "abc123");

        drop(b_rx);
        relay.disconnect(b);
        relay.disconnect(b);
        assert_eq!(drain(&mut a_rx), vec![ServerMessage::Leave]);
        assert_eq!(relay.rooms(), vec![RoomSummary { name: "abc123".to_string(), members: 1 }]);
        assert_eq!(relay.connection_count(), 1);

        // Host now alone; a newcomer becomes the second member
        let (c, mut c_rx) = relay.connect();
        relay.handle(c, join("abc123"));
        assert_eq!(drain(&mut c_rx), vec![ServerMessage::Joined]);

        relay.disconnect(a);
        relay.disconnect(c);
        assert!(relay.rooms().is_empty());
        assert_eq!(relay.connection_count(), 0);
    }

    #[test]
    fn test_outbox_closes_after_disconnect() {
        let relay = SignalingRelay::new();
        let (a, mut a_rx) = relay.connect();
        relay.handle(a, join("r"));
        relay.disconnect(a);

        assert_eq!(a_rx.try_recv().unwrap().message, ServerMessage::Created);
        assert_eq!(a_rx.try_recv(), Err(TryRecvError::Disconnected));

        // Messages from a forgotten connection go nowhere
        relay.handle(a, join("r"));
        assert!(relay.rooms().is_empty());
    }

    #[test]
    fn test_replies_keep_first_wire_format() {
        let relay = SignalingRelay::new();
        let (a, mut a_rx) = relay.connect();
        let (b, mut b_rx) = relay.connect();

        assert!(relay.adopt_wire_format(a, WireFormat::EventArray));
        relay.handle(a, join("r"));
        assert!(!relay.adopt_wire_format(a, WireFormat::Tagged));
        relay.handle(b, join("r"));
        relay.handle(b, ClientMessage::Ready { room: "r".to_string() });

        let a_out: Vec<Outbound> = std::iter::from_fn(|| a_rx.try_recv().ok()).collect();
        assert_eq!(
            a_out,
            vec![
                Outbound { message: ServerMessage::Created, wire_format: WireFormat::EventArray },
                Outbound { message: ServerMessage::Ready, wire_format: WireFormat::EventArray },
            ]
        );
        let b_out = b_rx.try_recv().unwrap();
        assert_eq!(b_out.wire_format, WireFormat::Tagged);
        assert!(!relay.adopt_wire_format(ConnectionId::new(), WireFormat::Tagged));
    }

    #[test]
    fn test_concurrent_joins_admit_exactly_two() {
        const RACERS: usize = 16;
        let relay = Arc::new(SignalingRelay::new());
        let connections: Vec<_> = (0..RACERS).map(|_| relay.connect()).collect();
        let ids: Vec<ConnectionId> = connections.iter().map(|(id, _)| *id).collect();

        std::thread::scope(|scope| {
            for id in &ids {
                let relay = relay.clone();
                scope.spawn(move || relay.handle(*id, join("race")));
            }
        });

        let mut created = 0;
        let mut joined = 0;
        let mut full = 0;
        for (_, mut rx) in connections {
            for msg in drain(&mut rx) {
                match msg {
                    ServerMessage::Created => created += 1,
                    ServerMessage::Joined => joined += 1,
                    ServerMessage::Full => full += 1,
                    other => panic!("unexpected {:?}", other),
                }
            }
        }

        assert_eq!(created, 1);
        assert_eq!(joined, 1);
        assert_eq!(full, RACERS - 2);
        assert_eq!(relay.rooms(), vec![RoomSummary { name: "race".to_string(), members: 2 }]);
    }
}
