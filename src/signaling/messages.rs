//! Signaling wire vocabulary
//!
//! Browser clients talk to the relay with named events. Two framings are
//! understood on the same endpoint:
//! - Tagged JSON: `{"event": "offer", "room": "abc", "payload": {...}}`
//! - Event array: `["offer", {...}, "abc"]` (event name followed by its arguments)
//!
//! The first frame that decodes fixes the framing used for every reply on
//! that connection.

use super::SignalingError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Messages sent by a client to the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Enter a room, creating it when unseen
    Join { room: String },

    /// Second joiner has local media and is ready for an offer
    Ready { room: String },

    /// Session description offer from the host
    Offer { payload: Value, room: String },

    /// Session description answer from the guest
    Answer { payload: Value, room: String },

    /// Trickled network candidate
    IceCandidate { payload: Value, room: String },

    /// Leave a room explicitly
    Leave { room: String },
}

impl ClientMessage {
    /// Room this message refers to
    pub fn room(&self) -> &str {
        match self {
            ClientMessage::Join { room }
            | ClientMessage::Ready { room }
            | ClientMessage::Offer { room, .. }
            | ClientMessage::Answer { room, .. }
            | ClientMessage::IceCandidate { room, .. }
            | ClientMessage::Leave { room } => room,
        }
    }

    /// Event name on the wire
    pub fn event(&self) -> &'static str {
        match self {
            ClientMessage::Join { .. } => "join",
            ClientMessage::Ready { .. } => "ready",
            ClientMessage::Offer { .. } => "offer",
            ClientMessage::Answer { .. } => "answer",
            ClientMessage::IceCandidate { .. } => "ice-candidate",
            ClientMessage::Leave { .. } => "leave",
        }
    }
}

/// Messages sent by the relay to a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Reply to `join`: the room was empty, sender is the host
    Created,
    /// Reply to `join`: sender is the second member
    Joined,
    /// Reply to `join`: room already has two members
    Full,
    /// Peer is ready to receive an offer
    Ready,
    Offer { payload: Value },
    Answer { payload: Value },
    IceCandidate { payload: Value },
    /// Peer left the room or disconnected
    Leave,
}

impl ServerMessage {
    /// Event name on the wire
    pub fn event(&self) -> &'static str {
        match self {
            ServerMessage::Created => "created",
            ServerMessage::Joined => "joined",
            ServerMessage::Full => "full",
            ServerMessage::Ready => "ready",
            ServerMessage::Offer { .. } => "offer",
            ServerMessage::Answer { .. } => "answer",
            ServerMessage::IceCandidate { .. } => "ice-candidate",
            ServerMessage::Leave => "leave",
        }
    }

    /// Opaque payload carried by forwarded negotiation messages
    pub fn payload(&self) -> Option<&Value> {
        match self {
            ServerMessage::Offer { payload }
            | ServerMessage::Answer { payload }
            | ServerMessage::IceCandidate { payload } => Some(payload),
            _ => None,
        }
    }
}

/// Framing used by a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireFormat {
    #[default]
    Tagged,
    EventArray,
}

/// Parser/formatter for WebSocket text frames
pub struct MessageParser;

impl MessageParser {
    /// Parse a text frame, reporting which framing it used
    pub fn parse(text: &str) -> Result<(ClientMessage, WireFormat), SignalingError> {
        let text = text.trim();

        if text.starts_with('{') {
            let message = serde_json::from_str(text)
                .map_err(|e| SignalingError::InvalidMessage(e.to_string()))?;
            return Ok((message, WireFormat::Tagged));
        }

        if text.starts_with('[') {
            let args: Vec<Value> = serde_json::from_str(text)
                .map_err(|e| SignalingError::InvalidMessage(e.to_string()))?;
            return Ok((Self::parse_event_array(args)?, WireFormat::EventArray));
        }

        Err(SignalingError::InvalidMessage(format!(
            "Unknown frame format: {}",
            text.chars().take(50).collect::<String>()
        )))
    }

    fn parse_event_array(args: Vec<Value>) -> Result<ClientMessage, SignalingError> {
        let mut args = args.into_iter();
        let event = match args.next() {
            Some(Value::String(event)) => event,
            _ => {
                return Err(SignalingError::InvalidMessage(
                    "Event array must start with an event name".to_string(),
                ))
            }
        };

        match event.as_str() {
            "join" => Ok(ClientMessage::Join { room: Self::room_arg(args.next())? }),
            "ready" => Ok(ClientMessage::Ready { room: Self::room_arg(args.next())? }),
            "leave" => Ok(ClientMessage::Leave { room: Self::room_arg(args.next())? }),
            "offer" | "answer" | "ice-candidate" => {
                let payload = args.next().ok_or_else(|| {
                    SignalingError::InvalidMessage(format!("Missing payload in {}", event))
                })?;
                let room = Self::room_arg(args.next())?;
                Ok(match event.as_str() {
                    "offer" => ClientMessage::Offer { payload, room },
                    "answer" => ClientMessage::Answer { payload, room },
                    _ => ClientMessage::IceCandidate { payload, room },
                })
            }
            _ => Err(SignalingError::UnknownEvent(event)),
        }
    }

    fn room_arg(value: Option<Value>) -> Result<String, SignalingError> {
        match value {
            Some(Value::String(room)) => Ok(room),
            Some(other) => Err(SignalingError::InvalidMessage(format!(
                "Room name must be a string, got {}",
                other
            ))),
            None => Err(SignalingError::InvalidMessage("Missing room name".to_string())),
        }
    }

    /// Format an outbound message in the connection's framing
    pub fn format(
        message: &ServerMessage,
        wire_format: WireFormat,
    ) -> Result<String, SignalingError> {
        match wire_format {
            WireFormat::Tagged => serde_json::to_string(message)
                .map_err(|e| SignalingError::Encode(e.to_string())),
            WireFormat::EventArray => {
                let frame = match message.payload() {
                    Some(payload) => json!([message.event(), payload]),
                    None => json!([message.event()]),
                };
                Ok(frame.to_string())
            }
        }
    }
}
