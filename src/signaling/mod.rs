//! Room-based signaling for two-party WebRTC calls
//!
//! This module provides:
//! - The wire vocabulary exchanged with browser clients
//! - Connection bookkeeping (which socket sits in which room)
//! - Capacity-bounded rooms (two members at most)
//! - The relay that pairs callers and forwards offer/answer/ICE between them

pub mod messages;
pub mod registry;
pub mod relay;
pub mod rooms;

pub use messages::{ClientMessage, MessageParser, ServerMessage, WireFormat};
pub use registry::{ConnectionId, ConnectionRegistry, Outbound};
pub use relay::{RelayStats, SignalingRelay};
pub use rooms::{JoinOutcome, RoomSummary, RoomTable, ROOM_CAPACITY};

use std::error::Error;
use std::fmt;

/// Signaling-related errors
#[derive(Debug)]
pub enum SignalingError {
    /// Frame is not valid JSON or does not match the vocabulary
    InvalidMessage(String),
    /// Event name is not part of the vocabulary
    UnknownEvent(String),
    /// Outbound message could not be encoded
    Encode(String),
}

impl fmt::Display for SignalingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalingError::InvalidMessage(msg) => write!(f, "Invalid message: {}", msg),
            SignalingError::UnknownEvent(event) => write!(f, "Unknown event: {}", event),
            SignalingError::Encode(msg) => write!(f, "Encode error: {}", msg),
        }
    }
}

impl Error for SignalingError {}
