//! rendezvous - two-party WebRTC signaling relay
//!
//! Pairs two browsers in a named room and relays their session negotiation
//! (offer, answer, ICE candidates) until they connect directly.

pub mod args;
pub mod config;
pub mod signaling;
pub mod transport;
pub mod web;

// Re-exports
pub use config::Config;
pub use signaling::{ClientMessage, ServerMessage, SignalingRelay};
pub use web::SharedState;
