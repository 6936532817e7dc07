//! Transport layer for rendezvous
//!
//! Handles the WebSocket connections that carry signaling messages.

pub mod signaling_server;

pub use signaling_server::handle_signaling_connection;
