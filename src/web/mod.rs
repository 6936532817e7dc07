//! HTTP server for signaling, health checks and the browser client
//!
//! Serves the signaling WebSocket, monitoring endpoints and static files.

pub mod shared;
pub use shared::SharedState;

pub mod http_server;
pub use http_server::{bind_listener, build_router, load_tls_acceptor, run_http_server};
