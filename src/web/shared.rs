//! Shared state for rendezvous
//!
//! Handed to every HTTP handler and signaling connection.

use crate::config::Config;
use crate::signaling::SignalingRelay;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared state for the application
#[derive(Clone)]
pub struct SharedState {
    /// Configuration
    pub config: Arc<Config>,

    /// Signaling relay owning the room table and connection registry
    pub relay: Arc<SignalingRelay>,

    /// Server start time
    pub start_time: Instant,
}

impl std::fmt::Debug for SharedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedState")
            .field("config", &self.config)
            .field("connections", &self.connection_count())
            .finish()
    }
}

impl SharedState {
    pub fn new(config: Config, relay: Arc<SignalingRelay>) -> Self {
        Self {
            config: Arc::new(config),
            relay,
            start_time: Instant::now(),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn connection_count(&self) -> usize {
        self.relay.connection_count()
    }

    /// Keepalive interval for signaling sockets
    pub fn ping_interval(&self) -> Option<Duration> {
        match self.config.signaling.ping_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}
