//! rendezvous - Main entry point
//!
//! Two-party WebRTC signaling relay serving browsers over WebSocket.

use clap::Parser;
use log::{error, info, warn};
use rendezvous::args::Args;
use rendezvous::{web, Config, SharedState, SignalingRelay};
use std::env;
use std::sync::Arc;
use tokio::signal;
use tokio::task;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration before logging so the file can set the level
    let (mut config, load_error) = match args.load_config() {
        Ok(cfg) => (cfg, None),
        Err(e) => (Config::default(), Some(e.to_string())),
    };
    args.apply_overrides(&mut config, env_port());

    env_logger::Builder::new()
        .parse_filters(&env::var("RENDEZVOUS_LOG").unwrap_or_else(|_| config.logging.level.clone()))
        .init();

    info!("rendezvous v{}", env!("CARGO_PKG_VERSION"));
    match load_error {
        Some(e) => warn!("Failed to load config: {}, using defaults", e),
        None if args.config.exists() => info!("Loaded configuration from {:?}", args.config),
        None => info!("No configuration file at {:?}, using defaults", args.config),
    }

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(e);
    }

    let tls = match web::load_tls_acceptor(&config.http) {
        Ok(tls) => tls,
        Err(e) => {
            error!("Failed to load TLS certificate: {}", e);
            return Err(e);
        }
    };

    // A signaling channel that cannot accept connections is useless; bail out
    let listener = match web::bind_listener(&config.http).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}:{}: {}", config.http.host, config.http.port, e);
            return Err(e.into());
        }
    };

    let relay = Arc::new(SignalingRelay::new());
    let state = Arc::new(SharedState::new(config, relay.clone()));

    let mut http_handle = task::spawn(web::run_http_server(listener, state, tls));

    // Wait for shutdown signal
    let shutdown = async {
        let _ = signal::ctrl_c().await;
        info!("Shutdown signal received");
    };

    let outcome: Result<(), Box<dyn std::error::Error>> = tokio::select! {
        _ = shutdown => {
            info!("Initiating graceful shutdown...");
            Ok(())
        }
        result = &mut http_handle => match result {
            Ok(Ok(())) => {
                warn!("HTTP server stopped unexpectedly");
                Ok(())
            }
            Ok(Err(e)) => {
                error!("HTTP server failed: {}", e);
                Err(e.into())
            }
            Err(e) => {
                error!("HTTP server join error: {}", e);
                Err(e.into())
            }
        },
    };

    // Stop HTTP server
    if !http_handle.is_finished() {
        http_handle.abort();
        let _ = http_handle.await;
    }

    let stats = relay.stats();
    info!(
        "rendezvous stopped ({} connections, {} rooms open at shutdown)",
        stats.connections, stats.rooms
    );

    outcome
}

fn env_port() -> Option<u16> {
    env::var("PORT").ok()?.trim().parse().ok()
}
