//! HTTP server for health checks and WebRTC signaling
//!
//! Provides the signaling WebSocket endpoint, health/metrics/rooms endpoints
//! and, when configured, the browser client as static files. Serves HTTPS
//! when a certificate and key are available.

use crate::config::HttpConfig;
use crate::web::shared::SharedState;
use axum::{
    extract::State,
    extract::WebSocketUpgrade,
    http::{HeaderValue, Method, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use log::{debug, info, warn};
use serde_json::json;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_native_tls::TlsAcceptor;
use tower::Service;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};

/// Bind the HTTP listener. Failure here is fatal for the process.
pub async fn bind_listener(http: &HttpConfig) -> std::io::Result<TcpListener> {
    let addr = format!("{}:{}", http.host, http.port);
    TcpListener::bind(&addr).await
}

/// Build a TLS acceptor when both certificate and key files exist.
///
/// Missing files mean plain HTTP; unreadable or invalid ones are an error.
pub fn load_tls_acceptor(
    http: &HttpConfig,
) -> Result<Option<TlsAcceptor>, Box<dyn std::error::Error>> {
    if !http.tls_available() {
        info!(
            "No certificates found ({:?}, {:?}), using HTTP",
            http.tls_cert, http.tls_key
        );
        return Ok(None);
    }

    let cert = std::fs::read(&http.tls_cert)?;
    let key = std::fs::read(&http.tls_key)?;
    let identity = native_tls::Identity::from_pkcs8(&cert, &key)?;
    let acceptor = native_tls::TlsAcceptor::new(identity)?;
    info!("Using HTTPS with certificate {:?}", http.tls_cert);
    Ok(Some(TlsAcceptor::from(acceptor)))
}

/// Build the application router
pub fn build_router(state: Arc<SharedState>) -> Router {
    let config = state.config.clone();

    info!("Signaling endpoint at {}", config.signaling.path);
    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/rooms", get(rooms_handler))
        .route(
            &config.signaling.path,
            get(signaling_handler).layer(cors_layer(config.http.cors_origin.as_deref())),
        );

    // Unknown paths fall back to index.html so client-side routes like
    // /room/<id> load the app
    let app = match config.http.static_root {
        Some(ref root) => {
            info!("Serving web client from {:?}", root);
            let index_path = root.join("index.html");
            app.fallback_service(ServeDir::new(root).fallback(ServeFile::new(index_path)))
        }
        None => app.fallback(not_found_handler),
    };

    app.with_state(state)
}

/// Serve HTTP (or HTTPS) on an already bound listener until it fails
pub async fn run_http_server(
    listener: TcpListener,
    state: Arc<SharedState>,
    tls: Option<TlsAcceptor>,
) -> std::io::Result<()> {
    let app = build_router(state);
    let scheme = if tls.is_some() { "https" } else { "http" };
    log_listening_addresses(scheme, listener.local_addr()?);

    match tls {
        Some(acceptor) => serve_tls(listener, acceptor, app).await,
        None => axum::serve(listener, app).await,
    }
}

async fn serve_tls(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    app: Router,
) -> std::io::Result<()> {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Failed to accept connection: {}", e);
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            }
        };

        let acceptor = acceptor.clone();
        let tower_service = app.clone();
        tokio::spawn(async move {
            let stream = match acceptor.accept(stream).await {
                Ok(stream) => stream,
                Err(e) => {
                    debug!("TLS handshake with {} failed: {}", peer, e);
                    return;
                }
            };

            let hyper_service = hyper::service::service_fn(move |request: Request<Incoming>| {
                tower_service.clone().call(request)
            });

            if let Err(e) = auto::Builder::new(TokioExecutor::new())
                .serve_connection_with_upgrades(TokioIo::new(stream), hyper_service)
                .await
            {
                debug!("Connection from {} ended with error: {}", peer, e);
            }
        });
    }
}

fn log_listening_addresses(scheme: &str, local: SocketAddr) {
    info!("Ready on {}://{}", scheme, local);

    if !local.ip().is_unspecified() {
        return;
    }
    match local_ip_address::list_afinet_netifas() {
        Ok(interfaces) => {
            for (_, ip) in interfaces {
                if let IpAddr::V4(v4) = ip {
                    if !v4.is_loopback() {
                        info!("Local network: {}://{}:{}", scheme, v4, local.port());
                    }
                }
            }
        }
        Err(e) => debug!("Failed to list network interfaces: {}", e),
    }
}

/// CORS for the signaling route: the configured origin only, or any origin
/// when none is configured
fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let allow_origin = match origin.map(HeaderValue::from_str) {
        Some(Ok(value)) => AllowOrigin::exact(value),
        Some(Err(e)) => {
            warn!("Invalid CORS origin {:?} ({}), denying cross-origin requests", origin, e);
            AllowOrigin::list(Vec::<HeaderValue>::new())
        }
        None => AllowOrigin::any(),
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
}

/// Upgrade to the signaling channel
async fn signaling_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<SharedState>>,
) -> Response {
    let relay = state.relay.clone();
    let ping_interval = state.ping_interval();
    ws.on_upgrade(move |socket| {
        crate::transport::handle_signaling_connection(socket, relay, ping_interval)
    })
}

/// Health check handler
async fn health_handler(State(state): State<Arc<SharedState>>) -> Json<serde_json::Value> {
    let stats = state.relay.stats();
    Json(json!({
        "status": "healthy",
        "uptime_seconds": state.uptime().as_secs_f64(),
        "connections": stats.connections,
        "rooms": stats.rooms,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Metrics handler (Prometheus format)
async fn metrics_handler(State(state): State<Arc<SharedState>>) -> String {
    let uptime = state.uptime().as_secs_f64();
    let stats = state.relay.stats();

    format!(
        r#"# HELP rendezvous_uptime_seconds Server uptime in seconds
# TYPE rendezvous_uptime_seconds counter
rendezvous_uptime_seconds {}
# HELP rendezvous_connections Current number of signaling connections
# TYPE rendezvous_connections gauge
rendezvous_connections {}
# HELP rendezvous_rooms Current number of rooms
# TYPE rendezvous_rooms gauge
rendezvous_rooms {}
# HELP rendezvous_rooms_paired Rooms with two members
# TYPE rendezvous_rooms_paired gauge
rendezvous_rooms_paired {}
# HELP rendezvous_rooms_created_total Rooms created
# TYPE rendezvous_rooms_created_total counter
rendezvous_rooms_created_total {}
# HELP rendezvous_joins_rejected_total Join attempts rejected because the room was full
# TYPE rendezvous_joins_rejected_total counter
rendezvous_joins_rejected_total {}
# HELP rendezvous_messages_relayed_total Messages delivered to a room peer
# TYPE rendezvous_messages_relayed_total counter
rendezvous_messages_relayed_total {}
"#,
        uptime,
        stats.connections,
        stats.rooms,
        stats.paired_rooms,
        stats.rooms_created,
        stats.joins_rejected,
        stats.messages_relayed
    )
}

/// Live rooms and their sizes
async fn rooms_handler(State(state): State<Arc<SharedState>>) -> Json<serde_json::Value> {
    Json(json!({ "rooms": state.relay.rooms() }))
}

async fn not_found_handler() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not found")
}
