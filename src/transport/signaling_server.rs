//! WebSocket transport for the signaling relay
//!
//! One task per browser tab:
//! 1. Register with the relay and obtain an outbox
//! 2. Writer task drains the outbox, framing each message as stamped when queued
//! 3. Reader loop parses text frames and hands them to the relay; the first
//!    decodable frame fixes the connection's wire format
//! 4. On close or error the relay treats the connection as having left its room

use crate::signaling::{MessageParser, SignalingRelay};
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

/// Handle a signaling WebSocket connection until it closes
pub async fn handle_signaling_connection(
    socket: WebSocket,
    relay: Arc<SignalingRelay>,
    ping_interval: Option<Duration>,
) {
    let (connection_id, mut outbox) = relay.connect();
    info!("New signaling connection {}", connection_id);
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Forward queued messages to the socket, interleaving keepalive pings
    let send_task = tokio::spawn(async move {
        let mut keepalive = ping_interval.map(|period| {
            tokio::time::interval_at(tokio::time::Instant::now() + period, period)
        });
        loop {
            let outbound = tokio::select! {
                outbound = outbox.recv() => match outbound {
                    Some(outbound) => outbound,
                    None => break,
                },
                _ = next_tick(&mut keepalive) => {
                    if ws_sender.send(Message::Ping(Default::default())).await.is_err() {
                        break;
                    }
                    continue;
                }
            };

            match MessageParser::format(&outbound.message, outbound.wire_format) {
                Ok(text) => {
                    if ws_sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    let event = outbound.message.event();
                    warn!("Failed to encode {} for {}: {}", event, connection_id, e);
                }
            }
        }
    });

    let mut format_adopted = false;
    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => match MessageParser::parse(text.as_str()) {
                Ok((message, wire_format)) => {
                    if !format_adopted {
                        relay.adopt_wire_format(connection_id, wire_format);
                        format_adopted = true;
                    }
                    debug!("{} -> {} ({})", connection_id, message.event(), message.room());
                    relay.handle(connection_id, message);
                }
                Err(e) => {
                    warn!("Ignoring invalid signaling frame from {}: {}", connection_id, e);
                }
            },
            Ok(Message::Binary(_)) => {
                debug!("Received binary message on signaling channel");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!("Signaling connection {} closed", connection_id);
                break;
            }
            Err(e) => {
                warn!("WebSocket error on {}: {}", connection_id, e);
                break;
            }
        }
    }

    relay.disconnect(connection_id);
    send_task.abort();

    info!("Signaling connection handler finished ({})", connection_id);
}

async fn next_tick(keepalive: &mut Option<tokio::time::Interval>) {
    match keepalive {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
