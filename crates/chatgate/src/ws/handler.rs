//! WebSocket transport for the gateway.

use axum::{
    body::Bytes,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use super::gateway::Gateway;
use crate::api::AppState;

/// WebSocket upgrade handler, mounted at the configured realtime path.
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let gateway = state.gateway.clone();
    let ping_interval = state.realtime.ping_interval();
    ws.on_upgrade(move |socket| handle_socket(socket, gateway, ping_interval))
}

/// Pump one socket through the gateway until either side goes away.
async fn handle_socket(socket: WebSocket, gateway: Arc<Gateway>, ping_interval: Duration) {
    let (mut sender, mut receiver) = socket.split();
    let (mut conn, outbox) = gateway.open_connection();
    let conn_id = conn.id();

    let registry = gateway.registry().clone();
    let send_task = tokio::spawn(async move {
        let mut frames = BroadcastStream::new(outbox);
        let mut ping = tokio::time::interval(ping_interval);
        // First tick fires immediately.
        ping.tick().await;

        loop {
            tokio::select! {
                item = frames.next() => match item {
                    Some(Ok(text)) => {
                        if sender.send(Message::Text((&*text).into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Err(BroadcastStreamRecvError::Lagged(count))) => {
                        registry.record_dropped(conn_id, count);
                    }
                    None => break,
                },

                _ = ping.tick() => {
                    if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
        debug!("Writer for {} stopped", conn_id);
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => gateway.handle_text(&mut conn, text.as_str()).await,
            Ok(Message::Binary(_)) => {
                debug!("Ignoring binary frame from {}", conn_id);
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!("{} sent close", conn_id);
                break;
            }
            Err(e) => {
                warn!("WebSocket error on {}: {}", conn_id, e);
                break;
            }
        }
    }

    gateway.close_connection(&mut conn);
    send_task.abort();
}
