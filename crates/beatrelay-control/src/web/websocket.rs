//! WebSocket handler for subscriber connections

use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::sync::broadcast::error::RecvError;

use super::server::AppState;
use crate::subscriber_queue;

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, addr, state))
}

/// Serve one subscriber until either side closes
async fn handle_socket(socket: WebSocket, addr: SocketAddr, state: AppState) {
    let (tx, mut rx) = subscriber_queue(state.subscriber_queue);

    // Registered before the first send; the catch-up sample is queued already
    let id = match state.hub.register(tx).await {
        Ok(id) => id,
        Err(e) => {
            tracing::error!("Rejecting browser client {}: {}", addr, e);
            return;
        }
    };

    tracing::info!("Browser client {} connected as subscriber {}", addr, id);

    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        loop {
            let payload = match rx.recv().await {
                Ok(payload) => payload,
                Err(RecvError::Lagged(missed)) => {
                    tracing::debug!("Subscriber {} lagging, dropped {} old samples", id, missed);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            if let Err(e) = sender.send(Message::Text(payload.to_string())).await {
                tracing::debug!("Send to subscriber {} failed: {}", id, e);
                break;
            }
        }
    });

    // Client frames carry nothing for us; only watch for close
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!("WebSocket error from subscriber {}: {}", id, e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    if let Err(e) = state.hub.unregister(id).await {
        tracing::debug!("Could not unregister subscriber {}: {}", id, e);
    }
    tracing::info!("Browser client {} disconnected", addr);
}
