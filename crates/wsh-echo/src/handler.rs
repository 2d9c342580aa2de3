//! WebSocket connection handler
//!
//! Sends the welcome frame, then echoes every data frame back wrapped in
//! an [`EchoResponse`].

use axum::{
    extract::{
        ConnectInfo, OriginalUri, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code},
    },
    response::Response,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use wsh_core::{EchoResponse, Frame};

use crate::Result;
use crate::server::EchoState;

/// Handle a WebSocket upgrade request on any path
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<EchoState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    OriginalUri(uri): OriginalUri,
) -> Response {
    let path = uri.path().to_string();
    // Held from the request until the connection ends, so a stop that races
    // a pending upgrade still waits for it
    let task = state.tracker.token();

    ws.on_failed_upgrade(move |e| warn!(%peer, "WebSocket upgrade failed: {}", e))
        .on_upgrade(move |socket| async move {
            handle_socket(socket, state, peer, path).await;
            drop(task);
        })
}

/// Drive one upgraded connection until close, error or shutdown
async fn handle_socket(socket: WebSocket, state: Arc<EchoState>, peer: SocketAddr, path: String) {
    let id = state.connections.register(peer, &path);
    info!(connection_id = %id, %peer, %path, "Client connected");

    match serve_connection(socket, &state, id, &path).await {
        Ok(()) => info!(connection_id = %id, %peer, "Client disconnected"),
        Err(e) => warn!(connection_id = %id, %peer, "Connection error: {}", e),
    }

    state.connections.remove(&id);
}

async fn serve_connection(
    mut socket: WebSocket,
    state: &EchoState,
    id: Uuid,
    path: &str,
) -> Result<()> {
    let welcome = EchoResponse::welcome(&state.config.welcome_message, path);
    socket.send(Message::Text(welcome.to_json()?.into())).await?;

    loop {
        // Only the receive is raced against shutdown, so a reply that has
        // started sending always completes.
        let msg = tokio::select! {
            msg = socket.recv() => msg,
            _ = state.shutdown.cancelled() => {
                debug!(connection_id = %id, "Closing connection for shutdown");
                let close = CloseFrame {
                    code: close_code::AWAY,
                    reason: "server shutting down".into(),
                };
                // The peer may already be gone
                let _ = socket.send(Message::Close(Some(close))).await;
                return Ok(());
            }
        };

        let frame = match msg {
            None => return Ok(()),
            Some(Err(e)) => return Err(e.into()),
            Some(Ok(Message::Text(text))) => Frame::decode(text.as_str()),
            Some(Ok(Message::Binary(bytes))) => Frame::decode_bytes(&bytes),
            Some(Ok(Message::Ping(data))) => {
                socket.send(Message::Pong(data)).await?;
                continue;
            }
            Some(Ok(Message::Pong(_))) => continue,
            Some(Ok(Message::Close(_))) => return Ok(()),
        };

        debug!(connection_id = %id, kind = frame.kind(), "Received: {}", frame);

        let echo = EchoResponse::echo(frame, &state.config.server_tag);
        socket.send(Message::Text(echo.to_json()?.into())).await?;
        state.connections.record_echo(&id);
    }
}
