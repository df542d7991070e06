//! Dashboard WebSocket handler

use crate::realtime::is_pong;
use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};

/// GET /ws/dashboard
pub async fn ws_dashboard(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: AppState, socket: WebSocket) {
    let (id, mut outbound) = state.ws.register();
    let (mut sink, mut stream) = socket.split();

    // Writer task: forward queued frames to the socket
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if sink.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    // Reader loop: track pongs, stop on close or error
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                if is_pong(&text) {
                    state.ws.touch(id);
                }
            }
            Ok(Message::Pong(_)) => state.ws.touch(id),
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    state.ws.disconnect(id);
    writer.abort();
}
