//! WebSocket connection handler.

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::Response,
};
use std::net::SocketAddr;
use tracing::{debug, info, warn};

use crate::ingest::{process_binary, process_message, MessageOutcome};
use crate::response::AckFrame;
use crate::state::AppState;

/// Frames larger than this close the connection at the transport level.
/// Anything between the event size limit and this is rejected per message.
const FRAME_SIZE_FACTOR: usize = 8;

/// GET {ws_path} - WebSocket upgrade.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    let max_frame = state.validator.config().max_event_size_bytes * FRAME_SIZE_FACTOR;

    ws.max_message_size(max_frame)
        .on_upgrade(move |socket| handle_socket(socket, addr, state))
}

async fn handle_socket(mut socket: WebSocket, addr: SocketAddr, state: AppState) {
    let client_id = addr.to_string();
    let mut shutdown = state.shutdown.subscribe();
    let connection = state.connections.register(&client_id);

    info!(client_id = %client_id, connection_id = %connection.id(), "Client connected");

    loop {
        if *shutdown.borrow_and_update() {
            close(&mut socket, &client_id).await;
            break;
        }

        tokio::select! {
            biased;

            _ = shutdown.changed() => {
                close(&mut socket, &client_id).await;
                break;
            }
            message = socket.recv() => match message {
                Some(Ok(Message::Text(text))) => {
                    if !handle_text(&mut socket, &state, &client_id, &text).await {
                        break;
                    }
                }
                Some(Ok(Message::Binary(bytes))) => {
                    let outcome = process_binary(&state, &client_id, &bytes);
                    if !acknowledge(&mut socket, &state, &outcome).await {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(client_id = %client_id, error = %e, "WebSocket error");
                    break;
                }
            },
        }
    }

    drop(connection);
    info!(client_id = %client_id, "Client disconnected");
}

/// Returns false when the socket can no longer be written.
async fn handle_text(
    socket: &mut WebSocket,
    state: &AppState,
    client_id: &str,
    text: &str,
) -> bool {
    let outcome = process_message(state, client_id, text);
    acknowledge(socket, state, &outcome).await
}

async fn acknowledge(socket: &mut WebSocket, state: &AppState, outcome: &MessageOutcome) -> bool {
    if !state.config.ack_rejections {
        return true;
    }

    let frame = match serde_json::to_string(&AckFrame::from(outcome)) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "Failed to encode ack frame");
            return true;
        }
    };

    socket.send(Message::Text(frame)).await.is_ok()
}

async fn close(socket: &mut WebSocket, client_id: &str) {
    let frame = CloseFrame {
        code: close_code::AWAY,
        reason: "server shutting down".into(),
    };

    if let Err(e) = socket.send(Message::Close(Some(frame))).await {
        debug!(client_id = %client_id, error = %e, "Close frame not delivered");
    }
}
