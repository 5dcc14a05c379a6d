use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::models::{ClientMessage, ErrorMessage, ServerMessage};
use crate::ws::room::{JoinOutcome, ParticipantId, Room};
use crate::AppState;

/// Keepalive ping cadence for idle connections.
const PING_INTERVAL_SECS: u64 = 30;

/// A connection's room membership once its joinRoom has been accepted. One
/// connection is one participant for its whole lifetime.
struct Session {
    room: Arc<Room>,
    participant_id: ParticipantId,
}

/// WebSocket handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
) -> Response {
    info!("New WebSocket connection attempt");
    ws.on_upgrade(move |socket| handle_socket(socket, app_state))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>) {
    // Generate unique connection ID to identify this client in the logs
    let connection_id = Uuid::new_v4();
    info!("WebSocket connection established with connection_id: {}", connection_id);

    // Split the socket into sender and receiver
    let (sender, mut receiver) = socket.split();

    // Outbound channel for this connection. The room coordinator pushes
    // events here; the write pump drains them to the socket in order.
    let (tx, rx) = mpsc::unbounded_channel::<ServerMessage>();
    let send_task = tokio::spawn(write_pump(sender, rx, connection_id));

    let mut session: Option<Session> = None;

    while let Some(Ok(msg)) = receiver.next().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            // Pong replies and binary frames carry nothing for the protocol
            _ => continue,
        };

        let client_msg: ClientMessage = match serde_json::from_str(&text) {
            Ok(client_msg) => client_msg,
            Err(e) => {
                error!("Failed to parse message on connection {}: {}", connection_id, e);
                continue;
            }
        };

        match client_msg {
            ClientMessage::JoinRoom(join) => {
                if session.is_some() {
                    warn!(
                        "Ignoring joinRoom on connection {}: already joined",
                        connection_id
                    );
                    continue;
                }
                if join.room_id.is_empty() {
                    let _ = tx.send(ServerMessage::Error(ErrorMessage {
                        message: "No room identifier supplied".to_string(),
                    }));
                    continue;
                }

                let (room, outcome) = app_state
                    .registry
                    .join(&join.room_id, app_state.capacity, tx.clone())
                    .await;
                match outcome {
                    JoinOutcome::Joined(participant_id) => {
                        session = Some(Session {
                            room,
                            participant_id,
                        });
                    }
                    JoinOutcome::Full => {
                        // Terminal for this join attempt only; the connection
                        // stays open so the user can try another room.
                        let _ = tx.send(ServerMessage::RoomFull);
                    }
                }
            }
            ClientMessage::ContentChange(change) => match &session {
                Some(s) if s.room.id() == change.room_id => {
                    s.room
                        .submit_content(s.participant_id, change.content)
                        .await;
                }
                _ => debug!(
                    "Ignoring contentChange for room {} on connection {}: not a member",
                    change.room_id, connection_id
                ),
            },
            ClientMessage::RequestEditPermission(request) => match &session {
                Some(s) if s.room.id() == request.room_id => {
                    s.room.request_transfer(s.participant_id).await;
                }
                _ => debug!(
                    "Ignoring requestEditPermission for room {} on connection {}: not a member",
                    request.room_id, connection_id
                ),
            },
        }
    }

    // Disconnect, however it happened, is an implicit leave
    if let Some(s) = session.take() {
        app_state.registry.leave(s.room.id(), s.participant_id).await;
    }
    send_task.abort();
    info!("WebSocket connection {} terminated", connection_id);
}

/// Drain coordinator events to the socket, interleaving keepalive pings.
/// Events leave in channel order, so every client observes room events in the
/// order the coordinator applied them.
async fn write_pump(
    mut sender: SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<ServerMessage>,
    connection_id: Uuid,
) {
    let mut ping_interval = tokio::time::interval(Duration::from_secs(PING_INTERVAL_SECS));

    loop {
        tokio::select! {
            maybe_event = rx.recv() => {
                let Some(event) = maybe_event else { break };
                let json = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!("Failed to serialize event on connection {}: {}", connection_id, e);
                        continue;
                    }
                };
                if sender.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
            _ = ping_interval.tick() => {
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }
}
