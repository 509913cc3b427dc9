//! WebSocket upgrade handlers for gamepad devices and screens

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{PlayerId, SessionHandle};
use crate::util::time::unix_millis;
use crate::ws::protocol::{PadMsg, ServerMsg};

/// Query parameters for a gamepad connection
#[derive(Debug, Deserialize)]
pub struct PadQuery {
    pub room: String,
    /// Display name
    pub name: Option<String>,
    /// Identity from a previous `welcome`, to reattach after a drop
    pub token: Option<String>,
}

/// Query parameters for a screen connection
#[derive(Debug, Deserialize)]
pub struct ScreenQuery {
    pub room: String,
}

/// Room codes are short and URL-safe
pub fn is_valid_room(room: &str) -> bool {
    !room.is_empty()
        && room.len() <= 32
        && room
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Gamepad WebSocket upgrade handler
pub async fn pad_ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<PadQuery>,
    State(state): State<AppState>,
) -> Response {
    if let Some(rejection) = admit(&state, &query.room) {
        return rejection;
    }

    let player = query
        .token
        .filter(|t| !t.trim().is_empty())
        .map(PlayerId::new)
        .unwrap_or_else(|| PlayerId::new(Uuid::new_v4().to_string()));
    let name = query
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| format!("Player_{}", player.as_str().chars().take(8).collect::<String>()));

    let session = state.sessions.get_or_create(&query.room);
    info!(room = %query.room, player = %player, "Gamepad upgrade");
    ws.on_upgrade(move |socket| handle_pad(socket, player, name, session))
}

/// Screen WebSocket upgrade handler
pub async fn screen_ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<ScreenQuery>,
    State(state): State<AppState>,
) -> Response {
    if let Some(rejection) = admit(&state, &query.room) {
        return rejection;
    }

    let session = state.sessions.get_or_create(&query.room);
    info!(room = %query.room, "Screen upgrade");
    ws.on_upgrade(move |socket| handle_screen(socket, session))
}

fn admit(state: &AppState, room: &str) -> Option<Response> {
    if !state.connect_limiter.check() {
        warn!(room = %room, "Rate limited connection attempt");
        return Some((StatusCode::TOO_MANY_REQUESTS, "Too many connections").into_response());
    }
    if !is_valid_room(room) {
        return Some((StatusCode::BAD_REQUEST, "Invalid room code").into_response());
    }
    None
}

/// Handle an upgraded gamepad connection
async fn handle_pad(socket: WebSocket, player: PlayerId, name: String, session: SessionHandle) {
    let (mut ws_sink, mut ws_stream) = socket.split();

    let welcome = ServerMsg::Welcome {
        player_id: player.clone(),
        room: session.room.clone(),
        server_time: unix_millis(),
    };
    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(player = %player, error = %e, "Failed to send welcome");
        return;
    }

    let conn = session.connect(player.clone(), name).await;

    // Reader loop: WebSocket -> pending input
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<PadMsg>(&text) {
                Ok(PadMsg::Ping { t }) => {
                    if let Err(e) = send_msg(&mut ws_sink, &ServerMsg::Pong { t }).await {
                        debug!(player = %player, error = %e, "Pong send failed");
                        break;
                    }
                }
                Ok(msg) => {
                    if let Some(partial) = msg.to_partial() {
                        session.inputs.update(&player, partial);
                    }
                }
                Err(e) => {
                    warn!(player = %player, error = %e, "Failed to parse pad message");
                }
            },
            Ok(Message::Binary(_)) => {
                warn!(player = %player, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(player = %player, "Gamepad initiated close");
                break;
            }
            Err(e) => {
                error!(player = %player, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Best effort; silent drops are caught by the inactivity sweep
    session.disconnect(player.clone(), conn).await;
    info!(player = %player, "Gamepad connection closed");
}

/// Handle an upgraded screen connection
async fn handle_screen(socket: WebSocket, session: SessionHandle) {
    let (ws_sink, mut ws_stream) = socket.split();
    let frames = session.subscribe();
    let room = session.room.clone();

    let writer_handle = tokio::spawn(forward_frames(ws_sink, frames, room.clone()));

    // Reader loop only watches for close
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(room = %room, error = %e, "Screen socket error");
                break;
            }
        }
    }

    writer_handle.abort();
    info!(room = %room, "Screen connection closed");
}

/// Writer task: broadcast frames -> WebSocket
async fn forward_frames(
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut frames: broadcast::Receiver<Arc<str>>,
    room: String,
) {
    loop {
        match frames.recv().await {
            Ok(frame) => {
                if let Err(e) = ws_sink.send(Message::Text(frame.to_string())).await {
                    debug!(room = %room, error = %e, "Screen send failed");
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                // Frames are full state, the next one supersedes what was missed
                warn!(room = %room, lagged_count = n, "Screen lagged, skipping {} frames", n);
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!(room = %room, "Frame channel closed");
                break;
            }
        }
    }
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
