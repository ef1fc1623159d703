//! WebSocket endpoint — event fan-out plus cursor relay.
//!
//! DESIGN
//! ======
//! On upgrade, registers the connection with the hub and enters a `select!`
//! loop:
//! - Incoming client text → parsed as an envelope; cursor events are relayed
//!   to every peer except the sender, anything else is ignored
//! - Broadcast strings from the hub → forwarded to the client
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → register with hub → send `connected` greeting
//! 2. Client cursor events → relay to peers (never echoed back)
//! 3. REST mutations elsewhere broadcast through the hub → forwarded here
//! 4. Close → unregister

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::{Json, Response};
use events::{Connected, Envelope, EventBody};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::realtime::{CONNECTION_BUFFER, RealtimeHub};
use crate::state::AppState;

const GREETING: &str = "Connected to realtime updates";

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

async fn run_ws(mut socket: WebSocket, state: AppState) {
    let client_id = Uuid::new_v4();

    // Per-connection channel the hub fans broadcasts into.
    let (client_tx, mut client_rx) = mpsc::channel::<String>(CONNECTION_BUFFER);
    state.realtime.add(client_id, client_tx).await;

    let greeting = Envelope::now(EventBody::Connected(Connected { message: GREETING.to_owned() }));
    match greeting.to_json() {
        Ok(json) => {
            if socket.send(Message::Text(json.into())).await.is_err() {
                state.realtime.remove(client_id).await;
                return;
            }
        }
        Err(e) => warn!(error = %e, "ws: failed to serialize greeting"),
    }

    info!(%client_id, "ws: client connected");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        process_inbound(&state.realtime, client_id, &text).await;
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(json) = client_rx.recv() => {
                if socket.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
        }
    }

    state.realtime.remove(client_id).await;
    info!(%client_id, "ws: client disconnected");
}

/// Parse one inbound text message and relay it if it is a cursor event.
///
/// Kept separate from the socket loop so tests can drive inbound traffic
/// straight through the hub without a live websocket.
async fn process_inbound(hub: &RealtimeHub, client_id: Uuid, text: &str) {
    let envelope = match Envelope::parse(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(%client_id, error = %e, "ws: invalid inbound message");
            return;
        }
    };

    if envelope.body.is_cursor() {
        hub.broadcast_except(client_id, &envelope).await;
    } else {
        // Clients only ever push cursor traffic; everything else flows
        // REST → hub → clients.
        info!(%client_id, event = envelope.body.type_name(), "ws: ignoring non-cursor message");
    }
}

/// `GET /ws/status`
pub async fn ws_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let connections = state.realtime.count().await;
    Json(serde_json::json!({ "connections": connections, "status": "active" }))
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
