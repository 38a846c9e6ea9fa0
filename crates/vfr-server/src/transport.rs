//! The `/rpc` WebSocket transport: decodes inbound `RpcRequest` envelopes,
//! dispatches them against the runtime, and forwards both direct replies
//! and unsolicited broadcast events to the client. Analogous to
//! `rw-server/src/live_reload/websocket.rs`'s upgrade handler, generalized
//! from a one-way reload ping to the full bidirectional RPC surface.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use tokio::sync::broadcast;

use vfr_runtime::{DispatchOutcome, RpcRequest};

use crate::state::AppState;

pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let mut events = state.runtime.subscribe();

    loop {
        tokio::select! {
            inbound = socket.recv() => {
                let Some(inbound) = inbound else { break };
                let Ok(inbound) = inbound else { break };
                match inbound {
                    Message::Text(text) => {
                        if !handle_request(&mut socket, &state, &text).await {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            broadcast = events.recv() => {
                match broadcast {
                    Ok(event) => {
                        if send_json(&mut socket, &event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                }
            }
        }
    }
}

/// Parse and dispatch one inbound text frame. Returns `false` if the
/// socket should be closed.
async fn handle_request(socket: &mut WebSocket, state: &AppState, text: &str) -> bool {
    let request: RpcRequest = match serde_json::from_str(text) {
        Ok(request) => request,
        Err(err) => {
            tracing::warn!(%err, "malformed rpc request");
            return true;
        }
    };

    match state.runtime.dispatcher.dispatch(request).await {
        DispatchOutcome::NoResponse => true,
        DispatchOutcome::Responded(response) => send_json(socket, &response).await.is_ok(),
        DispatchOutcome::Queued(envelope) => send_json(socket, &envelope).await.is_ok(),
    }
}

async fn send_json<T: serde::Serialize>(socket: &mut WebSocket, value: &T) -> Result<(), axum::Error> {
    let text = serde_json::to_string(value).unwrap_or_default();
    socket.send(Message::Text(text.into())).await
}
