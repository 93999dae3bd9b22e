//! WebSocket handler: a second transport for chat turns.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade (identity from the same header as HTTP routes)
//! 2. `{"type":"session_init"}` binds the connection to a session
//! 3. `{"type":"message", ...}` runs a turn; each event goes out as one text
//!    message, closed by `[DONE]`
//! 4. Close
//!
//! Inbound handling is separate from the socket so tests can drive it
//! without a live connection.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::event::{END_MARKER, StreamEvent};
use crate::routes::auth::AuthUser;
use crate::routes::chat::LLM_DISABLED_RESPONSE;
use crate::services::chat::{self, TurnRequest};
use crate::state::AppState;

// =============================================================================
// OUTCOME
// =============================================================================

/// What the connection sends back for one inbound message.
enum Outcome {
    /// Fixed text messages.
    Reply(Vec<String>),
    /// A live turn; forward every event until the channel closes.
    Stream(mpsc::Receiver<StreamEvent>),
}

fn error_reply(message: impl Into<String>) -> Outcome {
    Outcome::Reply(vec![StreamEvent::error(message).to_wire()])
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(state): State<AppState>, auth: AuthUser, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state, auth.email))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState, user: String) {
    let connection_id = Uuid::new_v4();
    info!(%connection_id, %user, "ws: client connected");

    let mut bound: Option<Uuid> = None;

    while let Some(Ok(msg)) = socket.recv().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let outcome = process_inbound_text(&state, &user, &mut bound, text.as_str()).await;
        if send_outcome(&mut socket, outcome).await.is_err() {
            break;
        }
    }

    info!(%connection_id, session_id = ?bound, "ws: client disconnected");
}

/// Deliver an outcome. A failed send drops the turn receiver, which the turn
/// task observes as a disconnect.
async fn send_outcome(socket: &mut WebSocket, outcome: Outcome) -> Result<(), axum::Error> {
    match outcome {
        Outcome::Reply(texts) => {
            for text in texts {
                socket.send(Message::Text(text.into())).await?;
            }
        }
        Outcome::Stream(mut rx) => {
            while let Some(event) = rx.recv().await {
                socket.send(Message::Text(event.to_wire().into())).await?;
            }
        }
    }
    Ok(())
}

// =============================================================================
// INBOUND DISPATCH
// =============================================================================

async fn process_inbound_text(state: &AppState, user: &str, bound: &mut Option<Uuid>, text: &str) -> Outcome {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            warn!(%user, error = %e, "ws: invalid inbound message");
            return error_reply(format!("invalid json: {e}"));
        }
    };

    match value.get("type").and_then(Value::as_str) {
        Some("session_init") => handle_session_init(state, user, bound, &value).await,
        Some("message") => handle_message(state, user, *bound, &value).await,
        Some(other) => error_reply(format!("unknown message type: {other}")),
        None => error_reply("missing message type"),
    }
}

async fn handle_session_init(state: &AppState, user: &str, bound: &mut Option<Uuid>, value: &Value) -> Outcome {
    let requested = match value.get("session_id") {
        None | Some(Value::Null) => None,
        Some(raw) => match raw.as_str().and_then(|s| Uuid::parse_str(s).ok()) {
            Some(id) => Some(id),
            None => return error_reply("Session not found."),
        },
    };

    let session_id = match requested {
        Some(id) => {
            if state.sessions.get_owned(id, user).await.is_err() {
                return error_reply("Session not found.");
            }
            id
        }
        None => {
            let (id, created) = state.sessions.create_or_get(user).await;
            if created {
                state
                    .session_log
                    .log(id, "session_created", json!({ "user": user, "transport": "ws" }))
                    .await;
            }
            id
        }
    };

    *bound = Some(session_id);
    info!(%session_id, %user, "ws: session bound");
    Outcome::Reply(vec![json!({ "type": "session_id", "session_id": session_id }).to_string()])
}

async fn handle_message(state: &AppState, user: &str, bound: Option<Uuid>, value: &Value) -> Outcome {
    let Some(session_id) = bound else {
        return error_reply("Session not initialized.");
    };

    if state.config.disable_llm_calls {
        return Outcome::Reply(vec![json!({ "response": LLM_DISABLED_RESPONSE }).to_string()]);
    }

    let request = match TurnRequest::from_value(value) {
        Ok(r) => r,
        Err(e) => return error_reply(e.to_string()),
    };

    match chat::start_turn(state, user, session_id, request).await {
        Ok(rx) => Outcome::Stream(rx),
        Err(e) => Outcome::Reply(vec![StreamEvent::error_from(&e).to_wire(), END_MARKER.to_string()]),
    }
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
