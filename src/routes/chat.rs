//! Chat session routes: create, turn streaming, summary, download, delete.

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use futures::Stream;
use serde::Serialize;
use serde_json::{Value, json};
use time::OffsetDateTime;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::event::{ErrorCode, StreamEvent};
use crate::routes::auth::AuthUser;
use crate::services::chat::{self, ChatError, TurnRequest};
use crate::services::session::render_transcript;
use crate::state::AppState;

pub const LLM_DISABLED_RESPONSE: &str = "LLM calls are disabled.";

// =============================================================================
// ERROR MAPPING
// =============================================================================

pub(crate) fn chat_error_status(err: &ChatError) -> StatusCode {
    match err {
        ChatError::SessionNotFound(_) | ChatError::ModelNotFound(_) => StatusCode::NOT_FOUND,
        ChatError::NoModelsConfigured => StatusCode::SERVICE_UNAVAILABLE,
        ChatError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        ChatError::Llm(_) => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = chat_error_status(&self);
        let body = json!({ "detail": self.to_string(), "code": self.error_code() });
        (status, Json(body)).into_response()
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

/// `POST /chat`: the caller's session id, created on first use.
pub async fn create_session(State(state): State<AppState>, auth: AuthUser) -> Json<Value> {
    let (session_id, created) = state.sessions.create_or_get(&auth.email).await;
    if created {
        state
            .session_log
            .log(session_id, "session_created", json!({ "user": auth.email }))
            .await;
    }
    Json(json!({ "session_id": session_id }))
}

/// `POST /chat/{id}/message`: run one turn and stream its events as SSE.
pub async fn send_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(session_id): Path<Uuid>,
    Json(body): Json<Value>,
) -> Result<Response, ChatError> {
    state
        .sessions
        .get_owned(session_id, &auth.email)
        .await
        .map_err(|_| ChatError::SessionNotFound(session_id))?;

    if state.config.disable_llm_calls {
        return Ok(Json(json!({ "response": LLM_DISABLED_RESPONSE })).into_response());
    }

    let request = TurnRequest::from_value(&body)?;
    let rx = chat::start_turn(&state, &auth.email, session_id, request).await?;
    Ok(Sse::new(sse_events(rx))
        .keep_alive(KeepAlive::default())
        .into_response())
}

/// One SSE record per event. The final [`StreamEvent::End`] becomes
/// `data: [DONE]`.
fn sse_events(mut rx: mpsc::Receiver<StreamEvent>) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        while let Some(event) = rx.recv().await {
            let done = event.is_end();
            yield Ok(Event::default().data(event.to_wire()));
            if done {
                break;
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub model: Option<String>,
    pub selected_tools: Vec<String>,
    pub selected_data_sources: Vec<String>,
    pub message_count: usize,
}

/// `GET /chat/{id}`: session summary.
pub async fn get_session(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionSummary>, ChatError> {
    let session = state
        .sessions
        .get_owned(session_id, &auth.email)
        .await
        .map_err(|_| ChatError::SessionNotFound(session_id))?;
    Ok(Json(SessionSummary {
        session_id: session.id,
        model: session.model_name,
        selected_tools: session.selected_tools,
        selected_data_sources: session.selected_data_sources,
        message_count: session.messages.len(),
    }))
}

/// `GET /chat/{id}/download`: plain-text transcript as an attachment.
pub async fn download_session(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(session_id): Path<Uuid>,
) -> Result<Response, ChatError> {
    let session = state
        .sessions
        .get_owned(session_id, &auth.email)
        .await
        .map_err(|_| ChatError::SessionNotFound(session_id))?;
    let transcript = render_transcript(&session, OffsetDateTime::now_utc());
    let disposition = format!("attachment; filename=\"chat_{session_id}.txt\"");
    Ok((
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; charset=utf-8".to_string()), (CONTENT_DISPOSITION, disposition)],
        transcript,
    )
        .into_response())
}

/// `DELETE /chat/{id}`: drop the session.
pub async fn delete_session(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(session_id): Path<Uuid>,
) -> Result<StatusCode, ChatError> {
    state
        .sessions
        .get_owned(session_id, &auth.email)
        .await
        .map_err(|_| ChatError::SessionNotFound(session_id))?;
    state.sessions.delete(session_id).await;
    tracing::info!(%session_id, user = %auth.email, "chat: session deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
#[path = "chat_test.rs"]
mod tests;
