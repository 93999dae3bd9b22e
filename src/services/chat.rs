//! Turn orchestrator: one user message in, a stream of events out.
//!
//! DESIGN
//! ======
//! `start_turn` does everything that can fail cleanly before a stream
//! exists: validate ownership, resolve the model, take the session's turn
//! gate, compose the system prompt and make the first (non-streaming) model
//! call. Any failure there is returned as a [`ChatError`] and nothing has
//! been written.
//!
//! Once the first call succeeds, the rest of the turn runs in a spawned task
//! that owns the turn gate and pushes [`StreamEvent`]s into a channel:
//!
//! - no tool calls: the first response's text is the whole reply (one call)
//! - tool calls: run each tool, then stream a second call with the results
//!
//! The task always reaches the persist step, whether the provider stream
//! ends, fails, or the receiver goes away. Persisted history keeps the shape
//! `[system?, (user, assistant)*]`; the tool round-trip only lives in the
//! working message list for the second call.

use std::sync::Arc;

use futures::StreamExt;
use serde_json::{Value, json};
use tokio::sync::{OwnedMutexGuard, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::event::{ErrorCode, StreamEvent};
use crate::llm::registry::{ModelHandle, RegistryError};
use crate::llm::types::{ChatResponse, LlmError, Message, Role, StreamChunk, ToolDefinition};
use crate::services::prompt::data_source;
use crate::state::AppState;

const EVENT_CHANNEL_CAPACITY: usize = 64;

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Session not found.")]
    SessionNotFound(Uuid),

    #[error("LLM configuration '{0}' not found.")]
    ModelNotFound(String),

    #[error("No LLM configurations are available.")]
    NoModelsConfigured,

    #[error("{0}")]
    InvalidRequest(String),

    #[error("LLM request failed: {0}")]
    Llm(#[from] LlmError),
}

impl ErrorCode for ChatError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::SessionNotFound(_) => "E_SESSION_NOT_FOUND",
            Self::ModelNotFound(_) => "E_MODEL_NOT_FOUND",
            Self::NoModelsConfigured => "E_NO_MODELS",
            Self::InvalidRequest(_) => "E_INVALID_REQUEST",
            Self::Llm(e) => e.error_code(),
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Llm(e) => e.retryable(),
            _ => false,
        }
    }
}

impl From<RegistryError> for ChatError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound(name) => Self::ModelNotFound(name),
            RegistryError::Empty => Self::NoModelsConfigured,
        }
    }
}

// =============================================================================
// REQUEST
// =============================================================================

/// Inbound turn request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnRequest {
    pub content: String,
    pub selected_tools: Vec<String>,
    pub selected_data_sources: Vec<String>,
    pub llm_name: Option<String>,
}

impl TurnRequest {
    /// Validate a JSON body. Absent selections mean "none selected"; present
    /// ones must be lists of strings.
    ///
    /// # Errors
    ///
    /// [`ChatError::InvalidRequest`] for a non-object body or wrongly typed
    /// field.
    pub fn from_value(body: &Value) -> Result<Self, ChatError> {
        let Some(obj) = body.as_object() else {
            return Err(ChatError::InvalidRequest("Request body must be a JSON object.".into()));
        };
        let content = match obj.get("content") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(_) => return Err(ChatError::InvalidRequest("content must be a string.".into())),
        };
        let llm_name = match obj.get("llm_name") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => return Err(ChatError::InvalidRequest("llm_name must be a string.".into())),
        };
        Ok(Self {
            content,
            selected_tools: string_list(obj.get("selected_tools"), "selected_tools")?,
            selected_data_sources: string_list(obj.get("selected_data_sources"), "selected_data_sources")?,
            llm_name,
        })
    }
}

fn string_list(raw: Option<&Value>, field: &str) -> Result<Vec<String>, ChatError> {
    match raw {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_owned)
                    .ok_or_else(|| ChatError::InvalidRequest(format!("{field} must contain only strings.")))
            })
            .collect(),
        Some(_) => Err(ChatError::InvalidRequest(format!("{field} must be a list."))),
    }
}

// =============================================================================
// MAIN ENTRY POINT
// =============================================================================

/// Start one turn on `session_id` for `user`.
///
/// Returns the receiving end of the turn's event stream, which always ends
/// with [`StreamEvent::End`].
///
/// # Errors
///
/// Unknown or foreign session, unknown model, empty registry, or a failed
/// first model call. In every case the session is left unchanged.
pub async fn start_turn(
    state: &AppState,
    user: &str,
    session_id: Uuid,
    request: TurnRequest,
) -> Result<mpsc::Receiver<StreamEvent>, ChatError> {
    let session = state
        .sessions
        .get_owned(session_id, user)
        .await
        .map_err(|_| ChatError::SessionNotFound(session_id))?;
    let model = resolve_model(state, request.llm_name.as_deref(), session.model_name.as_deref())?;

    let gate = state
        .sessions
        .turn_gate(session_id)
        .await
        .ok_or(ChatError::SessionNotFound(session_id))?;
    let guard = gate.lock_owned().await;

    // Re-read under the gate; a previous turn may have committed meanwhile.
    let session = state
        .sessions
        .get_owned(session_id, user)
        .await
        .map_err(|_| ChatError::SessionNotFound(session_id))?;

    info!(
        %session_id,
        model = %model.name(),
        tools = request.selected_tools.len(),
        data_sources = request.selected_data_sources.len(),
        "chat: turn started"
    );

    let selections_changed = request.selected_tools != session.selected_tools
        || request.selected_data_sources != session.selected_data_sources;
    let mut history = session.messages;
    if history.is_empty() || selections_changed {
        let system_text = state
            .composer
            .compose(&request.selected_tools, &request.selected_data_sources);
        apply_system_prompt(&mut history, system_text);
    }

    let user_message = Message::user(request.content.clone());
    let mut working = history.clone();
    working.push(user_message.clone());
    let tool_defs = state.tools.definitions_for(&request.selected_tools);

    state
        .session_log
        .log(session_id, "user_message", json!({ "content": request.content, "model": model.name() }))
        .await;

    let first = match model.client.chat(&working, &tool_defs).await {
        Ok(response) => response,
        Err(e) => {
            warn!(%session_id, model = %model.name(), error = %e, "chat: first model call failed");
            state
                .session_log
                .log(session_id, "turn_error", json!({ "stage": "first_call", "error": e.to_string() }))
                .await;
            return Err(ChatError::Llm(e));
        }
    };

    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let turn = Turn {
        state: state.clone(),
        session_id,
        model,
        selected_tools: request.selected_tools,
        selected_data_sources: request.selected_data_sources,
        history,
        user_message,
        working,
        tool_defs,
        tx,
        client_gone: false,
    };
    tokio::spawn(turn.run(first, guard));
    Ok(rx)
}

fn resolve_model(
    state: &AppState,
    requested: Option<&str>,
    previous: Option<&str>,
) -> Result<Arc<ModelHandle>, ChatError> {
    if let Some(name) = requested {
        return Ok(state.models.resolve(Some(name))?);
    }
    // A model remembered from an earlier turn may have vanished on reload.
    if let Some(handle) = previous.and_then(|name| state.models.resolve(Some(name)).ok()) {
        return Ok(handle);
    }
    Ok(state.models.resolve(None)?)
}

/// Keep exactly one system message, at index 0.
fn apply_system_prompt(history: &mut Vec<Message>, text: String) {
    match history.first_mut() {
        Some(first) if first.role == Role::System => first.content = text,
        _ => history.insert(0, Message::system(text)),
    }
}

// =============================================================================
// STREAMING TASK
// =============================================================================

struct Turn {
    state: AppState,
    session_id: Uuid,
    model: Arc<ModelHandle>,
    selected_tools: Vec<String>,
    selected_data_sources: Vec<String>,
    /// Persisted history plus this turn's system prompt update.
    history: Vec<Message>,
    user_message: Message,
    /// Messages sent to the model; grows with the tool round-trip.
    working: Vec<Message>,
    tool_defs: Vec<ToolDefinition>,
    tx: mpsc::Sender<StreamEvent>,
    client_gone: bool,
}

impl Turn {
    async fn run(mut self, first: ChatResponse, _guard: OwnedMutexGuard<()>) {
        self.announce_selections().await;

        let mut reply = String::new();
        if first.tool_calls().is_empty() {
            let text = first.text();
            if !text.is_empty() {
                reply.push_str(text);
                self.emit(StreamEvent::Content(text.to_string())).await;
            }
        } else {
            self.run_tools(&first).await;
            self.stream_reply(&mut reply).await;
        }

        self.persist(reply).await;
        self.emit(StreamEvent::End).await;
    }

    async fn announce_selections(&mut self) {
        let tools: Vec<String> = self
            .state
            .tools
            .resolve_selection(&self.selected_tools)
            .iter()
            .map(|t| t.selection_id().to_string())
            .collect();
        for tool in tools {
            self.emit(StreamEvent::ToolSelected(tool)).await;
        }

        let mut sources: Vec<String> = Vec::new();
        for id in &self.selected_data_sources {
            if data_source(id).is_some() && !sources.contains(id) {
                sources.push(id.clone());
            }
        }
        for source in sources {
            self.emit(StreamEvent::DataSourceSelected(source)).await;
        }
    }

    async fn run_tools(&mut self, first: &ChatResponse) {
        let calls = first.tool_calls().to_vec();
        self.working
            .push(Message::assistant_tool_calls(first.text(), calls.clone()));

        for call in &calls {
            info!(session_id = %self.session_id, tool = %call.name, "chat: executing tool");
            let result = self.state.tools.run(call).await;
            self.state
                .session_log
                .log(
                    self.session_id,
                    "tool_call",
                    json!({ "tool": call.name, "arguments": call.arguments, "result": result }),
                )
                .await;
            self.working.push(Message::tool_result(call, result));
        }
    }

    /// Stream the second call into `reply`, forwarding each increment.
    async fn stream_reply(&mut self, reply: &mut String) {
        let opened = self
            .model
            .client
            .chat_stream(&self.working, &self.tool_defs)
            .await;
        let mut stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                self.fail("stream_open", &e).await;
                return;
            }
        };

        while let Some(item) = stream.next().await {
            match item {
                Ok(StreamChunk::Delta(text)) => {
                    reply.push_str(&text);
                    self.emit(StreamEvent::Content(text)).await;
                    if self.client_gone {
                        info!(session_id = %self.session_id, "chat: client disconnected mid-stream");
                        break;
                    }
                }
                Ok(StreamChunk::ToolCallFragment { index, .. }) => {
                    debug!(session_id = %self.session_id, index, "chat: ignoring tool call in follow-up stream");
                }
                Ok(StreamChunk::Done) => break,
                Err(e) => {
                    self.fail("stream", &e).await;
                    break;
                }
            }
        }
    }

    async fn fail(&mut self, stage: &str, err: &LlmError) {
        warn!(session_id = %self.session_id, model = %self.model.name(), stage, error = %err, "chat: provider failure");
        self.state
            .session_log
            .log(self.session_id, "turn_error", json!({ "stage": stage, "error": err.to_string() }))
            .await;
        self.emit(StreamEvent::error_from(err)).await;
    }

    /// Commit the turn if any reply text accumulated.
    async fn persist(&mut self, reply: String) {
        if reply.is_empty() {
            info!(session_id = %self.session_id, "chat: empty reply; nothing persisted");
            return;
        }

        let mut history = std::mem::take(&mut self.history);
        history.push(self.user_message.clone());
        history.push(Message::assistant(reply.clone()));

        let sessions = &self.state.sessions;
        let committed = async {
            sessions.replace_history(self.session_id, history).await?;
            sessions
                .set_selections(
                    self.session_id,
                    self.selected_tools.clone(),
                    self.selected_data_sources.clone(),
                )
                .await?;
            sessions.set_model(self.session_id, self.model.name()).await
        }
        .await;

        match committed {
            Ok(()) => {
                info!(session_id = %self.session_id, reply_len = reply.len(), "chat: turn persisted");
                self.state
                    .session_log
                    .log(self.session_id, "assistant_message", json!({ "content": reply }))
                    .await;
            }
            Err(e) => warn!(session_id = %self.session_id, error = %e, "chat: session vanished before persist"),
        }
    }

    /// Send one event; a closed receiver marks the client as gone.
    async fn emit(&mut self, event: StreamEvent) {
        if self.client_gone {
            return;
        }
        if self.tx.send(event).await.is_err() {
            self.client_gone = true;
        }
    }
}

#[cfg(test)]
#[path = "chat_test.rs"]
mod tests;
